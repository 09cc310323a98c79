use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serialwrap::error::{Result, SerialError};
use serialwrap::frame::CommandFrame;
use serialwrap::ports::PortScanner;
use serialwrap::serial::Serial;

/// Bytes sent by the demo exchange.
const DEMO_PAYLOAD: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

#[derive(Parser, Debug)]
#[command(name = "serialwrap", about = "Serial port connection helper")]
struct Args {
    /// Serial port path. If omitted, auto-connect to the first port that opens.
    #[arg(long, global = true, value_name = "PORT", env = "SERIALWRAP_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(
        long,
        global = true,
        value_name = "BAUD",
        env = "SERIALWRAP_BAUD",
        default_value_t = 115_200u32
    )]
    baud: u32,

    /// How long to wait for a response, in milliseconds
    #[arg(
        long,
        global = true,
        value_name = "MS",
        env = "SERIALWRAP_TIMEOUT_MS",
        default_value_t = 1_000u64
    )]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    List,
    /// Connect, send 01 02 03 04 and wait for a reply
    Demo,
    /// Connect and report connection status
    Status,
    /// Build a checksummed 7-byte command frame and send it
    SendFrame {
        /// Two header bytes (hex)
        #[arg(long, num_args = 2, value_parser = parse_byte, required = true)]
        header: Vec<u8>,

        /// Command byte (hex)
        #[arg(long, value_parser = parse_byte)]
        command: u8,

        /// Two payload / address bytes (hex)
        #[arg(long, num_args = 2, value_parser = parse_byte, required = true)]
        payload: Vec<u8>,

        /// Trailing marker byte (hex)
        #[arg(long, value_parser = parse_byte)]
        trailer: u8,
    },
}

/// Parse a byte written as hex, with or without a 0x prefix.
fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid byte '{}': {}", s, e))
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serialwrap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let response_timeout = Duration::from_millis(args.timeout_ms);

    match &args.command {
        Command::List => list_ports(),
        Command::Demo => {
            let mut serial = open(args)?;
            println!("Successfully connected to serial port!");

            let written = serial.write(&DEMO_PAYLOAD)?;
            println!("Wrote {} bytes", written);

            let mut buf = [0u8; 256];
            print_response(&mut serial, &mut buf, response_timeout)
        }
        Command::Status => {
            let serial = open(args)?;
            if serial.connected() {
                println!(
                    "Serial is connected to {} at {} baud",
                    serial.port_name().unwrap_or("?"),
                    serial.baud_rate()
                );
            } else {
                println!("Serial is not connected");
            }
            Ok(())
        }
        Command::SendFrame {
            header,
            command,
            payload,
            trailer,
        } => {
            let frame =
                build_frame(header, *command, payload, *trailer).unwrap_or_else(|e| e.exit());
            let raw = frame.to_bytes();

            let mut serial = open(args)?;
            println!("Sending frame: {:02X?}", raw);
            let written = serial.write(&raw)?;
            println!("Wrote {} bytes", written);

            let mut buf = [0u8; 256];
            print_response(&mut serial, &mut buf, response_timeout)
        }
    }
}

/// Assemble the frame from CLI values; `--header` and `--payload` must carry
/// exactly two bytes in total, even when the flag is repeated.
fn build_frame(
    header: &[u8],
    command: u8,
    payload: &[u8],
    trailer: u8,
) -> std::result::Result<CommandFrame, clap::Error> {
    let pair = |name: &str, values: &[u8]| -> std::result::Result<[u8; 2], clap::Error> {
        values.try_into().map_err(|_| {
            Args::command().error(
                ErrorKind::WrongNumberOfValues,
                format!("--{} takes exactly 2 bytes, got {:02X?}", name, values),
            )
        })
    };

    Ok(CommandFrame {
        header: pair("header", header)?,
        command,
        payload: pair("payload", payload)?,
        trailer,
    })
}

fn list_ports() -> Result<()> {
    let ports = PortScanner::new().enumerate()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{}", port.describe());
    }
    Ok(())
}

fn open(args: &Args) -> Result<Serial> {
    let mut serial = Serial::new();
    match &args.port {
        Some(port) => {
            println!("Connecting to {} at {} baud...", port, args.baud);
            serial.connect(port, args.baud)?;
        }
        None => {
            println!("No --port provided. Auto-connecting at {} baud...", args.baud);
            serial.autoconnect(args.baud)?;
        }
    }
    Ok(serial)
}

fn print_response(serial: &mut Serial, buf: &mut [u8], timeout: Duration) -> Result<()> {
    match serial.read_response(buf, timeout) {
        Ok(n) => {
            println!("Read {} bytes", n);
            println!("Response bytes: {:02X?}", &buf[..n]);
            Ok(())
        }
        Err(SerialError::Timeout(t)) => {
            println!("No response within {:?}", t);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
