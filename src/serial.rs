//! Blocking serial connection wrapper.
//!
//! [`Serial`] owns at most one open port at a time. It can attach to a named
//! port or scan the machine and take the first port that opens at the
//! requested baud rate:
//!
//! ```no_run
//! use serialwrap::serial::Serial;
//! use std::time::Duration;
//!
//! # fn example() -> serialwrap::error::Result<()> {
//! let mut serial = Serial::new();
//! serial.autoconnect(115_200)?;
//! serial.write(&[0x01, 0x02, 0x03, 0x04])?;
//!
//! let mut buf = [0u8; 256];
//! let n = serial.read_response(&mut buf, Duration::from_secs(1))?;
//! println!("Read {} bytes", n);
//! # Ok(())
//! # }
//! ```

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, SerialError};
use crate::ports::{PortInfo, PortScanner, ScanConfig};

/// Per-call read timeout used when nothing else is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// An open byte link to a device.
pub trait Link: Read + Write + Send {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Link for Box<dyn serialport::SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        serialport::SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }
}

/// Finds and opens ports.
pub trait Connector {
    fn available_ports(&self) -> Result<Vec<PortInfo>>;
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn Link>>;
}

/// Connector backed by the operating system's serial ports.
#[derive(Debug, Clone, Default)]
pub struct SystemConnector {
    scanner: PortScanner,
}

impl SystemConnector {
    pub fn new(scan: ScanConfig) -> Self {
        Self {
            scanner: PortScanner::with_config(scan),
        }
    }
}

impl Connector for SystemConnector {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        self.scanner.enumerate()
    }

    fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn Link>> {
        let opened = serialport::new(port, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| SerialError::Open {
                port: port.to_string(),
                source,
            })?;
        Ok(Box::new(opened))
    }
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// How long a single `read` call may block
    pub timeout: Duration,
    pub scan: ScanConfig,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            scan: ScanConfig::default(),
        }
    }
}

struct Connection {
    link: Box<dyn Link>,
    port: String,
    baud_rate: u32,
}

pub struct Serial<C: Connector = SystemConnector> {
    connector: C,
    config: SerialConfig,
    connection: Option<Connection>,
}

impl Serial<SystemConnector> {
    pub fn new() -> Self {
        Self::with_config(SerialConfig::default())
    }

    pub fn with_config(config: SerialConfig) -> Self {
        let connector = SystemConnector::new(config.scan.clone());
        Self::with_connector(connector, config)
    }
}

impl Default for Serial<SystemConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> Serial<C> {
    pub fn with_connector(connector: C, config: SerialConfig) -> Self {
        Self {
            connector,
            config,
            connection: None,
        }
    }

    /// Attach to the first enumerated port that opens at `baud_rate`.
    pub fn autoconnect(&mut self, baud_rate: u32) -> Result<()> {
        self.disconnect();

        let ports = self.connector.available_ports()?;
        for port in ports {
            match self.connector.open(&port.name, baud_rate, self.config.timeout) {
                Ok(link) => {
                    self.attach(link, port.name, baud_rate);
                    return Ok(());
                }
                Err(e) => warn!("Skipping {}: {}", port.name, e),
            }
        }

        Err(SerialError::NoPortAvailable { baud_rate })
    }

    /// Attach to a named port, replacing any current connection.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> Result<()> {
        self.disconnect();
        let link = self.connector.open(port, baud_rate, self.config.timeout)?;
        self.attach(link, port.to_string(), baud_rate);
        Ok(())
    }

    fn attach(&mut self, link: Box<dyn Link>, port: String, baud_rate: u32) {
        info!("Connected to {} at {} baud", port, baud_rate);
        self.connection = Some(Connection {
            link,
            port,
            baud_rate,
        });
    }

    /// Release the port. No-op when not connected.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            info!("Disconnected from {}", conn.port);
        }
    }

    pub fn connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Baud rate of the open connection, 0 when disconnected.
    pub fn baud_rate(&self) -> u32 {
        self.connection.as_ref().map_or(0, |c| c.baud_rate)
    }

    pub fn port_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.port.as_str())
    }

    /// Change the per-call read timeout, applying it to the open link too.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.config.timeout = timeout;
        if let Some(conn) = self.connection.as_mut() {
            conn.link.set_timeout(timeout)?;
        }
        Ok(())
    }

    /// Transmit all of `data`, returning the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let conn = self.connection.as_mut().ok_or(SerialError::NotConnected)?;
        conn.link.write_all(data)?;
        conn.link.flush()?;
        debug!("TX {} bytes: {:02X?}", data.len(), data);
        Ok(data.len())
    }

    /// Read whatever is available into `buf`; 0 when nothing arrived within
    /// the read timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let conn = self.connection.as_mut().ok_or(SerialError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }
        match conn.link.read(buf) {
            Ok(n) => {
                if n > 0 {
                    debug!("RX {} bytes: {:02X?}", n, &buf[..n]);
                }
                Ok(n)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll `read` until at least one byte arrives or `timeout` elapses.
    /// An empty `buf` returns 0 without waiting.
    pub fn read_response(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if buf.is_empty() {
            return self.read(buf);
        }
        let start = Instant::now();
        loop {
            let n = self.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if start.elapsed() >= timeout {
                return Err(SerialError::Timeout(timeout));
            }
        }
    }
}

impl<C: Connector> Drop for Serial<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Wire {
        sent: Vec<u8>,
        incoming: VecDeque<Vec<u8>>,
        timeout: Option<Duration>,
        dropped: bool,
    }

    struct MockLink(Arc<Mutex<Wire>>);

    impl Read for MockLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.0.lock().unwrap();
            match wire.incoming.pop_front() {
                Some(mut chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        wire.incoming.push_front(chunk.split_off(n));
                    }
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for MockLink {
        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.0.lock().unwrap().timeout = Some(timeout);
            Ok(())
        }
    }

    impl Drop for MockLink {
        fn drop(&mut self) {
            self.0.lock().unwrap().dropped = true;
        }
    }

    /// Ports in enumeration order; only those with a wire can be opened,
    /// and only at the listed baud rate.
    #[derive(Default)]
    struct MockConnector {
        ports: Vec<String>,
        wires: HashMap<String, (u32, Arc<Mutex<Wire>>)>,
    }

    impl MockConnector {
        fn port(mut self, name: &str) -> Self {
            self.ports.push(name.to_string());
            self
        }

        fn device(mut self, name: &str, baud_rate: u32) -> (Self, Arc<Mutex<Wire>>) {
            let wire = Arc::new(Mutex::new(Wire::default()));
            self.ports.push(name.to_string());
            self.wires
                .insert(name.to_string(), (baud_rate, Arc::clone(&wire)));
            (self, wire)
        }
    }

    impl Connector for MockConnector {
        fn available_ports(&self) -> Result<Vec<PortInfo>> {
            Ok(self.ports.iter().map(PortInfo::named).collect())
        }

        fn open(&self, port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn Link>> {
            match self.wires.get(port) {
                Some((baud, wire)) if *baud == baud_rate => {
                    wire.lock().unwrap().timeout = Some(timeout);
                    Ok(Box::new(MockLink(Arc::clone(wire))))
                }
                _ => Err(SerialError::Open {
                    port: port.to_string(),
                    source: serialport::Error::new(
                        serialport::ErrorKind::NoDevice,
                        "device not found",
                    ),
                }),
            }
        }
    }

    fn serial(connector: MockConnector) -> Serial<MockConnector> {
        Serial::with_connector(connector, SerialConfig::default())
    }

    #[test]
    fn starts_disconnected() {
        let mut s = serial(MockConnector::default());
        assert!(!s.connected());
        assert_eq!(s.baud_rate(), 0);
        assert_eq!(s.port_name(), None);
        assert!(matches!(s.write(&[0x01]), Err(SerialError::NotConnected)));
        assert!(matches!(
            s.read(&mut [0u8; 4]),
            Err(SerialError::NotConnected)
        ));
    }

    #[test]
    fn connect_write_read() {
        let (connector, wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);

        s.connect("/dev/ttyUSB0", 9600).unwrap();
        assert!(s.connected());
        assert_eq!(s.baud_rate(), 9600);
        assert_eq!(s.port_name(), Some("/dev/ttyUSB0"));
        assert_eq!(
            wire.lock().unwrap().timeout,
            Some(Duration::from_millis(DEFAULT_TIMEOUT_MS))
        );

        assert_eq!(s.write(&[0x01, 0x02, 0x03, 0x04]).unwrap(), 4);
        assert_eq!(wire.lock().unwrap().sent, vec![0x01, 0x02, 0x03, 0x04]);

        let mut buf = [0u8; 256];
        assert_eq!(s.read(&mut buf).unwrap(), 0);

        wire.lock().unwrap().incoming.push_back(vec![0xAA, 0xBB]);
        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xAA, 0xBB]);
    }

    #[test]
    fn read_respects_buffer_capacity() {
        let (connector, wire) = MockConnector::default().device("COM3", 9600);
        let mut s = serial(connector);
        s.connect("COM3", 9600).unwrap();

        wire.lock().unwrap().incoming.push_back(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        assert_eq!(s.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(s.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
    }

    #[test]
    fn connect_failure_leaves_disconnected() {
        let mut s = serial(MockConnector::default().port("/dev/ttyS0"));
        let err = s.connect("/dev/ttyS0", 115_200).unwrap_err();
        assert!(matches!(err, SerialError::Open { ref port, .. } if port == "/dev/ttyS0"));
        assert!(!s.connected());
    }

    #[test]
    fn autoconnect_takes_first_port_that_opens() {
        let (connector, _slow) = MockConnector::default()
            .port("/dev/ttyS0")
            .device("/dev/ttyUSB0", 9600);
        let (connector, _fast) = connector.device("/dev/ttyUSB1", 115_200);
        let (connector, _second) = connector.device("/dev/ttyUSB2", 115_200);
        let mut s = serial(connector);

        s.autoconnect(115_200).unwrap();
        assert_eq!(s.port_name(), Some("/dev/ttyUSB1"));
        assert_eq!(s.baud_rate(), 115_200);
    }

    #[test]
    fn autoconnect_without_match_fails() {
        let (connector, _wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);
        assert!(matches!(
            s.autoconnect(115_200),
            Err(SerialError::NoPortAvailable { baud_rate: 115_200 })
        ));
        assert!(!s.connected());
    }

    #[test]
    fn disconnect_releases_link() {
        let (connector, wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);
        s.connect("/dev/ttyUSB0", 9600).unwrap();

        s.disconnect();
        assert!(!s.connected());
        assert!(wire.lock().unwrap().dropped);
        assert!(matches!(s.write(&[0x01]), Err(SerialError::NotConnected)));

        // Second disconnect is a no-op
        s.disconnect();
    }

    #[test]
    fn drop_releases_link() {
        let (connector, wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        {
            let mut s = serial(connector);
            s.connect("/dev/ttyUSB0", 9600).unwrap();
        }
        assert!(wire.lock().unwrap().dropped);
    }

    #[test]
    fn reconnect_replaces_connection() {
        let (connector, first) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let (connector, _second) = connector.device("/dev/ttyUSB1", 19_200);
        let mut s = serial(connector);

        s.connect("/dev/ttyUSB0", 9600).unwrap();
        s.connect("/dev/ttyUSB1", 19_200).unwrap();
        assert!(first.lock().unwrap().dropped);
        assert_eq!(s.port_name(), Some("/dev/ttyUSB1"));
        assert_eq!(s.baud_rate(), 19_200);
    }

    #[test]
    fn read_response_returns_first_data() {
        let (connector, wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);
        s.connect("/dev/ttyUSB0", 9600).unwrap();

        wire.lock().unwrap().incoming.push_back(vec![0x06]);
        let mut buf = [0u8; 16];
        let n = s.read_response(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 0x06);
    }

    #[test]
    fn read_response_times_out() {
        let (connector, _wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);
        s.connect("/dev/ttyUSB0", 9600).unwrap();

        let mut buf = [0u8; 16];
        let timeout = Duration::from_millis(20);
        match s.read_response(&mut buf, timeout) {
            Err(SerialError::Timeout(t)) => assert_eq!(t, timeout),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn read_response_with_empty_buffer_returns_immediately() {
        let (connector, _wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);
        s.connect("/dev/ttyUSB0", 9600).unwrap();

        let start = Instant::now();
        let n = s.read_response(&mut [], Duration::from_secs(5)).unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() < Duration::from_secs(1));

        s.disconnect();
        assert!(matches!(
            s.read_response(&mut [], Duration::from_secs(5)),
            Err(SerialError::NotConnected)
        ));
    }

    #[test]
    fn set_timeout_applies_to_open_link() {
        let (connector, wire) = MockConnector::default().device("/dev/ttyUSB0", 9600);
        let mut s = serial(connector);
        s.connect("/dev/ttyUSB0", 9600).unwrap();

        s.set_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(wire.lock().unwrap().timeout, Some(Duration::from_millis(5)));
    }
}
