//! Error types for the serial wrapper

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a serial device
#[derive(Debug, Error)]
pub enum SerialError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    Enumeration(#[source] serialport::Error),

    /// Failed to open a specific port
    #[error("failed to open port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// No enumerated port could be opened at the requested baud rate
    #[error("no serial port accepted {baud_rate} baud")]
    NoPortAvailable { baud_rate: u32 },

    /// Operation needs an open connection
    #[error("not connected to a serial port")]
    NotConnected,

    /// I/O error on an open port
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived before the deadline
    #[error("timed out after {0:?} waiting for a response")]
    Timeout(Duration),

    /// Frame buffer has the wrong length
    #[error("invalid frame length {0} (expected 7)")]
    InvalidFrame(usize),

    /// Checksum byte does not seal the covered range
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

pub type Result<T> = std::result::Result<T, SerialError>;
