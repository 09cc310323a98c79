//! Library for a small blocking serial-port wrapper.
//! Provides port enumeration, a connection type with auto-detection,
//! and the checksummed command frame used by the CLI.

pub mod checksum;
pub mod error;
pub mod frame;
pub mod ports;
pub mod serial;
