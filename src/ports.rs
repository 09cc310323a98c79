//! Serial port enumeration

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, info};

use crate::error::{Result, SerialError};

/// Information about an enumerated serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl PortInfo {
    /// Port with a name only, no USB details
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Short human-readable description
    pub fn describe(&self) -> String {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => format!(
                "{} [{:04x}:{:04x}] {}",
                self.name,
                vid,
                pid,
                self.product.as_deref().unwrap_or("Unknown")
            ),
            _ => self.name.clone(),
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::named(info.port_name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Skip ports whose names contain any of these substrings
    pub skip_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_patterns: vec![
                // Bluetooth ports on macOS
                "Bluetooth".to_string(),
                "debug".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortScanner {
    config: ScanConfig,
}

impl PortScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Enumerate the serial ports present on this machine.
    pub fn enumerate(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(SerialError::Enumeration)?;
        let result = self.filter(ports.into_iter().map(PortInfo::from));

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
        }

        Ok(result)
    }

    /// Drop the ports matching a skip pattern, keeping enumeration order.
    pub fn filter(&self, ports: impl IntoIterator<Item = PortInfo>) -> Vec<PortInfo> {
        ports
            .into_iter()
            .filter(|p| {
                let skip = self.should_skip(p);
                if skip {
                    debug!("Skipping port {}", p.name);
                }
                !skip
            })
            .collect()
    }

    fn should_skip(&self, port: &PortInfo) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.name.contains(pattern.as_str()))
    }
}
