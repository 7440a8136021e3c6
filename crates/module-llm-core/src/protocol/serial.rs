//! Serial port handling
//!
//! The module is wired either to a board UART (`ttyS*`, `ttyAMA*`) or through
//! a USB bridge (`ttyACM*`, `ttyUSB*`). The link is always 8N1 without flow
//! control.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::ProtocolError;
use crate::config::TransportSettings;

/// How a port is attached to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortKind {
    /// USB serial bridge
    Usb {
        /// Vendor id
        vid: u16,
        /// Product id
        pid: u16,
        /// Product string reported by the device
        product: Option<String>,
    },
    /// On-board UART
    Uart,
    /// Anything else
    Other,
}

/// A serial port that could reach the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Name to open, e.g. `/dev/ttyUSB0`
    pub name: String,
    /// How the port is attached
    pub kind: PortKind,
}

impl PortInfo {
    fn from_name(name: String) -> Self {
        let kind = if is_uart_name(&name) {
            PortKind::Uart
        } else {
            PortKind::Other
        };
        Self { name, kind }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                kind: PortKind::Usb {
                    vid: usb.vid,
                    pid: usb.pid,
                    product: usb.product,
                },
            },
            _ => Self::from_name(info.port_name),
        }
    }
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn is_uart_name(name: &str) -> bool {
    let base = basename(name);
    base.starts_with("ttyS") || base.starts_with("ttyAMA")
}

/// Ranking used for discovery: USB CDC, USB serial, board UARTs, then the rest
///
/// Ports of the same family are ordered by their numeric suffix.
fn port_rank(name: &str) -> (u8, u32, String) {
    let base = basename(name);
    let families = [("ttyACM", 0u8), ("ttyUSB", 1), ("ttyAMA", 2), ("ttyS", 3)];
    for (prefix, rank) in families {
        if let Some(suffix) = base.strip_prefix(prefix) {
            let n = suffix.parse::<u32>().unwrap_or(u32::MAX);
            return (rank, n, base.to_string());
        }
    }
    (4, 0, base.to_string())
}

/// Ports present on this host, best candidates first
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = match serialport::available_ports() {
        Ok(found) => found.into_iter().map(PortInfo::from).collect(),
        Err(e) => {
            tracing::warn!("serial port enumeration failed: {}", e);
            Vec::new()
        }
    };
    ports.sort_by_key(|p| port_rank(&p.name));
    ports.dedup_by(|a, b| a.name == b.name);
    ports
}

/// Pick the port to use when none is configured
pub fn detect_port(ports: &[PortInfo]) -> Option<&PortInfo> {
    ports.iter().find(|p| port_rank(&p.name).0 < 4)
}

/// Open the module's UART as 8N1 with no flow control and drop stale input
///
/// An empty `port_name` selects the first port found by [`detect_port`].
pub fn open_port(settings: &TransportSettings) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let name = if settings.port_name.is_empty() {
        let ports = list_ports();
        let port = detect_port(&ports).ok_or(ProtocolError::NotConnected)?;
        tracing::info!("no port configured, using {}", port.name);
        port.name.clone()
    } else {
        settings.port_name.clone()
    };

    tracing::debug!("opening {} at {} baud", name, settings.baud_rate);
    let port = serialport::new(&name, settings.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(settings.read_timeout_ms))
        .open()
        .map_err(|e| ProtocolError::SerialError(format!("{}: {}", name, e)))?;

    port.clear(serialport::ClearBuffer::Input)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_ranking() {
        let mut ports: Vec<PortInfo> = [
            "/dev/ttyS0",
            "/dev/ttyUSB1",
            "/dev/ttyACM10",
            "/dev/ttyAMA0",
            "/dev/ttyUSB0",
            "/dev/ttyACM1",
            "COM3",
        ]
        .into_iter()
        .map(|n| PortInfo::from_name(n.to_string()))
        .collect();

        ports.sort_by_key(|p| port_rank(&p.name));
        let ordered: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/ttyAMA0",
                "/dev/ttyS0",
                "COM3",
            ]
        );
    }

    #[test]
    fn test_uart_kind_from_name() {
        assert_eq!(PortInfo::from_name("/dev/ttyS1".into()).kind, PortKind::Uart);
        assert_eq!(PortInfo::from_name("COM4".into()).kind, PortKind::Other);
    }

    #[test]
    fn test_detect_port_skips_unknown_names() {
        let ports = vec![
            PortInfo::from_name("/dev/cu.Bluetooth".into()),
            PortInfo::from_name("/dev/ttyS1".into()),
        ];
        assert_eq!(detect_port(&ports).map(|p| p.name.as_str()), Some("/dev/ttyS1"));
        assert!(detect_port(&ports[..1]).is_none());
    }
}
