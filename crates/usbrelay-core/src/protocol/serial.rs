//! Serial port discovery
//!
//! Enumerates serial ports, exposes their USB identity, and picks the port a
//! command should use.

use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;

use super::RelayError;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// OS device path (e.g., "/dev/ttyUSB0" or "COM3")
    pub path: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,

    /// Opaque hardware id, e.g. "USB VID:PID=1A86:7523 SER=123"
    pub hardware_id: String,

    /// Human readable description (if available)
    pub description: Option<String>,

    /// USB location ("1-1.2:1.0") or interface number (if available)
    pub address: Option<String>,
}

impl PortInfo {
    /// A port known only by its path
    pub fn bare(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
            hardware_id: "n/a".to_string(),
            description: None,
            address: None,
        }
    }

    /// Known relay-board bridge matching this port's VID/PID, if any
    pub fn known_device(&self) -> Option<&'static KnownDevice> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => RELAY_BOARD_IDS
                .iter()
                .find(|d| d.vid == vid && d.pid == pid),
            _ => None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                let mut hardware_id = format!("USB VID:PID={:04X}:{:04X}", usb_info.vid, usb_info.pid);
                if let Some(serial) = &usb_info.serial_number {
                    hardware_id.push_str(&format!(" SER={}", serial));
                }
                let address = usb_location(&info.port_name)
                    .or_else(|| usb_info.interface.map(|i| format!("interface {}", i)));
                Self {
                    path: info.port_name,
                    vid: Some(usb_info.vid),
                    pid: Some(usb_info.pid),
                    manufacturer: usb_info.manufacturer,
                    description: usb_info.product.clone(),
                    product: usb_info.product,
                    serial_number: usb_info.serial_number,
                    hardware_id,
                    address,
                }
            }
            SerialPortType::PciPort => Self {
                hardware_id: "PCI".to_string(),
                ..Self::bare(info.port_name)
            },
            SerialPortType::BluetoothPort => Self {
                hardware_id: "BLUETOOTH".to_string(),
                ..Self::bare(info.port_name)
            },
            SerialPortType::Unknown => Self::bare(info.port_name),
        }
    }
}

/// USB interface directory name from sysfs, e.g. "1-1.2:1.0"
#[cfg(target_os = "linux")]
fn usb_location(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let device = fs::canonicalize(format!("/sys/class/tty/{}/device", name)).ok()?;
    device
        .ancestors()
        .filter_map(|dir| dir.file_name()?.to_str())
        .find(|dir| dir.contains(':') && dir.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
}

#[cfg(not(target_os = "linux"))]
fn usb_location(_path: &str) -> Option<String> {
    None
}

/// A USB-serial bridge found on relay boards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// Bridge chip name
    pub name: &'static str,
}

/// Identity table used to pick out candidate relay boards
pub const RELAY_BOARD_IDS: &[KnownDevice] = &[
    KnownDevice { vid: 0x1A86, pid: 0x7523, name: "CH340" },
    KnownDevice { vid: 0x1A86, pid: 0x5523, name: "CH341" },
    KnownDevice { vid: 0x1A86, pid: 0x55D4, name: "CH9102" },
    KnownDevice { vid: 0x10C4, pid: 0xEA60, name: "CP210x" },
    KnownDevice { vid: 0x067B, pid: 0x2303, name: "PL2303" },
    KnownDevice { vid: 0x0403, pid: 0x6001, name: "FT232R" },
];

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then COM ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let numbered = [("ttyACM", 0u8), ("ttyUSB", 1), ("COM", 2)];
    for (prefix, rank) in numbered {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering.
/// Returns an empty list when nothing is attached or enumeration fails.
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(infos) => {
            for info in infos {
                let p = PortInfo::from(info);
                map.entry(p.path.clone()).or_insert(p);
            }
        }
        Err(e) => tracing::warn!("serial port enumeration failed: {}", e),
    }

    // Linux-only: Add /dev/ttyACM* and /dev/ttyUSB* entries if present but not found by API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.path));
    tracing::debug!("found {} serial port(s)", v.len());
    v
}

/// Keep only ports whose VID/PID is in the relay-board identity table
pub fn filter_candidates(ports: &[PortInfo]) -> Vec<PortInfo> {
    ports
        .iter()
        .filter(|p| p.known_device().is_some())
        .cloned()
        .collect()
}

/// First port in enumeration order
pub fn select_default(ports: &[PortInfo]) -> Result<PortInfo, RelayError> {
    ports.first().cloned().ok_or(RelayError::NoPortsAvailable)
}

/// Port whose path exactly matches `path`
pub fn resolve(path: &str, ports: &[PortInfo]) -> Result<PortInfo, RelayError> {
    ports
        .iter()
        .find(|p| p.path == path)
        .cloned()
        .ok_or_else(|| RelayError::PortNotFound(path.to_string()))
}

/// Resolve an explicitly pinned port, or fall back to the first one
pub fn resolve_port(explicit: Option<&str>, ports: &[PortInfo]) -> Result<PortInfo, RelayError> {
    match explicit {
        Some(path) => resolve(path, ports),
        None => select_default(ports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn usb(path: &str, vid: u16, pid: u16) -> PortInfo {
        PortInfo {
            vid: Some(vid),
            pid: Some(pid),
            ..PortInfo::bare(path)
        }
    }

    #[test]
    fn test_list_ports() {
        // This test just ensures the function doesn't panic
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.path, port.product);
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "/dev/ttyACM10",
            "COM12",
            "COM3",
        ];
        let mut ports: Vec<PortInfo> = names.into_iter().map(PortInfo::bare).collect();

        ports.sort_by_key(|p| port_sort_key(&p.path));
        let ordered: Vec<String> = ports.into_iter().map(|p| p.path).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "COM3",
                "COM12",
                "/dev/someport",
            ]
        );
    }

    #[test]
    fn test_select_default() {
        let ports = vec![PortInfo::bare("/dev/ttyUSB0"), PortInfo::bare("/dev/ttyUSB1")];
        assert_eq!(select_default(&ports).unwrap().path, "/dev/ttyUSB0");
        assert!(matches!(
            select_default(&[]),
            Err(RelayError::NoPortsAvailable)
        ));
    }

    #[test]
    fn test_resolve_is_exact() {
        let ports = vec![PortInfo::bare("COM3"), PortInfo::bare("/dev/ttyUSB0")];
        assert_eq!(resolve("COM3", &ports).unwrap().path, "COM3");
        assert!(matches!(
            resolve("com3", &ports),
            Err(RelayError::PortNotFound(p)) if p == "com3"
        ));
        assert!(resolve("/dev/ttyUSB0/", &ports).is_err());
    }

    #[test]
    fn test_resolve_port() {
        let ports = vec![PortInfo::bare("COM3"), PortInfo::bare("COM4")];
        assert_eq!(resolve_port(None, &ports).unwrap().path, "COM3");
        assert_eq!(resolve_port(Some("COM4"), &ports).unwrap().path, "COM4");
        assert!(matches!(
            resolve_port(Some("COM9"), &[]),
            Err(RelayError::PortNotFound(_))
        ));
        assert!(matches!(
            resolve_port(None, &[]),
            Err(RelayError::NoPortsAvailable)
        ));
    }

    #[test]
    fn test_filter_candidates() {
        let ports = vec![
            usb("/dev/ttyUSB0", 0x1A86, 0x7523),
            usb("/dev/ttyACM0", 0x2341, 0x0043),
            PortInfo::bare("/dev/ttyS0"),
        ];
        let candidates = filter_candidates(&ports);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, "/dev/ttyUSB0");
        assert_eq!(candidates[0].known_device().unwrap().name, "CH340");
    }

    #[test]
    fn test_from_usb_info() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x1A86,
                pid: 0x7523,
                serial_number: Some("A1".to_string()),
                manufacturer: Some("QinHeng".to_string()),
                product: Some("USB Serial".to_string()),
                interface: Some(0),
            }),
        };
        let port = PortInfo::from(info);
        assert_eq!(port.hardware_id, "USB VID:PID=1A86:7523 SER=A1");
        assert_eq!(port.description.as_deref(), Some("USB Serial"));
        assert_eq!(port.manufacturer.as_deref(), Some("QinHeng"));
        assert_eq!(port.address.as_deref(), Some("interface 0"));
    }
}
