//! Device discovery and shared device-level value types.

use crate::capability::{CapabilityTable, ModelEntry, ModelId};
use crate::error::{Error, Result};
use crate::RAZER_VID;
use tracing::{debug, info};

/// Information about a discovered Razer device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub model: ModelId,
    pub name: String,
    pub vid: u16,
    pub pid: u16,
    pub path: String,
    pub serial: Option<String>,
    pub interface_number: i32,
}

/// Look up the table entry for a USB id pair.
pub fn match_device(table: &CapabilityTable, vid: u16, pid: u16) -> Option<&ModelEntry> {
    if vid != RAZER_VID {
        return None;
    }
    table.entry(ModelId(pid))
}

/// Control reports go to the first interface. Some platforms do not report
/// interface numbers at all (-1).
fn is_control_interface(interface_number: i32) -> bool {
    interface_number <= 0
}

/// Discover all connected Razer devices that have a capability entry.
pub fn discover_devices(table: &CapabilityTable) -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let mut devices: Vec<DeviceInfo> = Vec::new();
    for info in api.device_list() {
        let Some(entry) = match_device(table, info.vendor_id(), info.product_id()) else {
            continue;
        };
        if !is_control_interface(info.interface_number()) {
            continue;
        }
        let path = info.path().to_string_lossy().into_owned();
        if devices.iter().any(|d| d.path == path) {
            continue;
        }

        info!(
            model = %entry.name,
            vid = format_args!("0x{:04X}", info.vendor_id()),
            pid = format_args!("0x{:04X}", info.product_id()),
            path = %path,
            "Found Razer device"
        );
        devices.push(DeviceInfo {
            model: entry.id,
            name: entry.name.clone(),
            vid: info.vendor_id(),
            pid: info.product_id(),
            path,
            serial: info.serial_number().map(|s| s.to_string()),
            interface_number: info.interface_number(),
        });
    }

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

/// Polling rates Razer mice support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum PollingRate {
    Hz125 = 125,
    Hz250 = 250,
    Hz500 = 500,
    Hz1000 = 1000,
}

impl PollingRate {
    pub fn from_hz(hz: u16) -> Option<Self> {
        match hz {
            125 => Some(Self::Hz125),
            250 => Some(Self::Hz250),
            500 => Some(Self::Hz500),
            1000 => Some(Self::Hz1000),
            _ => None,
        }
    }

    pub fn as_hz(&self) -> u16 {
        *self as u16
    }

    /// Wire code: the report interval in milliseconds.
    pub fn code(&self) -> u8 {
        match self {
            Self::Hz1000 => 0x01,
            Self::Hz500 => 0x02,
            Self::Hz250 => 0x04,
            Self::Hz125 => 0x08,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Hz1000),
            0x02 => Some(Self::Hz500),
            0x04 => Some(Self::Hz250),
            0x08 => Some(Self::Hz125),
            _ => None,
        }
    }

    pub const ALL: &'static [PollingRate] = &[
        PollingRate::Hz125,
        PollingRate::Hz250,
        PollingRate::Hz500,
        PollingRate::Hz1000,
    ];
}

impl std::fmt::Display for PollingRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}
