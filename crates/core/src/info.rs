//! Device information and mode (class 0x00).

use crate::encode::Command;
use crate::error::Result;
use crate::session::DeviceSession;

/// Firmware version as `vMAJOR.MINOR`.
pub fn read_firmware_version(session: &DeviceSession) -> Result<String> {
    let resp = session.read(&Command::GetFirmwareVersion)?;
    Ok(format!("v{}.{}", resp.arg(0), resp.arg(1)))
}

/// Serial number, trailing NULs and padding removed.
pub fn read_serial(session: &DeviceSession) -> Result<String> {
    let resp = session.read(&Command::GetSerial)?;
    let raw = resp.payload();
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).trim().to_string())
}

/// Device mode and its parameter byte.
pub fn read_device_mode(session: &DeviceSession) -> Result<(u8, u8)> {
    let resp = session.read(&Command::GetDeviceMode)?;
    Ok((resp.arg(0), resp.arg(1)))
}

/// Set the device mode. Factory mode is refused and normal mode sent instead.
pub fn write_device_mode(session: &DeviceSession, mode: u8) -> Result<()> {
    session.write(&Command::SetDeviceMode(mode))
}
