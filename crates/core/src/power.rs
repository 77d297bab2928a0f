//! Battery and power management (class 0x07), plus the wireless dock's
//! charging lights.

use crate::encode::Command;
use crate::error::Result;
use crate::lighting::Rgb;
use crate::session::DeviceSession;

/// What the mouse shows while it sits on the dock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeEffect {
    /// Keep playing the current matrix effect.
    Matrix,
    /// Static colour, set with [`write_charge_color`].
    Static,
}

impl ChargeEffect {
    pub fn as_byte(self) -> u8 {
        match self {
            ChargeEffect::Matrix => 0x00,
            ChargeEffect::Static => 0x01,
        }
    }

    /// Any non-zero byte selects the static effect.
    pub fn from_byte(b: u8) -> Self {
        if b == 0 {
            ChargeEffect::Matrix
        } else {
            ChargeEffect::Static
        }
    }
}

/// Raw battery level, 0 to 255.
pub fn read_battery_level(session: &DeviceSession) -> Result<u8> {
    let resp = session.read(&Command::GetBatteryLevel)?;
    Ok(resp.arg(1))
}

/// Convert a raw battery level to a percentage.
pub fn battery_percent(raw: u8) -> u8 {
    ((raw as u16 * 100 + 127) / 255) as u8
}

pub fn read_charging_status(session: &DeviceSession) -> Result<bool> {
    let resp = session.read(&Command::GetChargingStatus)?;
    Ok(resp.arg(1) != 0)
}

/// Raw low-battery warning threshold.
pub fn read_low_battery_threshold(session: &DeviceSession) -> Result<u8> {
    let resp = session.read(&Command::GetLowBatteryThreshold)?;
    Ok(resp.arg(0))
}

/// Set the low-battery threshold. Clamped to `0x0C..=0x3F`.
pub fn write_low_battery_threshold(session: &DeviceSession, raw: u8) -> Result<()> {
    session.write(&Command::SetLowBatteryThreshold(raw))
}

/// Seconds of inactivity before the mouse sleeps.
pub fn read_idle_time(session: &DeviceSession) -> Result<u16> {
    let resp = session.read(&Command::GetIdleTime)?;
    Ok(u16::from_be_bytes([resp.arg(0), resp.arg(1)]))
}

/// Set the idle sleep time. Clamped to 60..=900 seconds.
pub fn write_idle_time(session: &DeviceSession, seconds: u16) -> Result<()> {
    session.write(&Command::SetIdleTime(seconds))
}

pub fn write_charge_effect(session: &DeviceSession, effect: ChargeEffect) -> Result<()> {
    session.write(&Command::SetChargeEffect(effect))
}

/// Switch the dock to the static charging effect and set its colour.
pub fn write_charge_color(session: &DeviceSession, color: Rgb) -> Result<()> {
    session.write(&Command::SetChargeColor(color))
}
