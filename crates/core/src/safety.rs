//! Safety layer: every value bound for the device passes through here first.
//!
//! Razer firmware does little validation of its own. Out-of-range values are
//! clamped to what the hardware accepts rather than rejected, matching how the
//! devices themselves saturate. The one exception is device mode: the
//! factory-test mode can leave a mouse unresponsive, so it is never sent.
//!
//! ## DPI
//! - Range 100 up to the model's `max_dpi` (4000 to 30000 depending on sensor).
//!
//! ## Power
//! - Low-battery threshold: raw 0x0C (~5%) to 0x3F (~25%).
//! - Idle sleep: 60 to 900 seconds.
//!
//! ## Effects
//! - Reactive speed 1 (short) to 4 (long) on extended matrix, 1 to 3 on the
//!   standard matrix.
//!
//! All clamping happens before any report is built.

use tracing::warn;

/// Lowest DPI any sensor accepts.
pub const DPI_MIN: u16 = 100;

pub const LOW_BATTERY_MIN: u8 = 0x0C;
pub const LOW_BATTERY_MAX: u8 = 0x3F;

pub const IDLE_TIME_MIN: u16 = 60;
pub const IDLE_TIME_MAX: u16 = 900;

pub const REACTIVE_SPEED_MIN: u8 = 1;
pub const REACTIVE_SPEED_MAX: u8 = 4;
pub const STANDARD_REACTIVE_SPEED_MAX: u8 = 3;

/// Normal operating mode.
pub const DEVICE_MODE_NORMAL: u8 = 0x00;
/// Factory test mode. Blocked.
pub const DEVICE_MODE_FACTORY: u8 = 0x02;
/// Driver mode: the host handles special keys.
pub const DEVICE_MODE_DRIVER: u8 = 0x03;

fn clamp_logged<T: Ord + Copy + std::fmt::Display>(field: &'static str, value: T, min: T, max: T) -> T {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(field, requested = %value, clamped = %clamped, "Value clamped to hardware range");
    }
    clamped
}

/// Clamp a DPI value to `DPI_MIN..=max_dpi`.
pub fn clamp_dpi(dpi: u16, max_dpi: u16) -> u16 {
    clamp_logged("dpi", dpi, DPI_MIN, max_dpi.max(DPI_MIN))
}

pub fn clamp_low_battery_threshold(raw: u8) -> u8 {
    clamp_logged("low_battery_threshold", raw, LOW_BATTERY_MIN, LOW_BATTERY_MAX)
}

pub fn clamp_idle_time(seconds: u16) -> u16 {
    clamp_logged("idle_time", seconds, IDLE_TIME_MIN, IDLE_TIME_MAX)
}

pub fn clamp_reactive_speed(speed: u8, max: u8) -> u8 {
    clamp_logged("reactive_speed", speed, REACTIVE_SPEED_MIN, max)
}

/// Sanitize a device mode write.
///
/// Factory mode becomes normal mode and the parameter byte is always zero.
pub fn sanitize_device_mode(mode: u8) -> (u8, u8) {
    if mode == DEVICE_MODE_FACTORY {
        warn!("Refusing factory test mode, using normal mode");
        return (DEVICE_MODE_NORMAL, 0x00);
    }
    (mode, 0x00)
}
