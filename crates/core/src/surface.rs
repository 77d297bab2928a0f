//! Named device attributes.
//!
//! Each attribute reads as a line of text and writes from raw bytes, the way
//! a sysfs-style configuration interface presents a device. Writes return
//! the number of bytes consumed. Frame and stage writes consume the whole
//! buffer even when trailing bytes were dropped under
//! [`TruncationPolicy::Truncate`], so callers that resubmit unconsumed bytes
//! do not loop.
//!
//! | attribute                       | read              | write                         |
//! |---------------------------------|-------------------|-------------------------------|
//! | `dpi`                           | `x:y`             | u16 BE, or X then Y           |
//! | `dpi_stages`                    | `active x:y ...`  | active, then X,Y u16 BE pairs |
//! | `poll_rate`                     | Hz                | ASCII Hz                      |
//! | `firmware_version`              | `vMAJOR.MINOR`    |                               |
//! | `device_serial`                 | serial            |                               |
//! | `device_mode`                   | `mode:param`      | mode, param                   |
//! | `charge_level`                  | 0-255             |                               |
//! | `charge_status`                 | 0 or 1            |                               |
//! | `charge_low_threshold`          | raw               | ASCII raw                     |
//! | `charge_effect`                 |                   | 0 matrix, 1 static            |
//! | `charge_colour`                 |                   | R, G, B                       |
//! | `device_idle_time`              | seconds           | ASCII seconds                 |
//! | `<zone>_led_brightness`         | 0-255             | ASCII 0-255                   |
//! | `<zone>_led_state`              | 0 or 1            | ASCII 0 or 1                  |
//! | `<zone>_led_rgb`                | `#rrggbb`         | R, G, B                       |
//! | `<zone>_matrix_effect_<effect>` |                   | effect arguments              |
//! | `matrix_custom_frame`           |                   | row, start, end, RGB...       |

use crate::capability::{Dialect, ModelEntry, Operation, Zone};
use crate::device::PollingRate;
use crate::dpi_stages::{DpiStage, TruncationPolicy, STAGE_LEN};
use crate::encode::FrameRow;
use crate::error::{Error, Result};
use crate::lighting::{self, Breath, Effect, Rgb, WaveDirection};
use crate::session::DeviceSession;
use crate::{dpi, info, power, report_rate};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Effect attribute suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    None,
    Static,
    Blinking,
    Breath,
    Spectrum,
    Reactive,
    Wave,
    Custom,
}

impl EffectKind {
    pub const ALL: &'static [EffectKind] = &[
        EffectKind::None,
        EffectKind::Static,
        EffectKind::Blinking,
        EffectKind::Breath,
        EffectKind::Spectrum,
        EffectKind::Reactive,
        EffectKind::Wave,
        EffectKind::Custom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::None => "none",
            EffectKind::Static => "static",
            EffectKind::Blinking => "blinking",
            EffectKind::Breath => "breath",
            EffectKind::Spectrum => "spectrum",
            EffectKind::Reactive => "reactive",
            EffectKind::Wave => "wave",
            EffectKind::Custom => "custom",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

/// A device attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Dpi,
    DpiStages,
    PollRate,
    FirmwareVersion,
    DeviceSerial,
    DeviceMode,
    ChargeLevel,
    ChargeStatus,
    ChargeLowThreshold,
    ChargeEffect,
    ChargeColour,
    DeviceIdleTime,
    LedBrightness(Zone),
    LedState(Zone),
    LedRgb(Zone),
    MatrixEffect(Zone, EffectKind),
    MatrixCustomFrame,
}

impl Attribute {
    fn read_operation(&self) -> Option<Operation> {
        match *self {
            Attribute::Dpi => Some(Operation::GetDpi),
            Attribute::DpiStages => Some(Operation::GetDpiStages),
            Attribute::PollRate => Some(Operation::GetPollingRate),
            Attribute::FirmwareVersion => Some(Operation::GetFirmwareVersion),
            Attribute::DeviceSerial => Some(Operation::GetSerial),
            Attribute::DeviceMode => Some(Operation::GetDeviceMode),
            Attribute::ChargeLevel => Some(Operation::GetBatteryLevel),
            Attribute::ChargeStatus => Some(Operation::GetChargingStatus),
            Attribute::ChargeLowThreshold => Some(Operation::GetLowBatteryThreshold),
            Attribute::DeviceIdleTime => Some(Operation::GetIdleTime),
            Attribute::LedBrightness(z) => Some(Operation::GetBrightness(z)),
            Attribute::LedState(z) => Some(Operation::GetLedState(z)),
            Attribute::LedRgb(z) => Some(Operation::GetLedRgb(z)),
            Attribute::MatrixEffect(..)
            | Attribute::MatrixCustomFrame
            | Attribute::ChargeEffect
            | Attribute::ChargeColour => None,
        }
    }

    fn write_operation(&self, entry: &ModelEntry) -> Option<Operation> {
        match *self {
            Attribute::Dpi => Some(Operation::SetDpi),
            Attribute::DpiStages => Some(Operation::SetDpiStages),
            Attribute::PollRate => Some(Operation::SetPollingRate),
            Attribute::DeviceMode => Some(Operation::SetDeviceMode),
            Attribute::ChargeLowThreshold => Some(Operation::SetLowBatteryThreshold),
            Attribute::DeviceIdleTime => Some(Operation::SetIdleTime),
            Attribute::LedBrightness(z) => Some(Operation::SetBrightness(z)),
            Attribute::LedState(z) => Some(Operation::SetLedState(z)),
            Attribute::LedRgb(z) => Some(Operation::SetLedRgb(z)),
            Attribute::MatrixEffect(z, EffectKind::Custom) => Some(Operation::SetCustomEffect(z)),
            Attribute::MatrixEffect(z, _) => Some(Operation::SetEffect(z)),
            Attribute::ChargeEffect => Some(Operation::SetChargeEffect),
            Attribute::ChargeColour => Some(Operation::SetChargeColor),
            Attribute::MatrixCustomFrame => frame_zone(entry).map(Operation::SetCustomFrame),
            Attribute::FirmwareVersion
            | Attribute::DeviceSerial
            | Attribute::ChargeLevel
            | Attribute::ChargeStatus => None,
        }
    }

    pub fn is_readable(&self, entry: &ModelEntry) -> bool {
        self.read_operation().is_some_and(|op| entry.supports(op))
    }

    pub fn is_writable(&self, entry: &ModelEntry) -> bool {
        self.write_operation(entry).is_some_and(|op| entry.supports(op))
    }
}

/// Zone addressed by `matrix_custom_frame` on non-ARGB models.
fn frame_zone(entry: &ModelEntry) -> Option<Zone> {
    entry.zones().into_iter().find(|z| {
        z.channel_index().is_none() && entry.supports(Operation::SetCustomFrame(*z))
    })
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Dpi => f.write_str("dpi"),
            Attribute::DpiStages => f.write_str("dpi_stages"),
            Attribute::PollRate => f.write_str("poll_rate"),
            Attribute::FirmwareVersion => f.write_str("firmware_version"),
            Attribute::DeviceSerial => f.write_str("device_serial"),
            Attribute::DeviceMode => f.write_str("device_mode"),
            Attribute::ChargeLevel => f.write_str("charge_level"),
            Attribute::ChargeStatus => f.write_str("charge_status"),
            Attribute::ChargeLowThreshold => f.write_str("charge_low_threshold"),
            Attribute::ChargeEffect => f.write_str("charge_effect"),
            Attribute::ChargeColour => f.write_str("charge_colour"),
            Attribute::DeviceIdleTime => f.write_str("device_idle_time"),
            Attribute::LedBrightness(z) => write!(f, "{z}_led_brightness"),
            Attribute::LedState(z) => write!(f, "{z}_led_state"),
            Attribute::LedRgb(z) => write!(f, "{z}_led_rgb"),
            Attribute::MatrixEffect(z, k) => write!(f, "{z}_matrix_effect_{}", k.name()),
            Attribute::MatrixCustomFrame => f.write_str("matrix_custom_frame"),
        }
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let attr = match s {
            "dpi" => Attribute::Dpi,
            "dpi_stages" => Attribute::DpiStages,
            "poll_rate" => Attribute::PollRate,
            "firmware_version" => Attribute::FirmwareVersion,
            "device_serial" => Attribute::DeviceSerial,
            "device_mode" => Attribute::DeviceMode,
            "charge_level" => Attribute::ChargeLevel,
            "charge_status" => Attribute::ChargeStatus,
            "charge_low_threshold" => Attribute::ChargeLowThreshold,
            "charge_effect" => Attribute::ChargeEffect,
            "charge_colour" => Attribute::ChargeColour,
            "device_idle_time" => Attribute::DeviceIdleTime,
            "matrix_custom_frame" => Attribute::MatrixCustomFrame,
            other => {
                let unknown = || Error::Attribute(format!("unknown attribute '{other}'"));
                if let Some(zone) = other.strip_suffix("_led_brightness") {
                    Attribute::LedBrightness(zone.parse().map_err(|_| unknown())?)
                } else if let Some(zone) = other.strip_suffix("_led_state") {
                    Attribute::LedState(zone.parse().map_err(|_| unknown())?)
                } else if let Some(zone) = other.strip_suffix("_led_rgb") {
                    Attribute::LedRgb(zone.parse().map_err(|_| unknown())?)
                } else if let Some((zone, kind)) = other.split_once("_matrix_effect_") {
                    let kind = EffectKind::from_name(kind).ok_or_else(unknown)?;
                    Attribute::MatrixEffect(zone.parse().map_err(|_| unknown())?, kind)
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(attr)
    }
}

/// Every attribute the model exposes.
pub fn attributes(entry: &ModelEntry) -> Vec<Attribute> {
    let mut attrs = vec![
        Attribute::Dpi,
        Attribute::DpiStages,
        Attribute::PollRate,
        Attribute::FirmwareVersion,
        Attribute::DeviceSerial,
        Attribute::DeviceMode,
        Attribute::ChargeLevel,
        Attribute::ChargeStatus,
        Attribute::ChargeLowThreshold,
        Attribute::ChargeEffect,
        Attribute::ChargeColour,
        Attribute::DeviceIdleTime,
    ];
    for zone in entry.zones() {
        attrs.push(Attribute::LedBrightness(zone));
        attrs.push(Attribute::LedState(zone));
        attrs.push(Attribute::LedRgb(zone));
        attrs.extend(EffectKind::ALL.iter().map(|k| Attribute::MatrixEffect(zone, *k)));
    }
    attrs.push(Attribute::MatrixCustomFrame);
    attrs.retain(|a| a.is_readable(entry) || a.is_writable(entry));
    attrs
}

/// Read an attribute as text.
pub fn read_attribute(session: &DeviceSession, attr: Attribute) -> Result<String> {
    let op = attr
        .read_operation()
        .ok_or_else(|| Error::Attribute(format!("{attr} is write-only")))?;
    session.resolve(op)?;

    let text = match attr {
        Attribute::Dpi => {
            let (x, y) = dpi::read_dpi(session)?;
            format!("{x}:{y}")
        }
        Attribute::DpiStages => {
            let (active, stages) = dpi::read_dpi_stages(session)?;
            let mut out = active.to_string();
            for s in stages {
                out.push_str(&format!(" {}:{}", s.x, s.y));
            }
            out
        }
        Attribute::PollRate => report_rate::read_polling_rate(session)?.as_hz().to_string(),
        Attribute::FirmwareVersion => info::read_firmware_version(session)?,
        Attribute::DeviceSerial => info::read_serial(session)?,
        Attribute::DeviceMode => {
            let (mode, param) = info::read_device_mode(session)?;
            format!("{mode}:{param}")
        }
        Attribute::ChargeLevel => power::read_battery_level(session)?.to_string(),
        Attribute::ChargeStatus => (power::read_charging_status(session)? as u8).to_string(),
        Attribute::ChargeLowThreshold => power::read_low_battery_threshold(session)?.to_string(),
        Attribute::DeviceIdleTime => power::read_idle_time(session)?.to_string(),
        Attribute::LedBrightness(z) => lighting::read_brightness(session, z)?.to_string(),
        Attribute::LedState(z) => (lighting::read_led_state(session, z)? as u8).to_string(),
        Attribute::LedRgb(z) => lighting::read_led_rgb(session, z)?.to_string(),
        Attribute::MatrixEffect(..)
        | Attribute::MatrixCustomFrame
        | Attribute::ChargeEffect
        | Attribute::ChargeColour => return Err(Error::Attribute(format!("{attr} is write-only"))),
    };
    Ok(text + "\n")
}

/// Write raw bytes to an attribute. Returns the number of bytes consumed.
pub fn write_attribute(session: &DeviceSession, attr: Attribute, data: &[u8]) -> Result<usize> {
    let op = attr
        .write_operation(session.entry())
        .ok_or_else(|| Error::Attribute(format!("{attr} is read-only")))?;
    session.resolve(op)?;

    match attr {
        Attribute::Dpi => {
            let (x, y) = match data {
                [h, l] => {
                    let v = u16::from_be_bytes([*h, *l]);
                    (v, v)
                }
                [xh, xl, yh, yl] => (u16::from_be_bytes([*xh, *xl]), u16::from_be_bytes([*yh, *yl])),
                _ => {
                    return Err(Error::InvalidPayloadSize {
                        actual: data.len(),
                        expected: 4,
                    })
                }
            };
            dpi::write_dpi(session, x, y)?;
        }
        Attribute::DpiStages => write_stages(session, data)?,
        Attribute::PollRate => {
            let hz: u16 = parse_ascii(attr, data)?;
            let rate = PollingRate::from_hz(hz)
                .ok_or_else(|| Error::Attribute(format!("unsupported polling rate {hz}")))?;
            report_rate::write_polling_rate(session, rate)?;
        }
        Attribute::DeviceMode => match data {
            [mode, _param] => info::write_device_mode(session, *mode)?,
            _ => {
                return Err(Error::InvalidPayloadSize {
                    actual: data.len(),
                    expected: 2,
                })
            }
        },
        Attribute::ChargeLowThreshold => {
            power::write_low_battery_threshold(session, parse_ascii(attr, data)?)?
        }
        Attribute::DeviceIdleTime => power::write_idle_time(session, parse_ascii(attr, data)?)?,
        Attribute::ChargeEffect => match data {
            [b] => power::write_charge_effect(session, power::ChargeEffect::from_byte(*b))?,
            _ => {
                return Err(Error::InvalidPayloadSize {
                    actual: data.len(),
                    expected: 1,
                })
            }
        },
        Attribute::ChargeColour => power::write_charge_color(session, rgb_arg(session, data, 3)?)?,
        Attribute::LedBrightness(z) => lighting::write_brightness(session, z, parse_ascii(attr, data)?)?,
        Attribute::LedState(z) => {
            let on: u8 = parse_ascii(attr, data)?;
            lighting::write_led_state(session, z, on != 0)?
        }
        Attribute::LedRgb(z) => lighting::write_led_rgb(session, z, rgb_arg(session, data, 3)?)?,
        Attribute::MatrixEffect(z, kind) => {
            let effect = effect_from_bytes(session, kind, data)?;
            lighting::set_effect(session, z, effect)?
        }
        Attribute::MatrixCustomFrame => write_frames(session, data)?,
        Attribute::FirmwareVersion
        | Attribute::DeviceSerial
        | Attribute::ChargeLevel
        | Attribute::ChargeStatus => {
            return Err(Error::Attribute(format!("{attr} is read-only")))
        }
    }
    Ok(data.len())
}

fn parse_ascii<T: FromStr>(attr: Attribute, data: &[u8]) -> Result<T> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            Error::Attribute(format!(
                "{attr}: expected a number, got {:?}",
                String::from_utf8_lossy(data)
            ))
        })
}

/// Colour from the first bytes of `data`, which must hold exactly `len`
/// bytes under the strict policy and at least `len` otherwise.
fn rgb_arg(session: &DeviceSession, data: &[u8], len: usize) -> Result<Rgb> {
    let too_short = data.len() < len;
    let too_long = data.len() > len && session.policy() == TruncationPolicy::Strict;
    if too_short || too_long {
        return Err(Error::InvalidPayloadSize {
            actual: data.len(),
            expected: len,
        });
    }
    Rgb::from_slice(&data[len - 3..]).ok_or(Error::InvalidPayloadSize {
        actual: data.len(),
        expected: len,
    })
}

fn effect_from_bytes(session: &DeviceSession, kind: EffectKind, data: &[u8]) -> Result<Effect> {
    let effect = match kind {
        EffectKind::None => Effect::Off,
        EffectKind::Spectrum => Effect::Spectrum,
        EffectKind::Custom => Effect::Custom,
        EffectKind::Static => Effect::Static(rgb_arg(session, data, 3)?),
        EffectKind::Blinking => Effect::Blink(rgb_arg(session, data, 3)?),
        EffectKind::Breath => match data.len() {
            3 => Effect::Breathe(Breath::Single(Rgb::new(data[0], data[1], data[2]))),
            6 => Effect::Breathe(Breath::Dual(
                Rgb::new(data[0], data[1], data[2]),
                Rgb::new(data[3], data[4], data[5]),
            )),
            _ => Effect::Breathe(Breath::Random),
        },
        EffectKind::Reactive => Effect::Reactive {
            speed: data.first().copied().unwrap_or(0),
            color: rgb_arg(session, data, 4)?,
        },
        EffectKind::Wave => {
            let raw = match data.first() {
                Some(d @ b'0'..=b'9') => d - b'0',
                Some(d) => *d,
                None => {
                    return Err(Error::InvalidPayloadSize {
                        actual: 0,
                        expected: 1,
                    })
                }
            };
            Effect::Wave(WaveDirection::from_byte(raw))
        }
    };
    Ok(effect)
}

fn write_stages(session: &DeviceSession, data: &[u8]) -> Result<()> {
    let Some((&active, rest)) = data.split_first() else {
        return Err(Error::InvalidPayloadSize {
            actual: 0,
            expected: 1 + STAGE_LEN,
        });
    };
    let trailing = rest.len() % STAGE_LEN;
    if trailing != 0 {
        if session.policy() == TruncationPolicy::Strict {
            return Err(Error::InvalidPayloadSize {
                actual: data.len(),
                expected: data.len() - trailing,
            });
        }
        warn!(trailing, "Ignoring partial DPI stage");
    }
    let stages: Vec<DpiStage> = rest
        .chunks_exact(STAGE_LEN)
        .map(|c| DpiStage::new(u16::from_be_bytes([c[0], c[1]]), u16::from_be_bytes([c[2], c[3]])))
        .collect();
    dpi::write_dpi_stages(session, &stages, active)
}

/// Parse and upload a stream of `[row, start, end, rgb...]` segments.
///
/// The whole stream is parsed before anything is sent.
fn write_frames(session: &DeviceSession, data: &[u8]) -> Result<()> {
    let entry = session.entry();
    let argb = entry.dialect == Dialect::ChannelArgb;
    let fixed_zone = frame_zone(entry);

    let mut rows = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (header, body) = rest.split_at(rest.len().min(3));
        let needed = match header {
            [_, start, end] if start <= end => Some(FrameRow::expected_len(*start, *end)),
            [_, start, end] => {
                return Err(Error::OutOfRange {
                    field: "start_column",
                    value: *start as u32,
                    min: 0,
                    max: *end as u32,
                })
            }
            _ => None,
        };
        let needed = match needed {
            Some(n) if body.len() >= n => n,
            _ => {
                if session.policy() == TruncationPolicy::Strict {
                    return Err(Error::InvalidPayloadSize {
                        actual: rest.len(),
                        expected: 3 + needed.unwrap_or(3),
                    });
                }
                warn!(dropped = rest.len(), "Ignoring incomplete custom frame segment");
                break;
            }
        };

        let (row, start, end) = (header[0], header[1], header[2]);
        let (zone, row) = if argb {
            (Zone::Channel(row.saturating_add(1)), 0)
        } else {
            let zone = fixed_zone.ok_or(Error::Unsupported {
                model: entry.id,
                operation: Operation::SetCustomFrame(Zone::Backlight),
            })?;
            (zone, row)
        };
        rows.push((zone, row, start, end, &body[..needed]));
        rest = &body[needed..];
    }

    for (zone, row, start, end, rgb) in rows {
        lighting::write_custom_frame(session, zone, row, start, end, rgb)?;
    }
    Ok(())
}
