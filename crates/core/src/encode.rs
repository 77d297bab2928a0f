//! Report encoding.
//!
//! [`encode`] is the second half of variant resolution: given the
//! [`EncodingDescriptor`] for a model and a typed [`Command`], it builds the
//! report(s) that carry it. It performs no I/O and consults no table, so a new
//! dialect only touches this module.
//!
//! Command classes used:
//!
//! | class | meaning                                   |
//! |-------|-------------------------------------------|
//! | 0x00  | device info, mode, polling rate           |
//! | 0x03  | classic LEDs, standard matrix effects     |
//! | 0x04  | DPI and DPI stages                        |
//! | 0x07  | battery, power management, wireless dock  |
//! | 0x0F  | extended matrix and ARGB effects          |
//!
//! Read commands set the high bit of the command id.

use crate::capability::{Dialect, DpiFormat, EncodingDescriptor, LedId, Operation, Zone, DPI_BYTE_UNIT};
use crate::device::PollingRate;
use crate::dpi_stages::{encode_stages, DpiStage, TruncationPolicy};
use crate::error::{Error, Result};
use crate::capability::led;
use crate::lighting::{Breath, Effect, Rgb};
use crate::power::ChargeEffect;
use crate::report::{ReportBuilder, ARGS_LEN};
use crate::safety;
use tracing::debug;

/// Command class and id constants.
pub mod commands {
    pub const CLASS_INFO: u8 = 0x00;
    pub const SET_DEVICE_MODE: u8 = 0x04;
    pub const SET_POLLING_RATE: u8 = 0x05;
    pub const GET_FIRMWARE: u8 = 0x81;
    pub const GET_SERIAL: u8 = 0x82;
    pub const GET_DEVICE_MODE: u8 = 0x84;
    pub const GET_POLLING_RATE: u8 = 0x85;

    pub const CLASS_LED: u8 = 0x03;
    pub const SET_LED_STATE: u8 = 0x00;
    pub const SET_LED_RGB: u8 = 0x01;
    pub const SET_LED_EFFECT: u8 = 0x02;
    pub const SET_LED_BRIGHTNESS: u8 = 0x03;
    pub const SET_STANDARD_EFFECT: u8 = 0x0A;
    pub const SET_STANDARD_FRAME: u8 = 0x0B;
    pub const SET_ONE_ROW_FRAME: u8 = 0x0C;
    pub const SET_CHARGE_EFFECT: u8 = 0x10;
    pub const GET_LED_STATE: u8 = 0x80;
    pub const GET_LED_RGB: u8 = 0x81;
    pub const GET_LED_BRIGHTNESS: u8 = 0x83;

    pub const CLASS_DPI: u8 = 0x04;
    pub const SET_DPI_BYTE: u8 = 0x01;
    pub const SET_DPI_WORD: u8 = 0x05;
    pub const SET_DPI_STAGES: u8 = 0x06;
    pub const GET_DPI_BYTE: u8 = 0x81;
    pub const GET_DPI_WORD: u8 = 0x85;
    pub const GET_DPI_STAGES: u8 = 0x86;

    pub const CLASS_POWER: u8 = 0x07;
    pub const SET_LOW_BATTERY: u8 = 0x01;
    pub const SET_DOCK_BRIGHTNESS: u8 = 0x02;
    pub const SET_IDLE_TIME: u8 = 0x03;
    pub const GET_BATTERY: u8 = 0x80;
    pub const GET_LOW_BATTERY: u8 = 0x81;
    pub const GET_DOCK_BRIGHTNESS: u8 = 0x82;
    pub const GET_IDLE_TIME: u8 = 0x83;
    pub const GET_CHARGING: u8 = 0x84;

    pub const CLASS_EXTENDED: u8 = 0x0F;
    pub const SET_EXTENDED_EFFECT: u8 = 0x02;
    pub const SET_EXTENDED_FRAME: u8 = 0x03;
    pub const SET_EXTENDED_BRIGHTNESS: u8 = 0x04;
    pub const GET_EXTENDED_BRIGHTNESS: u8 = 0x84;
}

use commands::*;

/// Data sizes of the fixed-size commands.
const DPI_WORD_SIZE: u8 = 0x07;
const DPI_STAGES_SIZE: u8 = 0x26;
const SERIAL_SIZE: u8 = 0x16;
const STANDARD_FRAME_SIZE: u8 = 0x46;
const ONE_ROW_FRAME_SIZE: u8 = 0x32;

/// Header bytes in front of the RGB data of an extended custom frame.
const EXTENDED_FRAME_HEADER: usize = 5;

/// Extended matrix effect ids.
mod extended_effect {
    pub const NONE: u8 = 0x00;
    pub const STATIC: u8 = 0x01;
    pub const BREATHING: u8 = 0x02;
    pub const SPECTRUM: u8 = 0x03;
    pub const WAVE: u8 = 0x04;
    pub const REACTIVE: u8 = 0x05;
    pub const CUSTOM: u8 = 0x08;
}

/// Classic LED effect ids.
mod classic_effect {
    pub const STATIC: u8 = 0x00;
    pub const BLINK: u8 = 0x01;
    pub const BREATHE: u8 = 0x02;
    pub const SPECTRUM: u8 = 0x04;
}

/// A custom-frame row update: RGB triplets for columns `start..=end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub row: u8,
    pub start: u8,
    pub end: u8,
    pub rgb: Vec<u8>,
}

impl FrameRow {
    /// Bytes of RGB data the column range needs.
    pub fn expected_len(start: u8, end: u8) -> usize {
        3 * (end.saturating_sub(start) as usize + 1)
    }
}

/// A typed operation with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetFirmwareVersion,
    GetSerial,
    GetDeviceMode,
    SetDeviceMode(u8),
    GetPollingRate,
    SetPollingRate(PollingRate),
    GetDpi,
    SetDpi { x: u16, y: u16 },
    GetDpiStages,
    SetDpiStages {
        stages: Vec<DpiStage>,
        active: u8,
        policy: TruncationPolicy,
    },
    SetCombinedPollDpi { rate: PollingRate, x: u16, y: u16 },
    SetLedBitmask(u8),
    GetLedState(Zone),
    SetLedState(Zone, bool),
    GetBrightness(Zone),
    SetBrightness(Zone, u8),
    GetLedRgb(Zone),
    SetLedRgb(Zone, Rgb),
    SetEffect(Zone, Effect),
    SetCustomFrame(Zone, FrameRow),
    GetBatteryLevel,
    GetChargingStatus,
    GetLowBatteryThreshold,
    SetLowBatteryThreshold(u8),
    GetIdleTime,
    SetIdleTime(u16),
    SetChargeEffect(ChargeEffect),
    /// Static charging effect in this colour.
    SetChargeColor(Rgb),
}

impl Command {
    /// The operation this command performs.
    pub fn operation(&self) -> Operation {
        match self {
            Command::GetFirmwareVersion => Operation::GetFirmwareVersion,
            Command::GetSerial => Operation::GetSerial,
            Command::GetDeviceMode => Operation::GetDeviceMode,
            Command::SetDeviceMode(_) => Operation::SetDeviceMode,
            Command::GetPollingRate => Operation::GetPollingRate,
            Command::SetPollingRate(_) => Operation::SetPollingRate,
            Command::GetDpi => Operation::GetDpi,
            Command::SetDpi { .. } => Operation::SetDpi,
            Command::GetDpiStages => Operation::GetDpiStages,
            Command::SetDpiStages { .. } => Operation::SetDpiStages,
            Command::SetCombinedPollDpi { .. } => Operation::SetCombinedPollDpi,
            Command::SetLedBitmask(_) => Operation::SetLedBitmask,
            Command::GetLedState(z) => Operation::GetLedState(*z),
            Command::SetLedState(z, _) => Operation::SetLedState(*z),
            Command::GetBrightness(z) => Operation::GetBrightness(*z),
            Command::SetBrightness(z, _) => Operation::SetBrightness(*z),
            Command::GetLedRgb(z) => Operation::GetLedRgb(*z),
            Command::SetLedRgb(z, _) => Operation::SetLedRgb(*z),
            Command::SetEffect(z, Effect::Custom) => Operation::SetCustomEffect(*z),
            Command::SetEffect(z, _) => Operation::SetEffect(*z),
            Command::SetCustomFrame(z, _) => Operation::SetCustomFrame(*z),
            Command::GetBatteryLevel => Operation::GetBatteryLevel,
            Command::GetChargingStatus => Operation::GetChargingStatus,
            Command::GetLowBatteryThreshold => Operation::GetLowBatteryThreshold,
            Command::SetLowBatteryThreshold(_) => Operation::SetLowBatteryThreshold,
            Command::GetIdleTime => Operation::GetIdleTime,
            Command::SetIdleTime(_) => Operation::SetIdleTime,
            Command::SetChargeEffect(_) => Operation::SetChargeEffect,
            Command::SetChargeColor(_) => Operation::SetChargeColor,
        }
    }
}

fn report(class: u8, id: u8, size: u8, args: &[u8]) -> Result<ReportBuilder> {
    let mut b = ReportBuilder::new(class, id, size)?;
    b.set_args(0, args)?;
    Ok(b)
}

fn unsupported(d: &EncodingDescriptor) -> Error {
    Error::Unsupported {
        model: d.model,
        operation: d.operation,
    }
}

fn led_of(d: &EncodingDescriptor) -> Result<u8> {
    d.led.map(|LedId(id)| id).ok_or_else(|| unsupported(d))
}

/// Build the reports that carry `command` for the model described by `d`.
///
/// Most commands produce one report. Classic-dialect effects produce a short
/// sequence that must be sent in order, one transaction each.
pub fn encode(d: &EncodingDescriptor, command: &Command) -> Result<Vec<ReportBuilder>> {
    if command.operation() != d.operation {
        return Err(Error::Unsupported {
            model: d.model,
            operation: command.operation(),
        });
    }
    let store = d.storage.as_byte();

    let reports = match command {
        Command::GetFirmwareVersion => vec![report(CLASS_INFO, GET_FIRMWARE, 0x02, &[])?],
        Command::GetSerial => vec![report(CLASS_INFO, GET_SERIAL, SERIAL_SIZE, &[])?],
        Command::GetDeviceMode => vec![report(CLASS_INFO, GET_DEVICE_MODE, 0x02, &[])?],
        Command::SetDeviceMode(mode) => {
            let (mode, param) = safety::sanitize_device_mode(*mode);
            vec![report(CLASS_INFO, SET_DEVICE_MODE, 0x02, &[mode, param])?]
        }
        Command::GetPollingRate => vec![report(CLASS_INFO, GET_POLLING_RATE, 0x01, &[])?],
        Command::SetPollingRate(rate) => {
            vec![report(CLASS_INFO, SET_POLLING_RATE, 0x01, &[rate.code()])?]
        }

        Command::GetDpi => match d.dpi_format {
            DpiFormat::Word => vec![report(CLASS_DPI, GET_DPI_WORD, DPI_WORD_SIZE, &[store])?],
            DpiFormat::Byte => vec![report(CLASS_DPI, GET_DPI_BYTE, 0x03, &[])?],
        },
        Command::SetDpi { x, y } => {
            let x = safety::clamp_dpi(*x, d.max_dpi);
            let y = safety::clamp_dpi(*y, d.max_dpi);
            match d.dpi_format {
                DpiFormat::Word => {
                    let [xh, xl] = x.to_be_bytes();
                    let [yh, yl] = y.to_be_bytes();
                    vec![report(
                        CLASS_DPI,
                        SET_DPI_WORD,
                        DPI_WORD_SIZE,
                        &[store, xh, xl, yh, yl, 0x00, 0x00],
                    )?]
                }
                DpiFormat::Byte => vec![report(
                    CLASS_DPI,
                    SET_DPI_BYTE,
                    0x03,
                    &[dpi_to_byte(x), dpi_to_byte(y), 0x00],
                )?],
            }
        }
        Command::GetDpiStages => vec![report(CLASS_DPI, GET_DPI_STAGES, DPI_STAGES_SIZE, &[store])?],
        Command::SetDpiStages {
            stages,
            active,
            policy,
        } => {
            let clamped: Vec<DpiStage> = stages
                .iter()
                .map(|s| DpiStage::new(safety::clamp_dpi(s.x, d.max_dpi), safety::clamp_dpi(s.y, d.max_dpi)))
                .collect();
            let payload = encode_stages(&clamped, *active, *policy)?;
            let mut b = report(CLASS_DPI, SET_DPI_STAGES, DPI_STAGES_SIZE, &[store])?;
            b.set_args(1, &payload)?;
            vec![b]
        }
        Command::SetCombinedPollDpi { rate, x, y } => {
            let x = safety::clamp_dpi(*x, d.max_dpi);
            let y = safety::clamp_dpi(*y, d.max_dpi);
            vec![report(
                CLASS_DPI,
                SET_DPI_BYTE,
                0x03,
                &[dpi_to_byte(x), dpi_to_byte(y), rate.code()],
            )?]
        }
        Command::SetLedBitmask(mask) => {
            vec![report(CLASS_LED, SET_LED_STATE, 0x03, &[store, 0x00, *mask])?]
        }

        Command::GetLedState(_) => vec![report(CLASS_LED, GET_LED_STATE, 0x03, &[store, led_of(d)?])?],
        Command::SetLedState(_, on) => vec![led_state(store, led_of(d)?, *on)?],
        Command::GetLedRgb(_) => vec![report(CLASS_LED, GET_LED_RGB, 0x05, &[store, led_of(d)?])?],
        Command::SetLedRgb(_, rgb) => vec![led_rgb(store, led_of(d)?, *rgb)?],
        Command::GetBrightness(_) => {
            let led = led_of(d)?;
            match d.dialect {
                Dialect::Classic | Dialect::StandardMatrix => {
                    vec![report(CLASS_LED, GET_LED_BRIGHTNESS, 0x03, &[store, led])?]
                }
                Dialect::ExtendedMatrix | Dialect::ChannelArgb => {
                    vec![report(CLASS_EXTENDED, GET_EXTENDED_BRIGHTNESS, 0x03, &[store, led])?]
                }
                // The dock reports one brightness for the whole mouse.
                Dialect::Dock => vec![report(CLASS_POWER, GET_DOCK_BRIGHTNESS, 0x01, &[])?],
            }
        }
        Command::SetBrightness(_, level) => {
            let led = led_of(d)?;
            match d.dialect {
                Dialect::Classic | Dialect::StandardMatrix => {
                    vec![report(CLASS_LED, SET_LED_BRIGHTNESS, 0x03, &[store, led, *level])?]
                }
                Dialect::ExtendedMatrix | Dialect::ChannelArgb => {
                    vec![report(CLASS_EXTENDED, SET_EXTENDED_BRIGHTNESS, 0x03, &[store, led, *level])?]
                }
                Dialect::Dock => vec![report(CLASS_POWER, SET_DOCK_BRIGHTNESS, 0x01, &[*level])?],
            }
        }
        Command::SetEffect(_, effect) => encode_effect(d, effect)?,
        Command::SetCustomFrame(zone, frame) => vec![encode_frame(d, *zone, frame)?],

        Command::GetBatteryLevel => vec![report(CLASS_POWER, GET_BATTERY, 0x02, &[])?],
        Command::GetChargingStatus => vec![report(CLASS_POWER, GET_CHARGING, 0x02, &[])?],
        Command::GetLowBatteryThreshold => vec![report(CLASS_POWER, GET_LOW_BATTERY, 0x01, &[])?],
        Command::SetLowBatteryThreshold(raw) => vec![report(
            CLASS_POWER,
            SET_LOW_BATTERY,
            0x01,
            &[safety::clamp_low_battery_threshold(*raw)],
        )?],
        Command::GetIdleTime => vec![report(CLASS_POWER, GET_IDLE_TIME, 0x02, &[])?],
        Command::SetIdleTime(seconds) => {
            let [hi, lo] = safety::clamp_idle_time(*seconds).to_be_bytes();
            vec![report(CLASS_POWER, SET_IDLE_TIME, 0x02, &[hi, lo])?]
        }
        Command::SetChargeEffect(effect) => vec![charge_effect(*effect)?],
        Command::SetChargeColor(color) => {
            let led = d.led.unwrap_or(led::BATTERY).0;
            vec![charge_effect(ChargeEffect::Static)?, led_rgb(store, led, *color)?]
        }
    };

    debug!(
        model = %d.model,
        operation = %d.operation,
        dialect = ?d.dialect,
        reports = reports.len(),
        "Encoded command"
    );
    Ok(reports
        .into_iter()
        .map(|b| b.transaction_id(d.transaction_id))
        .collect())
}

/// Byte-format DPI value for a clamped DPI.
pub fn dpi_to_byte(dpi: u16) -> u8 {
    (dpi / DPI_BYTE_UNIT).clamp(1, u8::MAX as u16) as u8
}

pub fn dpi_from_byte(b: u8) -> u16 {
    b as u16 * DPI_BYTE_UNIT
}

fn led_state(store: u8, led: u8, on: bool) -> Result<ReportBuilder> {
    report(CLASS_LED, SET_LED_STATE, 0x03, &[store, led, on as u8])
}

fn led_rgb(store: u8, led: u8, c: Rgb) -> Result<ReportBuilder> {
    report(CLASS_LED, SET_LED_RGB, 0x05, &[store, led, c.r, c.g, c.b])
}

fn charge_effect(effect: ChargeEffect) -> Result<ReportBuilder> {
    report(CLASS_LED, SET_CHARGE_EFFECT, 0x01, &[effect.as_byte()])
}

fn led_effect(store: u8, led: u8, effect: u8) -> Result<ReportBuilder> {
    report(CLASS_LED, SET_LED_EFFECT, 0x03, &[store, led, effect])
}

fn encode_effect(d: &EncodingDescriptor, effect: &Effect) -> Result<Vec<ReportBuilder>> {
    match d.dialect {
        Dialect::Classic => classic_effect(d, effect),
        Dialect::StandardMatrix => standard_effect(d, effect).map(|b| vec![b]),
        Dialect::ExtendedMatrix | Dialect::ChannelArgb => extended_effect(d, effect).map(|b| vec![b]),
        Dialect::Dock => Err(unsupported(d)),
    }
}

fn classic_effect(d: &EncodingDescriptor, effect: &Effect) -> Result<Vec<ReportBuilder>> {
    let store = d.storage.as_byte();
    let led = led_of(d)?;
    let with_colour = |id: u8, c: Rgb| -> Result<Vec<ReportBuilder>> {
        Ok(vec![
            led_state(store, led, true)?,
            led_effect(store, led, id)?,
            led_rgb(store, led, c)?,
        ])
    };
    match *effect {
        Effect::Off => Ok(vec![led_state(store, led, false)?]),
        Effect::Static(c) => with_colour(classic_effect::STATIC, c),
        Effect::Blink(c) => with_colour(classic_effect::BLINK, c),
        Effect::Breathe(Breath::Single(c)) => with_colour(classic_effect::BREATHE, c),
        Effect::Spectrum => Ok(vec![
            led_state(store, led, true)?,
            led_effect(store, led, classic_effect::SPECTRUM)?,
        ]),
        _ => Err(unsupported(d)),
    }
}

fn standard_effect(d: &EncodingDescriptor, effect: &Effect) -> Result<ReportBuilder> {
    let store = d.storage.as_byte();
    let id = SET_STANDARD_EFFECT;
    match *effect {
        Effect::Off => report(CLASS_LED, id, 0x01, &[0x00]),
        Effect::Wave(dir) => report(CLASS_LED, id, 0x02, &[0x01, dir.as_byte() + 1]),
        Effect::Reactive { speed, color } => {
            let speed = safety::clamp_reactive_speed(speed, safety::STANDARD_REACTIVE_SPEED_MAX);
            report(CLASS_LED, id, 0x05, &[0x02, speed, color.r, color.g, color.b])
        }
        Effect::Breathe(Breath::Single(c)) => report(CLASS_LED, id, 0x08, &[0x03, 0x01, c.r, c.g, c.b]),
        Effect::Breathe(Breath::Dual(a, b)) => report(
            CLASS_LED,
            id,
            0x08,
            &[0x03, 0x02, a.r, a.g, a.b, b.r, b.g, b.b],
        ),
        Effect::Breathe(Breath::Random) => report(CLASS_LED, id, 0x08, &[0x03, 0x03]),
        Effect::Spectrum => report(CLASS_LED, id, 0x01, &[0x04]),
        Effect::Custom => report(CLASS_LED, id, 0x02, &[0x05, store]),
        Effect::Static(c) => report(CLASS_LED, id, 0x04, &[0x06, c.r, c.g, c.b]),
        Effect::Blink(_) => Err(unsupported(d)),
    }
}

fn extended_effect(d: &EncodingDescriptor, effect: &Effect) -> Result<ReportBuilder> {
    use extended_effect::*;

    let store = d.storage.as_byte();
    let led = led_of(d)?;
    let argb = d.dialect == Dialect::ChannelArgb;
    let base = |effect_id: u8, size: u8| -> Result<ReportBuilder> {
        report(CLASS_EXTENDED, SET_EXTENDED_EFFECT, size, &[store, led, effect_id])
    };

    let b = match *effect {
        Effect::Off => base(NONE, 0x06)?,
        Effect::Static(c) => {
            let mut b = base(STATIC, 0x09)?;
            b.set_args(5, &[0x01, c.r, c.g, c.b])?;
            b
        }
        Effect::Breathe(Breath::Single(c)) => {
            let mut b = base(BREATHING, 0x09)?;
            b.set_arg(3, 0x01)?;
            b.set_args(5, &[0x01, c.r, c.g, c.b])?;
            b
        }
        Effect::Breathe(Breath::Dual(c1, c2)) => {
            let mut b = base(BREATHING, 0x0C)?;
            b.set_arg(3, 0x02)?;
            b.set_args(5, &[0x02, c1.r, c1.g, c1.b, c2.r, c2.g, c2.b])?;
            b
        }
        Effect::Breathe(Breath::Random) => base(BREATHING, 0x06)?,
        Effect::Spectrum => base(SPECTRUM, 0x06)?,
        Effect::Wave(dir) if !argb => {
            let mut b = base(WAVE, 0x06)?;
            b.set_args(3, &[dir.as_byte(), 0x28])?;
            b
        }
        Effect::Reactive { speed, color } if !argb => {
            let mut b = base(REACTIVE, 0x09)?;
            b.set_args(
                4,
                &[
                    safety::clamp_reactive_speed(speed, safety::REACTIVE_SPEED_MAX),
                    0x01,
                    color.r,
                    color.g,
                    color.b,
                ],
            )?;
            b
        }
        Effect::Custom => {
            // Custom mode is device-wide on mice; ARGB switches one channel.
            let (store, led) = if argb { (store, led) } else { (0x00, 0x00) };
            report(CLASS_EXTENDED, SET_EXTENDED_EFFECT, 0x0C, &[store, led, CUSTOM])?
        }
        Effect::Blink(_) | Effect::Wave(_) | Effect::Reactive { .. } => return Err(unsupported(d)),
    };
    Ok(b)
}

fn encode_frame(d: &EncodingDescriptor, zone: Zone, frame: &FrameRow) -> Result<ReportBuilder> {
    let FrameRow { row, start, end, rgb } = frame;
    let (row, start, end) = (*row, *start, *end);

    if start > end {
        return Err(Error::OutOfRange {
            field: "start_column",
            value: start as u32,
            min: 0,
            max: end as u32,
        });
    }
    if end >= d.row_length {
        return Err(Error::OutOfRange {
            field: "end_column",
            value: end as u32,
            min: 0,
            max: d.row_length.saturating_sub(1) as u32,
        });
    }
    let expected = FrameRow::expected_len(start, end);
    if rgb.len() != expected {
        return Err(Error::InvalidPayloadSize {
            actual: rgb.len(),
            expected,
        });
    }
    let single_row = |row: u8| -> Result<()> {
        if row != 0 {
            return Err(Error::OutOfRange {
                field: "row",
                value: row as u32,
                min: 0,
                max: 0,
            });
        }
        Ok(())
    };

    match d.dialect {
        Dialect::StandardMatrix => {
            let mut b = report(CLASS_LED, SET_STANDARD_FRAME, STANDARD_FRAME_SIZE, &[0xFF, row, start, end])?;
            b.set_args(4, rgb)?;
            Ok(b)
        }
        Dialect::ExtendedMatrix | Dialect::ChannelArgb => {
            let row = match zone.channel_index() {
                Some(channel) if d.dialect == Dialect::ChannelArgb => {
                    single_row(row)?;
                    channel
                }
                _ => row,
            };
            let size = expected + EXTENDED_FRAME_HEADER;
            if size > ARGS_LEN {
                return Err(Error::InvalidPayloadSize {
                    actual: expected,
                    expected: ARGS_LEN - EXTENDED_FRAME_HEADER,
                });
            }
            let mut b = report(CLASS_EXTENDED, SET_EXTENDED_FRAME, size as u8, &[0x00, 0x00, row, start, end])?;
            b.set_args(EXTENDED_FRAME_HEADER, rgb)?;
            Ok(b)
        }
        Dialect::Classic => {
            single_row(row)?;
            let mut b = report(CLASS_LED, SET_ONE_ROW_FRAME, ONE_ROW_FRAME_SIZE, &[start, end])?;
            b.set_args(2, rgb)?;
            Ok(b)
        }
        Dialect::Dock => Err(unsupported(d)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{led, ModelId, Storage};
    use crate::lighting::WaveDirection;
    use crate::report::TransactionId;

    fn descriptor(operation: Operation, dialect: Dialect) -> EncodingDescriptor {
        EncodingDescriptor {
            model: ModelId(0x0084),
            operation,
            dialect,
            led: operation.zone().map(Zone::default_led),
            storage: Storage::VarStore,
            transaction_id: TransactionId::STANDARD,
            dpi_format: DpiFormat::Word,
            max_dpi: 20000,
            row_length: 16,
        }
    }

    fn one(d: &EncodingDescriptor, c: &Command) -> crate::report::Report {
        let mut out = encode(d, c).unwrap();
        assert_eq!(out.len(), 1);
        out.remove(0).finalize()
    }

    const RED: Rgb = Rgb { r: 0xFF, g: 0x00, b: 0x00 };

    #[test]
    fn set_dpi_word() {
        let d = descriptor(Operation::SetDpi, Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetDpi { x: 1800, y: 3200 });
        assert_eq!((r.command_class(), r.command_id(), r.data_size()), (0x04, 0x05, 7));
        assert_eq!(r.payload(), &[0x01, 0x07, 0x08, 0x0C, 0x80, 0x00, 0x00]);
        assert_eq!(r.transaction_id(), TransactionId::STANDARD);
    }

    #[test]
    fn set_dpi_clamps_to_model_max() {
        let d = descriptor(Operation::SetDpi, Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetDpi { x: 65000, y: 10 });
        assert_eq!(&r.payload()[1..5], &[0x4E, 0x20, 0x00, 0x64]);
    }

    #[test]
    fn set_dpi_byte() {
        let mut d = descriptor(Operation::SetDpi, Dialect::Classic);
        d.dpi_format = DpiFormat::Byte;
        let r = one(&d, &Command::SetDpi { x: 1800, y: 900 });
        assert_eq!((r.command_id(), r.payload()), (0x01, &[18u8, 9, 0][..]));
    }

    #[test]
    fn extended_static_layout() {
        let d = descriptor(Operation::SetEffect(Zone::Logo), Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetEffect(Zone::Logo, Effect::Static(RED)));
        assert_eq!((r.command_class(), r.command_id(), r.data_size()), (0x0F, 0x02, 9));
        assert_eq!(
            r.payload(),
            &[0x01, led::LOGO.0, 0x01, 0x00, 0x00, 0x01, 0xFF, 0x00, 0x00]
        );
    }

    #[test]
    fn extended_wave_and_reactive() {
        let d = descriptor(Operation::SetEffect(Zone::Logo), Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetEffect(Zone::Logo, Effect::Wave(WaveDirection::Right)));
        assert_eq!(r.payload(), &[0x01, 0x04, 0x04, 0x01, 0x28, 0x00]);

        let r = one(
            &d,
            &Command::SetEffect(Zone::Logo, Effect::Reactive { speed: 9, color: RED }),
        );
        assert_eq!(r.payload(), &[0x01, 0x04, 0x05, 0x00, 0x04, 0x01, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn extended_breathing_variants() {
        let d = descriptor(Operation::SetEffect(Zone::Logo), Dialect::ExtendedMatrix);
        let blue = Rgb::new(0, 0, 0xFF);
        let r = one(&d, &Command::SetEffect(Zone::Logo, Effect::Breathe(Breath::Dual(RED, blue))));
        assert_eq!(r.data_size(), 0x0C);
        assert_eq!(
            r.payload(),
            &[0x01, 0x04, 0x02, 0x02, 0x00, 0x02, 0xFF, 0, 0, 0, 0, 0xFF]
        );
        let r = one(&d, &Command::SetEffect(Zone::Logo, Effect::Breathe(Breath::Random)));
        assert_eq!(r.payload(), &[0x01, 0x04, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn extended_custom_mode_is_device_wide() {
        let d = descriptor(Operation::SetCustomEffect(Zone::Backlight), Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetEffect(Zone::Backlight, Effect::Custom));
        assert_eq!(&r.payload()[..3], &[0x00, 0x00, 0x08]);
        assert_eq!(r.data_size(), 0x0C);
    }

    #[test]
    fn standard_effects() {
        let d = descriptor(Operation::SetEffect(Zone::Backlight), Dialect::StandardMatrix);
        let r = one(&d, &Command::SetEffect(Zone::Backlight, Effect::Static(RED)));
        assert_eq!((r.command_class(), r.command_id()), (0x03, 0x0A));
        assert_eq!(r.payload(), &[0x06, 0xFF, 0x00, 0x00]);

        let r = one(&d, &Command::SetEffect(Zone::Backlight, Effect::Wave(WaveDirection::Left)));
        assert_eq!(r.payload(), &[0x01, 0x01]);

        let r = one(&d, &Command::SetEffect(Zone::Backlight, Effect::Spectrum));
        assert_eq!(r.payload(), &[0x04]);

        let mut d = descriptor(Operation::SetCustomEffect(Zone::Backlight), Dialect::StandardMatrix);
        d.storage = Storage::NoStore;
        let r = one(&d, &Command::SetEffect(Zone::Backlight, Effect::Custom));
        assert_eq!(r.payload(), &[0x05, 0x00]);
    }

    #[test]
    fn classic_effect_is_a_sequence() {
        let d = descriptor(Operation::SetEffect(Zone::Logo), Dialect::Classic);
        let out: Vec<_> = encode(&d, &Command::SetEffect(Zone::Logo, Effect::Blink(RED)))
            .unwrap()
            .into_iter()
            .map(|b| b.finalize())
            .collect();
        let ids: Vec<u8> = out.iter().map(|r| r.command_id()).collect();
        assert_eq!(ids, vec![0x00, 0x02, 0x01]);
        assert_eq!(out[0].payload(), &[0x01, 0x04, 0x01]);
        assert_eq!(out[1].payload(), &[0x01, 0x04, 0x01]);
        assert_eq!(out[2].payload(), &[0x01, 0x04, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn dialects_reject_what_they_cannot_express() {
        let classic = descriptor(Operation::SetEffect(Zone::Logo), Dialect::Classic);
        let wave = Command::SetEffect(Zone::Logo, Effect::Wave(WaveDirection::Left));
        assert!(matches!(encode(&classic, &wave), Err(Error::Unsupported { .. })));

        let standard = descriptor(Operation::SetEffect(Zone::Logo), Dialect::StandardMatrix);
        let blink = Command::SetEffect(Zone::Logo, Effect::Blink(RED));
        assert!(matches!(encode(&standard, &blink), Err(Error::Unsupported { .. })));

        let argb = descriptor(Operation::SetEffect(Zone::Channel(1)), Dialect::ChannelArgb);
        let wave = Command::SetEffect(Zone::Channel(1), Effect::Wave(WaveDirection::Left));
        assert!(matches!(encode(&argb, &wave), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn custom_mode_has_its_own_operation() {
        let custom = Command::SetEffect(Zone::Backlight, Effect::Custom);
        assert_eq!(custom.operation(), Operation::SetCustomEffect(Zone::Backlight));
        let d = descriptor(Operation::SetEffect(Zone::Backlight), Dialect::StandardMatrix);
        assert!(matches!(encode(&d, &custom), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn dock_brightness() {
        let d = descriptor(Operation::SetBrightness(Zone::Backlight), Dialect::Dock);
        let r = one(&d, &Command::SetBrightness(Zone::Backlight, 0x80));
        assert_eq!((r.command_class(), r.command_id(), r.data_size()), (0x07, 0x02, 0x01));
        assert_eq!(r.payload(), &[0x80]);

        let d = descriptor(Operation::GetBrightness(Zone::Backlight), Dialect::Dock);
        let r = one(&d, &Command::GetBrightness(Zone::Backlight));
        assert_eq!((r.command_class(), r.command_id(), r.data_size()), (0x07, 0x82, 0x01));

        let d = descriptor(Operation::SetEffect(Zone::Backlight), Dialect::Dock);
        let spectrum = Command::SetEffect(Zone::Backlight, Effect::Spectrum);
        assert!(matches!(encode(&d, &spectrum), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn charge_colour_selects_static_then_colours_battery_led() {
        let mut d = descriptor(Operation::SetChargeColor, Dialect::StandardMatrix);
        d.storage = Storage::NoStore;
        d.transaction_id = TransactionId::LEGACY;
        let out: Vec<_> = encode(&d, &Command::SetChargeColor(RED))
            .unwrap()
            .into_iter()
            .map(|b| b.finalize())
            .collect();
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].command_class(), out[0].command_id()), (0x03, 0x10));
        assert_eq!(out[0].payload(), &[0x01]);
        assert_eq!((out[1].command_class(), out[1].command_id()), (0x03, 0x01));
        assert_eq!(out[1].payload(), &[0x00, led::BATTERY.0, 0xFF, 0x00, 0x00]);
        assert!(out.iter().all(|r| r.transaction_id() == TransactionId::LEGACY));

        let d = descriptor(Operation::SetChargeEffect, Dialect::StandardMatrix);
        let r = one(&d, &Command::SetChargeEffect(ChargeEffect::Matrix));
        assert_eq!(r.payload(), &[0x00]);
    }

    #[test]
    fn command_must_match_descriptor() {
        let d = descriptor(Operation::GetDpi, Dialect::ExtendedMatrix);
        assert!(matches!(
            encode(&d, &Command::GetBatteryLevel),
            Err(Error::Unsupported {
                operation: Operation::GetBatteryLevel,
                ..
            })
        ));
    }

    fn frame(start: u8, end: u8, len: usize) -> FrameRow {
        FrameRow {
            row: 0,
            start,
            end,
            rgb: vec![0xAB; len],
        }
    }

    #[test]
    fn custom_frame_length_checked() {
        let d = descriptor(Operation::SetCustomFrame(Zone::Backlight), Dialect::ExtendedMatrix);
        let ok = Command::SetCustomFrame(Zone::Backlight, frame(2, 4, 9));
        let r = one(&d, &ok);
        assert_eq!(r.data_size(), 9 + 5);
        assert_eq!(&r.payload()[..5], &[0x00, 0x00, 0x00, 0x02, 0x04]);

        let short = Command::SetCustomFrame(Zone::Backlight, frame(2, 4, 8));
        assert!(matches!(
            encode(&d, &short),
            Err(Error::InvalidPayloadSize { actual: 8, expected: 9 })
        ));
    }

    #[test]
    fn custom_frame_column_bounds() {
        let d = descriptor(Operation::SetCustomFrame(Zone::Backlight), Dialect::ExtendedMatrix);
        let past_end = Command::SetCustomFrame(Zone::Backlight, frame(0, 16, 51));
        assert!(matches!(encode(&d, &past_end), Err(Error::OutOfRange { field: "end_column", .. })));
        let reversed = Command::SetCustomFrame(Zone::Backlight, frame(4, 2, 3));
        assert!(matches!(encode(&d, &reversed), Err(Error::OutOfRange { field: "start_column", .. })));
    }

    #[test]
    fn custom_frame_per_dialect() {
        let zone = Zone::Backlight;
        let std = descriptor(Operation::SetCustomFrame(zone), Dialect::StandardMatrix);
        let r = one(&std, &Command::SetCustomFrame(zone, frame(0, 1, 6)));
        assert_eq!((r.command_class(), r.command_id(), r.data_size()), (0x03, 0x0B, 0x46));
        assert_eq!(&r.payload()[..4], &[0xFF, 0x00, 0x00, 0x01]);

        let classic = descriptor(Operation::SetCustomFrame(zone), Dialect::Classic);
        let r = one(&classic, &Command::SetCustomFrame(zone, frame(0, 1, 6)));
        assert_eq!((r.command_id(), r.data_size()), (0x0C, 0x32));
        assert_eq!(&r.payload()[..3], &[0x00, 0x01, 0xAB]);

        let mut row1 = frame(0, 1, 6);
        row1.row = 1;
        assert!(encode(&classic, &Command::SetCustomFrame(zone, row1)).is_err());

        let ch = Zone::Channel(3);
        let argb = descriptor(Operation::SetCustomFrame(ch), Dialect::ChannelArgb);
        let r = one(&argb, &Command::SetCustomFrame(ch, frame(0, 1, 6)));
        // Channel 3 is row 2.
        assert_eq!(&r.payload()[..5], &[0x00, 0x00, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn power_commands_clamp() {
        let d = descriptor(Operation::SetIdleTime, Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetIdleTime(5000));
        assert_eq!(r.payload(), &[0x03, 0x84]);

        let d = descriptor(Operation::SetLowBatteryThreshold, Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetLowBatteryThreshold(0x01));
        assert_eq!(r.payload(), &[0x0C]);
    }

    #[test]
    fn device_mode_factory_blocked() {
        let d = descriptor(Operation::SetDeviceMode, Dialect::ExtendedMatrix);
        let r = one(&d, &Command::SetDeviceMode(0x02));
        assert_eq!(r.payload(), &[0x00, 0x00]);
    }

    #[test]
    fn dpi_stages_report() {
        let d = descriptor(Operation::SetDpiStages, Dialect::ExtendedMatrix);
        let r = one(
            &d,
            &Command::SetDpiStages {
                stages: vec![DpiStage::new(800, 800), DpiStage::new(1600, 1600)],
                active: 2,
                policy: TruncationPolicy::Strict,
            },
        );
        assert_eq!((r.command_class(), r.command_id(), r.data_size()), (0x04, 0x06, 0x26));
        assert_eq!(
            &r.arguments()[..11],
            &[0x01, 0x02, 0x02, 0x03, 0x20, 0x03, 0x20, 0x06, 0x40, 0x06, 0x40]
        );
    }
}
