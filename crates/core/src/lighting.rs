//! LED state, brightness, colour, effects and custom frames.

use crate::capability::{Dialect, Operation, Zone};
use crate::encode::{Command, FrameRow};
use crate::error::{Error, Result};
use crate::session::{led_bits, DeviceSession};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 24-bit colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [r, g, b, ..] => Some(Self::new(*r, *g, *b)),
            _ => None,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    /// Accepts `rrggbb` with an optional leading `#`.
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim_start_matches('#');
        let bad = || Error::Config(format!("bad colour '{s}'"));
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(bad());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
        Ok(Self::new(byte(0)?, byte(2)?, byte(4)?))
    }
}

/// Wave travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveDirection {
    Left,
    Right,
}

impl WaveDirection {
    pub fn from_byte(b: u8) -> Self {
        if b == 0 {
            Self::Left
        } else {
            Self::Right
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// Breathing colour mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Breath {
    Single(Rgb),
    Dual(Rgb, Rgb),
    Random,
}

/// Lighting effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Off,
    Static(Rgb),
    Blink(Rgb),
    Breathe(Breath),
    Spectrum,
    /// Light up on key press and fade; speed 1 (short) to 4 (long).
    Reactive { speed: u8, color: Rgb },
    Wave(WaveDirection),
    /// Show whatever was last uploaded with a custom frame.
    Custom,
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Off => "none",
            Effect::Static(_) => "static",
            Effect::Blink(_) => "blinking",
            Effect::Breathe(_) => "breath",
            Effect::Spectrum => "spectrum",
            Effect::Reactive { .. } => "reactive",
            Effect::Wave(_) => "wave",
            Effect::Custom => "custom",
        }
    }
}

fn led_bit(session: &DeviceSession, zone: Zone, operation: Operation) -> Result<u8> {
    match zone {
        Zone::Logo => Ok(led_bits::LOGO),
        Zone::ScrollWheel => Ok(led_bits::SCROLL_WHEEL),
        _ => Err(Error::Unsupported {
            model: session.model(),
            operation,
        }),
    }
}

/// Whether the zone's LED is on.
pub fn read_led_state(session: &DeviceSession, zone: Zone) -> Result<bool> {
    if let Some(shadow) = session.shadow() {
        let op = Operation::GetLedState(zone);
        session.resolve(op)?;
        return Ok(shadow.led_bitmask & led_bit(session, zone, op)? != 0);
    }
    let resp = session.read(&Command::GetLedState(zone))?;
    Ok(resp.arg(2) != 0)
}

/// Switch the zone's LED on or off.
pub fn write_led_state(session: &DeviceSession, zone: Zone, on: bool) -> Result<()> {
    if session.is_shadowed() {
        let op = Operation::SetLedState(zone);
        session.resolve(op)?;
        let bit = led_bit(session, zone, op)?;
        return session.write_shadowed(op, |s| {
            if on {
                s.led_bitmask |= bit;
            } else {
                s.led_bitmask &= !bit;
            }
            Command::SetLedBitmask(s.led_bitmask)
        });
    }
    session.write(&Command::SetLedState(zone, on))
}

pub fn read_brightness(session: &DeviceSession, zone: Zone) -> Result<u8> {
    let dialect = session.resolve(Operation::GetBrightness(zone))?.dialect;
    let resp = session.read(&Command::GetBrightness(zone))?;
    // The dock answers with the bare level.
    Ok(match dialect {
        Dialect::Dock => resp.arg(0),
        _ => resp.arg(2),
    })
}

pub fn write_brightness(session: &DeviceSession, zone: Zone, level: u8) -> Result<()> {
    session.write(&Command::SetBrightness(zone, level))
}

pub fn read_led_rgb(session: &DeviceSession, zone: Zone) -> Result<Rgb> {
    let resp = session.read(&Command::GetLedRgb(zone))?;
    Ok(Rgb::new(resp.arg(2), resp.arg(3), resp.arg(4)))
}

pub fn write_led_rgb(session: &DeviceSession, zone: Zone, color: Rgb) -> Result<()> {
    session.write(&Command::SetLedRgb(zone, color))
}

/// Apply an effect to a zone.
pub fn set_effect(session: &DeviceSession, zone: Zone, effect: Effect) -> Result<()> {
    session.write(&Command::SetEffect(zone, effect))
}

/// Upload one row of a custom frame.
///
/// `rgb` must hold exactly `3 * (end - start + 1)` bytes; nothing is sent
/// otherwise.
pub fn write_custom_frame(
    session: &DeviceSession,
    zone: Zone,
    row: u8,
    start: u8,
    end: u8,
    rgb: &[u8],
) -> Result<()> {
    let frame = FrameRow {
        row,
        start,
        end,
        rgb: rgb.to_vec(),
    };
    session.write(&Command::SetCustomFrame(zone, frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityTable, ModelId};
    use crate::pids;
    use crate::report::TransactionId;
    use crate::transaction::mock::MockTransport;
    use std::sync::Arc;

    fn attach(pid: u16, mock: &Arc<MockTransport>) -> DeviceSession {
        DeviceSession::attach(CapabilityTable::builtin().unwrap(), ModelId(pid), mock.clone()).unwrap()
    }

    #[test]
    fn rgb_parse() {
        assert_eq!("#ff8000".parse::<Rgb>().unwrap(), Rgb::new(0xFF, 0x80, 0x00));
        assert_eq!("00FF00".parse::<Rgb>().unwrap(), Rgb::new(0, 0xFF, 0));
        assert!("fff".parse::<Rgb>().is_err());
        assert!("gg0000".parse::<Rgb>().is_err());
        assert_eq!(Rgb::new(1, 2, 3).to_string(), "#010203");
    }

    #[test]
    fn brightness_extended() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(0x0F, 0x84, &[0x01, 0x04, 0xC8]);
        let s = attach(pids::DEATHADDER_V2, &mock);
        assert_eq!(read_brightness(&s, Zone::Logo).unwrap(), 200);
        write_brightness(&s, Zone::ScrollWheel, 10).unwrap();
        let req = &mock.requests()[1];
        assert_eq!((req.command_class(), req.command_id()), (0x0F, 0x04));
        assert_eq!(req.payload(), &[0x01, 0x01, 10]);
    }

    #[test]
    fn brightness_led_override() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::OROCHI_CHROMA, &mock);
        write_brightness(&s, Zone::Backlight, 0x40).unwrap();
        let req = &mock.requests()[0];
        assert_eq!((req.command_class(), req.command_id()), (0x03, 0x03));
        assert_eq!(req.payload(), &[0x01, 0x01, 0x40]);
    }

    #[test]
    fn classic_led_reads() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(0x03, 0x80, &[0x01, 0x04, 0x01]);
        mock.reply(0x03, 0x81, &[0x01, 0x04, 0x10, 0x20, 0x30]);
        let s = attach(pids::DEATHADDER_CHROMA, &mock);
        assert!(read_led_state(&s, Zone::Logo).unwrap());
        assert_eq!(read_led_rgb(&s, Zone::Logo).unwrap(), Rgb::new(0x10, 0x20, 0x30));
    }

    #[test]
    fn classic_effect_sends_each_report() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::DEATHADDER_CHROMA, &mock);
        set_effect(&s, Zone::ScrollWheel, Effect::Static(Rgb::new(0, 0xFF, 0))).unwrap();
        assert_eq!(mock.exchange_count(), 3);
        for req in mock.requests() {
            assert_eq!(req.transaction_id(), TransactionId::LEGACY);
            assert_eq!(req.arg(1), 0x01);
        }
    }

    #[test]
    fn shadowed_led_bitmask() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::OROCHI_2011, &mock);
        write_led_state(&s, Zone::Logo, false).unwrap();
        assert_eq!(mock.requests()[0].payload(), &[0x01, 0x00, led_bits::SCROLL_WHEEL]);
        assert!(!read_led_state(&s, Zone::Logo).unwrap());
        assert!(read_led_state(&s, Zone::ScrollWheel).unwrap());
        assert_eq!(mock.exchange_count(), 1);
    }

    #[test]
    fn custom_frame_short_payload_does_no_io() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::BASILISK_V3, &mock);
        let err = write_custom_frame(&s, Zone::Backlight, 0, 2, 4, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, Error::InvalidPayloadSize { actual: 8, expected: 9 }));
        assert_eq!(mock.exchange_count(), 0);

        write_custom_frame(&s, Zone::Backlight, 0, 2, 4, &[0u8; 9]).unwrap();
        let req = &mock.requests()[0];
        assert_eq!(req.transaction_id(), TransactionId::MODERN);
    }

    #[test]
    fn mamba_frame_uses_dock_transaction_id() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::MAMBA_WIRELESS, &mock);
        write_custom_frame(&s, Zone::Backlight, 0, 0, 14, &[0x11; 45]).unwrap();
        let req = &mock.requests()[0];
        assert_eq!(req.transaction_id(), TransactionId::WIRELESS_DOCK);
        assert_eq!((req.command_class(), req.command_id()), (0x03, 0x0B));
    }

    #[test]
    fn mamba_wireless_brightness_goes_through_dock() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(0x07, 0x82, &[0x9A]);
        let s = attach(pids::MAMBA_WIRELESS, &mock);
        assert_eq!(read_brightness(&s, Zone::Backlight).unwrap(), 0x9A);
        write_brightness(&s, Zone::Backlight, 0x20).unwrap();
        let req = &mock.requests()[1];
        assert_eq!((req.command_class(), req.command_id()), (0x07, 0x02));
        assert_eq!(req.payload(), &[0x20]);
        assert_eq!(req.transaction_id(), TransactionId::LEGACY);
    }

    #[test]
    fn mamba_wireless_custom_mode_is_volatile() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::MAMBA_WIRELESS, &mock);
        set_effect(&s, Zone::Backlight, Effect::Custom).unwrap();
        set_effect(&s, Zone::Backlight, Effect::Spectrum).unwrap();
        let reqs = mock.requests();
        assert_eq!(reqs[0].payload(), &[0x05, 0x00]);
        assert_eq!(reqs[0].transaction_id(), TransactionId::WIRELESS_DOCK);
        assert_eq!(reqs[1].payload(), &[0x04]);
        assert_eq!(reqs[1].transaction_id(), TransactionId::STANDARD);
    }

    #[test]
    fn naga_hex_v2_standard_brightness_and_frame() {
        let mock = Arc::new(MockTransport::new());
        mock.reply(0x03, 0x83, &[0x01, 0x04, 0x55]);
        let s = attach(pids::NAGA_HEX_V2, &mock);
        assert_eq!(read_brightness(&s, Zone::Logo).unwrap(), 0x55);
        write_brightness(&s, Zone::ScrollWheel, 0x30).unwrap();
        write_custom_frame(&s, Zone::Backlight, 0, 0, 2, &[0x22; 9]).unwrap();
        set_effect(&s, Zone::Backlight, Effect::Custom).unwrap();

        let reqs = mock.requests();
        assert_eq!((reqs[0].command_class(), reqs[0].command_id()), (0x03, 0x83));
        assert_eq!((reqs[1].command_class(), reqs[1].command_id()), (0x03, 0x03));
        assert_eq!(reqs[1].payload(), &[0x01, 0x01, 0x30]);
        assert_eq!((reqs[2].command_class(), reqs[2].command_id()), (0x03, 0x0B));
        assert_eq!(&reqs[2].payload()[..4], &[0xFF, 0x00, 0x00, 0x02]);
        assert_eq!((reqs[3].command_class(), reqs[3].command_id()), (0x03, 0x0A));
        assert_eq!(reqs[3].payload(), &[0x05, 0x00]);
        assert!(reqs.iter().all(|r| r.transaction_id() == TransactionId::STANDARD));

        // Three LEDs in the row.
        assert!(write_custom_frame(&s, Zone::Backlight, 0, 0, 3, &[0x22; 12]).is_err());
    }

    #[test]
    fn deathadder_elite_extended_frame() {
        let mock = Arc::new(MockTransport::new());
        let s = attach(pids::DEATHADDER_ELITE, &mock);
        write_custom_frame(&s, Zone::Backlight, 0, 0, 1, &[0x33; 6]).unwrap();
        set_effect(&s, Zone::Backlight, Effect::Custom).unwrap();
        let reqs = mock.requests();
        assert_eq!((reqs[0].command_class(), reqs[0].command_id()), (0x0F, 0x03));
        assert_eq!(&reqs[0].payload()[..5], &[0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!((reqs[1].command_class(), reqs[1].command_id()), (0x0F, 0x02));
        assert_eq!(&reqs[1].payload()[..3], &[0x00, 0x00, 0x08]);
        assert!(reqs.iter().all(|r| r.transaction_id() == TransactionId::STANDARD));
    }
}
