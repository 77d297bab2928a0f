//! Per-model capability table and variant resolution.
//!
//! Razer mice share one report format but disagree on almost everything
//! above it: which LED ids exist, which effect command family drives them,
//! which transaction id the firmware answers to and how long it needs before
//! a response is ready. Instead of special-casing product ids at every call
//! site, each model carries a [`ModelEntry`] in a [`CapabilityTable`], and
//! [`CapabilityTable::resolve`] turns `(model, operation)` into a single
//! [`EncodingDescriptor`] that the encoder consumes.
//!
//! The built-in table is embedded from `data/devices.json`; a replacement can
//! be loaded at runtime with [`CapabilityTable::load`].

use crate::error::{Error, Result};
use crate::report::TransactionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

const BUILTIN_DEVICES: &str = include_str!("../data/devices.json");

/// USB product id of a supported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u16);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Firmware identifier of a single LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedId(pub u8);

/// Canonical LED ids.
pub mod led {
    use super::LedId;

    pub const ZERO: LedId = LedId(0x00);
    pub const SCROLL_WHEEL: LedId = LedId(0x01);
    pub const BATTERY: LedId = LedId(0x03);
    pub const LOGO: LedId = LedId(0x04);
    pub const BACKLIGHT: LedId = LedId(0x05);
    pub const LEFT_SIDE: LedId = LedId(0x10);
    pub const RIGHT_SIDE: LedId = LedId(0x11);
    /// First ARGB channel; channels 1..=6 are consecutive.
    pub const ARGB_CHANNEL_1: LedId = LedId(0x1A);
}

/// Number of addressable channels on ARGB controllers.
pub const ARGB_CHANNELS: u8 = 6;

/// A physical lighting zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    Backlight,
    Logo,
    ScrollWheel,
    Battery,
    LeftSide,
    RightSide,
    /// ARGB controller channel, 1-based.
    Channel(u8),
}

impl Zone {
    /// LED id used when the model entry does not override it.
    pub fn default_led(self) -> LedId {
        match self {
            Zone::Backlight => led::BACKLIGHT,
            Zone::Logo => led::LOGO,
            Zone::ScrollWheel => led::SCROLL_WHEEL,
            Zone::Battery => led::BATTERY,
            Zone::LeftSide => led::LEFT_SIDE,
            Zone::RightSide => led::RIGHT_SIDE,
            Zone::Channel(n) => LedId(led::ARGB_CHANNEL_1.0 + n.saturating_sub(1)),
        }
    }

    /// Zero-based channel index for ARGB zones.
    pub fn channel_index(self) -> Option<u8> {
        match self {
            Zone::Channel(n) => Some(n.saturating_sub(1)),
            _ => None,
        }
    }

    /// Every non-channel zone.
    pub const FIXED: &'static [Zone] = &[
        Zone::Backlight,
        Zone::Logo,
        Zone::ScrollWheel,
        Zone::Battery,
        Zone::LeftSide,
        Zone::RightSide,
    ];
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Backlight => f.write_str("backlight"),
            Zone::Logo => f.write_str("logo"),
            Zone::ScrollWheel => f.write_str("scroll_wheel"),
            Zone::Battery => f.write_str("battery"),
            Zone::LeftSide => f.write_str("left_side"),
            Zone::RightSide => f.write_str("right_side"),
            Zone::Channel(n) => write!(f, "channel{n}"),
        }
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let zone = match s {
            "backlight" => Zone::Backlight,
            "logo" => Zone::Logo,
            "scroll_wheel" | "scroll" => Zone::ScrollWheel,
            "battery" => Zone::Battery,
            "left_side" | "left" => Zone::LeftSide,
            "right_side" | "right" => Zone::RightSide,
            other => {
                let n = other
                    .strip_prefix("channel")
                    .and_then(|n| n.parse::<u8>().ok())
                    .ok_or_else(|| Error::Config(format!("unknown zone '{other}'")))?;
                if !(1..=ARGB_CHANNELS).contains(&n) {
                    return Err(Error::OutOfRange {
                        field: "channel",
                        value: n as u32,
                        min: 1,
                        max: ARGB_CHANNELS as u32,
                    });
                }
                Zone::Channel(n)
            }
        };
        Ok(zone)
    }
}

/// Abstract device operation, independent of how a model encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    GetFirmwareVersion,
    GetSerial,
    GetDeviceMode,
    SetDeviceMode,
    GetPollingRate,
    SetPollingRate,
    GetDpi,
    SetDpi,
    GetDpiStages,
    SetDpiStages,
    /// Legacy models: polling rate and DPI written in one report.
    SetCombinedPollDpi,
    /// Legacy models: every LED on/off state written as one bitmask.
    SetLedBitmask,
    GetLedState(Zone),
    SetLedState(Zone),
    GetBrightness(Zone),
    SetBrightness(Zone),
    GetLedRgb(Zone),
    SetLedRgb(Zone),
    SetEffect(Zone),
    /// Switch a zone to play uploaded custom frames. Framed like the zone's
    /// frame upload, so it has its own overrides.
    SetCustomEffect(Zone),
    SetCustomFrame(Zone),
    GetBatteryLevel,
    GetChargingStatus,
    GetLowBatteryThreshold,
    SetLowBatteryThreshold,
    GetIdleTime,
    SetIdleTime,
    /// Wireless dock: what the charging mouse shows.
    SetChargeEffect,
    /// Wireless dock: static colour shown while charging.
    SetChargeColor,
}

impl Operation {
    /// Zone the operation addresses, if it is a lighting operation.
    pub fn zone(&self) -> Option<Zone> {
        match *self {
            Operation::GetLedState(z)
            | Operation::SetLedState(z)
            | Operation::GetBrightness(z)
            | Operation::SetBrightness(z)
            | Operation::GetLedRgb(z)
            | Operation::SetLedRgb(z)
            | Operation::SetEffect(z)
            | Operation::SetCustomEffect(z)
            | Operation::SetCustomFrame(z) => Some(z),
            _ => None,
        }
    }

    fn base_name(&self) -> &'static str {
        match self {
            Operation::GetFirmwareVersion => "get_firmware_version",
            Operation::GetSerial => "get_serial",
            Operation::GetDeviceMode => "get_device_mode",
            Operation::SetDeviceMode => "set_device_mode",
            Operation::GetPollingRate => "get_polling_rate",
            Operation::SetPollingRate => "set_polling_rate",
            Operation::GetDpi => "get_dpi",
            Operation::SetDpi => "set_dpi",
            Operation::GetDpiStages => "get_dpi_stages",
            Operation::SetDpiStages => "set_dpi_stages",
            Operation::SetCombinedPollDpi => "set_combined_poll_dpi",
            Operation::SetLedBitmask => "set_led_bitmask",
            Operation::GetLedState(_) => "get_led_state",
            Operation::SetLedState(_) => "set_led_state",
            Operation::GetBrightness(_) => "get_brightness",
            Operation::SetBrightness(_) => "set_brightness",
            Operation::GetLedRgb(_) => "get_led_rgb",
            Operation::SetLedRgb(_) => "set_led_rgb",
            Operation::SetEffect(_) => "set_effect",
            Operation::SetCustomEffect(_) => "set_custom_effect",
            Operation::SetCustomFrame(_) => "set_custom_frame",
            Operation::GetBatteryLevel => "get_battery_level",
            Operation::GetChargingStatus => "get_charging_status",
            Operation::GetLowBatteryThreshold => "get_low_battery_threshold",
            Operation::SetLowBatteryThreshold => "set_low_battery_threshold",
            Operation::GetIdleTime => "get_idle_time",
            Operation::SetIdleTime => "set_idle_time",
            Operation::SetChargeEffect => "set_charge_effect",
            Operation::SetChargeColor => "set_charge_color",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.zone() {
            Some(zone) => write!(f, "{}@{}", self.base_name(), zone),
            None => f.write_str(self.base_name()),
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, zone) = match s.split_once('@') {
            Some((name, zone)) => (name, Some(zone.parse::<Zone>()?)),
            None => (s, None),
        };
        let zoned = |make: fn(Zone) -> Operation| {
            zone.map(make)
                .ok_or_else(|| Error::Config(format!("operation '{name}' needs a zone")))
        };
        let op = match name {
            "get_firmware_version" => Operation::GetFirmwareVersion,
            "get_serial" => Operation::GetSerial,
            "get_device_mode" => Operation::GetDeviceMode,
            "set_device_mode" => Operation::SetDeviceMode,
            "get_polling_rate" => Operation::GetPollingRate,
            "set_polling_rate" => Operation::SetPollingRate,
            "get_dpi" => Operation::GetDpi,
            "set_dpi" => Operation::SetDpi,
            "get_dpi_stages" => Operation::GetDpiStages,
            "set_dpi_stages" => Operation::SetDpiStages,
            "set_combined_poll_dpi" => Operation::SetCombinedPollDpi,
            "set_led_bitmask" => Operation::SetLedBitmask,
            "get_led_state" => zoned(Operation::GetLedState)?,
            "set_led_state" => zoned(Operation::SetLedState)?,
            "get_brightness" => zoned(Operation::GetBrightness)?,
            "set_brightness" => zoned(Operation::SetBrightness)?,
            "get_led_rgb" => zoned(Operation::GetLedRgb)?,
            "set_led_rgb" => zoned(Operation::SetLedRgb)?,
            "set_effect" => zoned(Operation::SetEffect)?,
            "set_custom_effect" => zoned(Operation::SetCustomEffect)?,
            "set_custom_frame" => zoned(Operation::SetCustomFrame)?,
            "get_battery_level" => Operation::GetBatteryLevel,
            "get_charging_status" => Operation::GetChargingStatus,
            "get_low_battery_threshold" => Operation::GetLowBatteryThreshold,
            "set_low_battery_threshold" => Operation::SetLowBatteryThreshold,
            "get_idle_time" => Operation::GetIdleTime,
            "set_idle_time" => Operation::SetIdleTime,
            "set_charge_effect" => Operation::SetChargeEffect,
            "set_charge_color" => Operation::SetChargeColor,
            other => return Err(Error::Config(format!("unknown operation '{other}'"))),
        };
        if op.zone().is_none() && zone.is_some() {
            return Err(Error::Config(format!("operation '{name}' takes no zone")));
        }
        Ok(op)
    }
}

/// Command family used for lighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Per-LED state, effect and colour commands (class 0x03).
    #[default]
    Classic,
    /// Whole-device matrix effects (class 0x03, id 0x0A).
    StandardMatrix,
    /// Per-LED matrix effects (class 0x0F).
    ExtendedMatrix,
    /// ARGB controller channels, extended framing.
    ChannelArgb,
    /// Wireless dock commands. Only meaningful as a per-operation override
    /// for brightness.
    Dock,
}

/// Whether a setting persists in device flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    NoStore,
    #[default]
    VarStore,
}

impl Storage {
    pub fn as_byte(self) -> u8 {
        match self {
            Storage::NoStore => 0x00,
            Storage::VarStore => 0x01,
        }
    }
}

/// DPI report layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpiFormat {
    /// 16-bit big-endian X and Y.
    #[default]
    Word,
    /// One byte per axis, in units of [`DPI_BYTE_UNIT`].
    Byte,
}

/// DPI represented by one step of a byte-format DPI value.
pub const DPI_BYTE_UNIT: u16 = 100;

/// Response wait window for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub min_us: u64,
    pub max_us: u64,
}

impl Timing {
    /// Wired mice answer within a millisecond.
    pub const WIRED: Timing = Timing {
        min_us: 600,
        max_us: 800,
    };

    pub fn min_wait(&self) -> Duration {
        Duration::from_micros(self.min_us)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_micros(self.max_us.max(self.min_us))
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::WIRED
    }
}

/// Everything the encoder needs to build reports for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingDescriptor {
    pub model: ModelId,
    pub operation: Operation,
    pub dialect: Dialect,
    pub led: Option<LedId>,
    pub storage: Storage,
    pub transaction_id: TransactionId,
    pub dpi_format: DpiFormat,
    pub max_dpi: u16,
    /// Addressable columns per custom-frame row.
    pub row_length: u8,
}

/// Per-operation override of the model defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationEntry {
    pub dialect: Option<Dialect>,
    pub led: Option<LedId>,
    pub storage: Option<Storage>,
    pub transaction_id: Option<TransactionId>,
    pub dpi_format: Option<DpiFormat>,
}

/// Capabilities of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub id: ModelId,
    pub name: String,
    pub dialect: Dialect,
    pub storage: Storage,
    pub transaction_id: TransactionId,
    pub timing: Timing,
    pub report_index: u8,
    pub response_index: u8,
    pub max_dpi: u16,
    pub row_length: u8,
    /// Settings are write-only; reads come from a host-side copy.
    pub shadowed: bool,
    pub wireless: bool,
    /// Tilt bits in the button mask drive horizontal wheel events.
    pub tilt_wheel: bool,
    /// Extra keys arrive on a 16-byte auxiliary report.
    pub aux_keys: bool,
    pub operations: BTreeMap<Operation, OperationEntry>,
}

impl ModelEntry {
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains_key(&operation)
    }

    /// Zones that have at least one lighting operation.
    pub fn zones(&self) -> Vec<Zone> {
        let mut zones: Vec<Zone> = self.operations.keys().filter_map(|op| op.zone()).collect();
        zones.sort();
        zones.dedup();
        zones
    }
}

/// Immutable map from model to capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    models: BTreeMap<ModelId, ModelEntry>,
}

static BUILTIN: OnceLock<std::result::Result<Arc<CapabilityTable>, String>> = OnceLock::new();

impl CapabilityTable {
    /// Table embedded in the library.
    pub fn builtin() -> Result<Arc<CapabilityTable>> {
        BUILTIN
            .get_or_init(|| {
                CapabilityTable::from_json(BUILTIN_DEVICES)
                    .map(Arc::new)
                    .map_err(|e| e.to_string())
            })
            .clone()
            .map_err(Error::Config)
    }

    /// Parse a device database.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawTable =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("device database: {e}")))?;
        let mut models = BTreeMap::new();
        for raw_model in raw.models {
            let entry = raw_model.into_entry()?;
            if models.insert(entry.id, entry).is_some() {
                return Err(Error::Config("duplicate model in device database".into()));
            }
        }
        debug!(models = models.len(), "Loaded capability table");
        Ok(Self { models })
    }

    /// Read a device database from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn entry(&self, model: ModelId) -> Option<&ModelEntry> {
        self.models.get(&model)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelEntry> {
        self.models.values()
    }

    /// Resolve the encoding of `operation` on `model`.
    ///
    /// Pure: the same table, model and operation always give the same
    /// descriptor. Unknown models and operations missing from the model's
    /// entry fail with [`Error::Unsupported`].
    pub fn resolve(&self, model: ModelId, operation: Operation) -> Result<EncodingDescriptor> {
        let unsupported = || Error::Unsupported { model, operation };
        let entry = self.models.get(&model).ok_or_else(unsupported)?;
        let op = entry.operations.get(&operation).ok_or_else(unsupported)?;

        Ok(EncodingDescriptor {
            model,
            operation,
            dialect: op.dialect.unwrap_or(entry.dialect),
            led: op.led.or_else(|| operation.zone().map(Zone::default_led)),
            storage: op.storage.unwrap_or(entry.storage),
            transaction_id: op.transaction_id.unwrap_or(entry.transaction_id),
            dpi_format: op.dpi_format.unwrap_or_default(),
            max_dpi: entry.max_dpi,
            row_length: entry.row_length,
        })
    }
}

/// Resolve against the built-in table.
pub fn resolve(model: ModelId, operation: Operation) -> Result<EncodingDescriptor> {
    CapabilityTable::builtin()?.resolve(model, operation)
}

// On-disk representation. Ids are hex strings so the file stays readable.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    models: Vec<RawModel>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModel {
    pid: String,
    name: String,
    #[serde(default)]
    dialect: Dialect,
    #[serde(default)]
    storage: Storage,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    timing: Timing,
    #[serde(default)]
    report_index: u8,
    #[serde(default)]
    response_index: Option<u8>,
    #[serde(default = "default_max_dpi")]
    max_dpi: u16,
    #[serde(default)]
    row_length: u8,
    #[serde(default)]
    shadowed: bool,
    #[serde(default)]
    wireless: bool,
    #[serde(default)]
    tilt_wheel: bool,
    #[serde(default)]
    aux_keys: bool,
    operations: BTreeMap<String, RawOperation>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawOperation {
    dialect: Option<Dialect>,
    led: Option<String>,
    storage: Option<Storage>,
    transaction_id: Option<String>,
    dpi_format: Option<DpiFormat>,
}

fn default_max_dpi() -> u16 {
    16000
}

fn parse_hex_u16(field: &str, s: &str) -> Result<u16> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|_| Error::Config(format!("{field}: bad hex '{s}'")))
}

fn parse_hex_u8(field: &str, s: &str) -> Result<u8> {
    let value = parse_hex_u16(field, s)?;
    u8::try_from(value).map_err(|_| Error::Config(format!("{field}: '{s}' exceeds one byte")))
}

impl RawModel {
    fn into_entry(self) -> Result<ModelEntry> {
        let id = ModelId(parse_hex_u16("pid", &self.pid)?);
        let transaction_id = match &self.transaction_id {
            Some(s) => TransactionId(parse_hex_u8("transaction_id", s)?),
            None => TransactionId::LEGACY,
        };

        let mut operations = BTreeMap::new();
        for (key, raw) in self.operations {
            let operation: Operation = key.parse()?;
            let entry = OperationEntry {
                dialect: raw.dialect,
                led: raw.led.as_deref().map(|s| parse_hex_u8("led", s)).transpose()?.map(LedId),
                storage: raw.storage,
                transaction_id: raw
                    .transaction_id
                    .as_deref()
                    .map(|s| parse_hex_u8("transaction_id", s))
                    .transpose()?
                    .map(TransactionId),
                dpi_format: raw.dpi_format,
            };
            operations.insert(operation, entry);
        }

        Ok(ModelEntry {
            id,
            name: self.name,
            dialect: self.dialect,
            storage: self.storage,
            transaction_id,
            timing: self.timing,
            report_index: self.report_index,
            response_index: self.response_index.unwrap_or(self.report_index),
            max_dpi: self.max_dpi,
            row_length: self.row_length,
            shadowed: self.shadowed,
            wireless: self.wireless,
            tilt_wheel: self.tilt_wheel,
            aux_keys: self.aux_keys,
            operations,
        })
    }
}
