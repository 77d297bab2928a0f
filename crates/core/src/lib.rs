//! open-razer-core: Razer report protocol, device capabilities, and input
//! remapping.
//!
//! Every command travels as a fixed 90-byte feature report. The capability
//! table decides, per model, which operations exist and how each is framed;
//! [`session::DeviceSession`] ties a model to a [`transaction::Transport`]
//! and serializes transactions on it.

pub mod capability;
pub mod config;
pub mod device;
pub mod dpi;
pub mod dpi_stages;
pub mod encode;
pub mod error;
pub mod info;
pub mod lighting;
pub mod power;
pub mod remap;
pub mod report;
pub mod report_rate;
pub mod retry;
pub mod safety;
pub mod session;
pub mod surface;
pub mod transaction;

pub use capability::{CapabilityTable, ModelId, Operation, Zone};
pub use error::{Error, Result};
pub use session::DeviceSession;
pub use transaction::Transport;

/// Razer USB Vendor ID.
pub const RAZER_VID: u16 = 0x1532;

/// Product IDs of the models in the built-in device database.
pub mod pids {
    pub const OROCHI_2011: u16 = 0x0013;
    pub const MAMBA_2012_WIRED: u16 = 0x0024;
    pub const MAMBA_2012_WIRELESS: u16 = 0x0025;
    pub const IMPERATOR: u16 = 0x002F;
    pub const DEATHADDER_CHROMA: u16 = 0x0043;
    pub const MAMBA_WIRED: u16 = 0x0044;
    pub const MAMBA_WIRELESS: u16 = 0x0045;
    pub const MAMBA_TE: u16 = 0x0046;
    pub const OROCHI_CHROMA: u16 = 0x0048;
    pub const DIAMONDBACK_CHROMA: u16 = 0x004C;
    pub const NAGA_HEX_V2: u16 = 0x0050;
    pub const LANCEHEAD_WIRED: u16 = 0x0059;
    pub const LANCEHEAD_WIRELESS: u16 = 0x005A;
    pub const DEATHADDER_ELITE: u16 = 0x005C;
    pub const LANCEHEAD_TE: u16 = 0x0060;
    /// Side keypad arrives as auxiliary key reports.
    pub const NAGA_TRINITY: u16 = 0x0067;
    pub const VIPER_ULTIMATE_WIRED: u16 = 0x007A;
    pub const VIPER_ULTIMATE_WIRELESS: u16 = 0x007B;
    pub const DEATHADDER_V2: u16 = 0x0084;
    /// Tilt wheel.
    pub const BASILISK_V2: u16 = 0x0085;
    pub const BASILISK_V3: u16 = 0x0099;
    pub const BASILISK_V3_PRO_WIRELESS: u16 = 0x00AB;
    /// Addressable RGB controller, six channels.
    pub const CHROMA_ARGB: u16 = 0x0F1F;
}
