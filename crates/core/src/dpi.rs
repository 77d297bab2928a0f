//! DPI and DPI stage read/write.
//!
//! Class 0x04 commands:
//!   - 0x05 / 0x85: DPI, X and Y as big-endian words after the storage byte
//!   - 0x01 / 0x81: DPI, one byte per axis (older models)
//!   - 0x06 / 0x86: DPI stage list, see [`crate::dpi_stages`]
//!
//! Legacy shadowed models write DPI together with the polling rate and never
//! read it back; their reads come from the session shadow.

use crate::capability::{DpiFormat, Operation};
use crate::dpi_stages::{decode_stages, DpiStage};
use crate::encode::{dpi_from_byte, Command};
use crate::error::Result;
use crate::safety;
use crate::session::DeviceSession;

/// Read the current DPI as `(x, y)`.
pub fn read_dpi(session: &DeviceSession) -> Result<(u16, u16)> {
    if let Some(shadow) = session.shadow() {
        session.resolve(Operation::GetDpi)?;
        return Ok(shadow.dpi);
    }

    let descriptor = session.resolve(Operation::GetDpi)?;
    let resp = session.read(&Command::GetDpi)?;
    let dpi = match descriptor.dpi_format {
        DpiFormat::Word => (
            u16::from_be_bytes([resp.arg(1), resp.arg(2)]),
            u16::from_be_bytes([resp.arg(3), resp.arg(4)]),
        ),
        DpiFormat::Byte => (dpi_from_byte(resp.arg(0)), dpi_from_byte(resp.arg(1))),
    };
    Ok(dpi)
}

/// Write DPI. Values are clamped to the model's range; the clamped pair is
/// returned.
pub fn write_dpi(session: &DeviceSession, x: u16, y: u16) -> Result<(u16, u16)> {
    let max = session.entry().max_dpi;
    let (x, y) = (safety::clamp_dpi(x, max), safety::clamp_dpi(y, max));

    if session.is_shadowed() {
        session.resolve(Operation::SetDpi)?;
        session.write_shadowed(Operation::SetDpi, |s| {
            s.dpi = (x, y);
            Command::SetCombinedPollDpi {
                rate: s.polling_rate,
                x,
                y,
            }
        })?;
        return Ok((x, y));
    }

    session.write(&Command::SetDpi { x, y })?;
    Ok((x, y))
}

/// Read the stage list as `(active, stages)`.
pub fn read_dpi_stages(session: &DeviceSession) -> Result<(u8, Vec<DpiStage>)> {
    let resp = session.read(&Command::GetDpiStages)?;
    // Skip the storage byte; never read past the declared size.
    let payload = resp.payload();
    decode_stages(payload.get(1..).unwrap_or_default())
}

/// Write the stage list with `active` (1-based) selected.
///
/// Lists longer than the hardware keeps follow the session's truncation
/// policy.
pub fn write_dpi_stages(session: &DeviceSession, stages: &[DpiStage], active: u8) -> Result<()> {
    session.write(&Command::SetDpiStages {
        stages: stages.to_vec(),
        active,
        policy: session.policy(),
    })
}
