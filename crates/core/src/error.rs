//! Error types for open-razer-core.

use crate::capability::{ModelId, Operation};
use crate::report::{Echo, Report};
use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID enumeration or device open failure.
    #[error("HID error: {0}")]
    Hid(String),

    /// Device not found during enumeration.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Payload length does not fit the report or the operation.
    ///
    /// `expected` is the exact length required, or the upper bound when the
    /// payload is bounded rather than fixed.
    #[error("invalid payload size: {actual} bytes (expected {expected})")]
    InvalidPayloadSize { actual: usize, expected: usize },

    /// Active DPI stage index is outside `1..=stage_count`.
    #[error("invalid active stage {active} for {count} stage(s)")]
    InvalidActiveStage { active: u8, count: usize },

    /// The model has no capability entry for this operation.
    #[error("{operation} is not supported by model {model}")]
    Unsupported { model: ModelId, operation: Operation },

    /// The underlying bus exchange failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Raw response bytes do not form a report.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The response echo fields answer a different request.
    #[error("response mismatch: sent {request}, got {response}")]
    ResponseMismatch { request: Echo, response: Echo },

    /// Device reported busy while a strict result was required.
    #[error("device busy ({})", .0.describe())]
    DeviceBusy(Box<Report>),

    /// Device reported the command failed.
    #[error("device reported failure ({})", .0.describe())]
    DeviceFailure(Box<Report>),

    /// Device reported the command is not supported.
    #[error("device reported command not supported ({})", .0.describe())]
    DeviceNotSupported(Box<Report>),

    /// Device reported the command timed out.
    #[error("device reported timeout ({})", .0.describe())]
    DeviceTimeout(Box<Report>),

    /// Value out of safe range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Configuration or device database could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// Attribute name unknown, access mode not allowed, or value unparsable.
    #[error("attribute error: {0}")]
    Attribute(String),
}

impl Error {
    /// Whether the error was raised before any device I/O took place.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPayloadSize { .. }
                | Error::InvalidActiveStage { .. }
                | Error::Unsupported { .. }
                | Error::OutOfRange { .. }
                | Error::Attribute(_)
        )
    }

    /// The raw response attached to a device-status error, if any.
    pub fn report(&self) -> Option<&Report> {
        match self {
            Error::DeviceBusy(r)
            | Error::DeviceFailure(r)
            | Error::DeviceNotSupported(r)
            | Error::DeviceTimeout(r) => Some(r),
            _ => None,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
