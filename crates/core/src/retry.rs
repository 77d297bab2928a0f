//! Caller-side error classification and opt-in retry.
//!
//! [`crate::transaction::execute`] never retries. Callers that want to ride
//! out a busy or slow device wrap it in [`execute_with_retry`].

use crate::encode::Command;
use crate::error::{Error, Result};
use crate::report::{Report, ReportBuilder, Status};
use crate::session::DeviceSession;
use crate::transaction::execute;
use std::time::Duration;
use tracing::{debug, warn};

/// Classification of errors for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Busy device, device-side timeout or a bus timeout.
    Transient,
    /// Device is gone.
    Disconnected,
    /// The OS refused access to the device node.
    PermissionDenied,
    /// Device rejected or garbled the exchange.
    Protocol,
    /// Caller passed bad arguments; nothing was sent.
    InvalidArgument,
    /// The model has no such operation.
    Unsupported,
}

impl ErrorClass {
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::DeviceBusy(_) | Error::DeviceTimeout(_) => Self::Transient,
            Error::DeviceNotFound(_) => Self::Disconnected,
            Error::Unsupported { .. } | Error::DeviceNotSupported(_) => Self::Unsupported,
            Error::InvalidPayloadSize { .. }
            | Error::InvalidActiveStage { .. }
            | Error::OutOfRange { .. }
            | Error::Attribute(_)
            | Error::Config(_) => Self::InvalidArgument,
            Error::ResponseMismatch { .. }
            | Error::MalformedResponse(_)
            | Error::DeviceFailure(_) => Self::Protocol,
            Error::Hid(msg) | Error::Transport(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("disconnect")
                    || lower.contains("not found")
                    || lower.contains("no such device")
                {
                    Self::Disconnected
                } else if lower.contains("permission") || lower.contains("access denied") {
                    Self::PermissionDenied
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    Self::Transient
                } else {
                    Self::Protocol
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Execute `request`, retrying busy responses and transient errors.
///
/// A response still `Busy` after the last attempt is returned as is.
pub fn execute_with_retry(
    session: &DeviceSession,
    request: &ReportBuilder,
    policy: RetryPolicy,
) -> Result<Report> {
    let attempts = policy.max_retries + 1;
    for attempt in 1..=attempts {
        let last = attempt == attempts;
        match execute(session, request.clone()) {
            Ok(resp) if resp.status() == Status::Successful || last => {
                if attempt > 1 {
                    debug!(attempt, "Request settled after retry");
                }
                return Ok(resp);
            }
            Ok(resp) => {
                debug!(attempt, status = ?resp.status(), "Device busy, retrying");
            }
            Err(e) => {
                let class = ErrorClass::classify(&e);
                if !class.is_retryable() || last {
                    warn!(?class, attempt, attempts, error = %e, "Request failed");
                    return Err(e);
                }
                debug!(?class, attempt, error = %e, "Transient error, retrying");
            }
        }
        std::thread::sleep(policy.backoff);
    }
    Err(Error::Transport("retry loop exhausted".into()))
}

/// Device connection status for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    PermissionError,
    Error,
}

/// Ping the device by reading its firmware version.
pub fn check_device_status(session: &DeviceSession) -> DeviceStatus {
    match session.read(&Command::GetFirmwareVersion) {
        Ok(_) => DeviceStatus::Connected,
        Err(ref e) => match ErrorClass::classify(e) {
            ErrorClass::Disconnected => DeviceStatus::Disconnected,
            ErrorClass::PermissionDenied => DeviceStatus::PermissionError,
            _ => DeviceStatus::Error,
        },
    }
}
