//! One live device: model, transport, transaction lock and legacy shadow.

use crate::capability::{CapabilityTable, EncodingDescriptor, ModelEntry, ModelId, Operation, Timing};
use crate::device::PollingRate;
use crate::dpi_stages::TruncationPolicy;
use crate::encode::{encode, Command};
use crate::error::{Error, Result};
use crate::remap::InputRemapper;
use crate::report::Report;
use crate::transaction::{execute, require_complete, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// LED bits of the legacy bitmask report.
pub mod led_bits {
    pub const SCROLL_WHEEL: u8 = 0x01;
    pub const LOGO: u8 = 0x02;
}

/// Host-side copy of settings a legacy model cannot report back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowState {
    pub dpi: (u16, u16),
    pub polling_rate: PollingRate,
    pub led_bitmask: u8,
}

impl Default for ShadowState {
    fn default() -> Self {
        Self {
            dpi: (800, 800),
            polling_rate: PollingRate::Hz500,
            led_bitmask: led_bits::SCROLL_WHEEL | led_bits::LOGO,
        }
    }
}

/// An attached device.
///
/// Every exchange goes through the transaction lock, so a session can be
/// shared between threads. Input handling has its own state and never takes
/// the transaction lock.
pub struct DeviceSession {
    entry: ModelEntry,
    table: Arc<CapabilityTable>,
    transport: Arc<dyn Transport>,
    policy: TruncationPolicy,
    transaction_lock: Mutex<()>,
    shadow: Option<Mutex<ShadowState>>,
    input: Option<InputRemapper>,
}

impl DeviceSession {
    /// Attach to `model` over `transport`.
    pub fn attach(
        table: Arc<CapabilityTable>,
        model: ModelId,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let entry = table
            .entry(model)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(format!("no capability entry for {model}")))?;
        info!(model = %model, name = %entry.name, shadowed = entry.shadowed, "Device attached");

        let shadow = entry.shadowed.then(|| Mutex::new(ShadowState::default()));
        Ok(Self {
            entry,
            table,
            transport,
            policy: TruncationPolicy::default(),
            transaction_lock: Mutex::new(()),
            shadow,
            input: None,
        })
    }

    pub fn with_policy(mut self, policy: TruncationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Route raw input reports through `remapper`.
    pub fn with_input(mut self, remapper: InputRemapper) -> Self {
        self.input = Some(remapper);
        self
    }

    pub fn model(&self) -> ModelId {
        self.entry.id
    }

    pub fn entry(&self) -> &ModelEntry {
        &self.entry
    }

    pub fn timing(&self) -> Timing {
        self.entry.timing
    }

    pub fn policy(&self) -> TruncationPolicy {
        self.policy
    }

    pub fn report_index(&self) -> u8 {
        self.entry.report_index
    }

    pub fn response_index(&self) -> u8 {
        self.entry.response_index
    }

    pub fn is_shadowed(&self) -> bool {
        self.shadow.is_some()
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn transaction_lock(&self) -> &Mutex<()> {
        &self.transaction_lock
    }

    /// Resolve an operation for this session's model.
    pub fn resolve(&self, operation: Operation) -> Result<EncodingDescriptor> {
        self.table.resolve(self.entry.id, operation)
    }

    /// Resolve, encode and execute `command`, one transaction per report.
    ///
    /// Stops at the first failing report. Returns every response.
    pub fn run(&self, command: &Command) -> Result<Vec<Report>> {
        let descriptor = self.resolve(command.operation())?;
        let requests = encode(&descriptor, command)?;
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(execute(self, request)?);
        }
        Ok(responses)
    }

    /// Run a write. `Busy` responses count as accepted.
    pub fn write(&self, command: &Command) -> Result<()> {
        self.run(command).map(|_| ())
    }

    /// Run a read and return the fully processed final response.
    pub fn read(&self, command: &Command) -> Result<Report> {
        let mut responses = self.run(command)?;
        let last = responses.pop().ok_or_else(|| {
            Error::MalformedResponse(format!("{} produced no report", command.operation()))
        })?;
        require_complete(last)
    }

    /// Current shadow state, for legacy models.
    pub fn shadow(&self) -> Option<ShadowState> {
        self.shadow.as_ref().map(|s| *s.lock())
    }

    /// Write a shadowed setting.
    ///
    /// `apply` edits a copy of the shadow and returns the command that puts
    /// the device into that state. The shadow lock is held from the snapshot
    /// until the copy is committed, so concurrent shadowed writes never
    /// build their report from a stale shadow. The copy is committed only if
    /// the device accepted the command.
    pub(crate) fn write_shadowed(
        &self,
        operation: Operation,
        apply: impl FnOnce(&mut ShadowState) -> Command,
    ) -> Result<()> {
        let shadow = self.shadow.as_ref().ok_or(Error::Unsupported {
            model: self.entry.id,
            operation,
        })?;
        let mut state = shadow.lock();
        let mut next = *state;
        let command = apply(&mut next);
        self.write(&command)?;
        *state = next;
        debug!(shadow = ?next, "Shadow updated");
        Ok(())
    }

    /// Feed one raw input report to the remapper.
    ///
    /// Returns `true` if the report was consumed.
    pub fn handle_input(&self, data: &[u8]) -> bool {
        self.input.as_ref().is_some_and(|r| r.handle_report(data))
    }

    /// Tear the session down. Any armed repeat timer is cancelled before the
    /// session state is dropped.
    pub fn detach(mut self) {
        if let Some(remapper) = self.input.take() {
            remapper.shutdown();
        }
        info!(model = %self.entry.id, "Device detached");
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("model", &self.entry.id)
            .field("name", &self.entry.name)
            .field("policy", &self.policy)
            .field("shadow", &self.shadow())
            .finish()
    }
}
