//! Input remapping: raw input reports in, synthesized events out.
//!
//! Two report shapes are recognized:
//!
//! - Button reports: byte 0 is a button bitmask. Bits 0-4 are plain buttons.
//!   Bits 5 and 6 are wheel tilt left/right. With tilt-as-wheel enabled a
//!   rising tilt edge emits one horizontal wheel step immediately and, if a
//!   repeat interval is configured, keeps emitting it until the falling edge.
//!   Bit 7 is ignored.
//! - Auxiliary key reports: exactly 16 bytes starting with `0x04`. Bytes
//!   1..16 hold the codes of every key currently down. Successive reports are
//!   diffed as key sets, so several keys can be held at once.
//!
//! Edge state lives behind its own short-held lock and never touches the
//! transaction lock. The repeat timer is a tokio task; arming it aborts the
//! previous one, and every emission re-checks a generation counter under the
//! edge lock, so a disarmed or detached timer cannot emit.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Size of an auxiliary key report.
pub const AUX_REPORT_LEN: usize = 16;
/// First byte of an auxiliary key report.
pub const AUX_REPORT_SENTINEL: u8 = 0x04;

const TILT_LEFT_BIT: u8 = 5;
const TILT_RIGHT_BIT: u8 = 6;

/// Physical button bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Right,
    Middle,
    Side,
    Extra,
    TiltLeft,
    TiltRight,
}

impl Button {
    fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::Middle),
            3 => Some(Self::Side),
            4 => Some(Self::Extra),
            TILT_LEFT_BIT => Some(Self::TiltLeft),
            TILT_RIGHT_BIT => Some(Self::TiltRight),
            _ => None,
        }
    }

    /// Horizontal wheel value for tilt buttons.
    fn tilt_value(self) -> Option<i32> {
        match self {
            Self::TiltLeft => Some(-1),
            Self::TiltRight => Some(1),
            _ => None,
        }
    }
}

/// Keys carried by auxiliary reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    F13,
    F14,
    F15,
    F16,
    F17,
    /// Any other code, passed through.
    Raw(u8),
}

/// Code of the FN modifier; it never produces an event.
const AUX_FN: u8 = 0x01;

impl Key {
    fn from_aux(code: u8) -> Option<Self> {
        match code {
            0x00 | AUX_FN => None,
            0x20 => Some(Self::F13),
            0x21 => Some(Self::F14),
            0x22 => Some(Self::F15),
            0x23 => Some(Self::F16),
            0x24 => Some(Self::F17),
            other => Some(Self::Raw(other)),
        }
    }
}

/// A synthesized input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Button { button: Button, pressed: bool },
    Key { key: Key, pressed: bool },
    /// Horizontal wheel step, negative is left.
    HWheel(i32),
}

/// Receiver of synthesized events.
///
/// Called with the edge lock held; implementations must not feed reports
/// back into the remapper.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: InputEvent);
}

impl<F> EventSink for F
where
    F: Fn(InputEvent) + Send + Sync,
{
    fn emit(&self, event: InputEvent) {
        self(event)
    }
}

/// Remapper settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapConfig {
    /// Tilt bits produce wheel events instead of button events.
    pub tilt_as_wheel: bool,
    /// Zero disables repeat.
    pub repeat_interval: Duration,
    /// Time from the initial wheel step to the first repeat. Zero means one
    /// `repeat_interval`.
    pub repeat_delay: Duration,
    /// Recognize auxiliary key reports.
    pub aux_keys: bool,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            tilt_as_wheel: true,
            repeat_interval: Duration::ZERO,
            repeat_delay: Duration::ZERO,
            aux_keys: false,
        }
    }
}

struct Repeat {
    value: i32,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct EdgeState {
    buttons: u8,
    keys: Vec<u8>,
    repeat: Option<Repeat>,
    generation: u64,
}

impl EdgeState {
    /// Stop any repeat. Bumping the generation stops a task that already
    /// woke up but has not taken the lock yet.
    fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(repeat) = self.repeat.take() {
            repeat.task.abort();
            debug!(value = repeat.value, "Tilt repeat disarmed");
        }
    }
}

struct Shared {
    sink: Arc<dyn EventSink>,
    config: RemapConfig,
    state: Mutex<EdgeState>,
}

/// Per-session input state machine.
pub struct InputRemapper {
    shared: Arc<Shared>,
    runtime: Option<Handle>,
}

impl InputRemapper {
    /// Create a remapper. Repeat timers run on the current tokio runtime, if
    /// there is one.
    pub fn new(sink: Arc<dyn EventSink>, config: RemapConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                config,
                state: Mutex::new(EdgeState::default()),
            }),
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run repeat timers on `runtime`.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn config(&self) -> RemapConfig {
        self.shared.config
    }

    /// Whether a tilt repeat is currently armed.
    pub fn is_repeating(&self) -> bool {
        self.shared.state.lock().repeat.is_some()
    }

    /// Process one raw input report. Returns `true` if it was recognized.
    pub fn handle_report(&self, data: &[u8]) -> bool {
        if data.len() == AUX_REPORT_LEN && data[0] == AUX_REPORT_SENTINEL {
            if !self.shared.config.aux_keys {
                return false;
            }
            self.handle_keys(&data[1..]);
            return true;
        }
        match data.first() {
            Some(&mask) => {
                self.handle_buttons(mask);
                true
            }
            None => false,
        }
    }

    fn handle_buttons(&self, mask: u8) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let changed = state.buttons ^ mask;
        state.buttons = mask;

        for bit in 0..8u8 {
            if changed & (1 << bit) == 0 {
                continue;
            }
            let Some(button) = Button::from_bit(bit) else {
                continue;
            };
            let pressed = mask & (1 << bit) != 0;

            match button.tilt_value() {
                Some(value) if shared.config.tilt_as_wheel => {
                    if pressed {
                        shared.sink.emit(InputEvent::HWheel(value));
                        self.arm(&mut state, value);
                    } else if state.repeat.as_ref().is_some_and(|r| r.value == value) {
                        state.disarm();
                    }
                }
                _ => shared.sink.emit(InputEvent::Button { button, pressed }),
            }
        }
    }

    fn handle_keys(&self, codes: &[u8]) {
        let mut state = self.shared.state.lock();
        let mut current: Vec<u8> = Vec::with_capacity(codes.len());
        for &code in codes {
            if code != 0 && !current.contains(&code) {
                current.push(code);
            }
        }

        for &code in state.keys.iter().filter(|c| !current.contains(*c)) {
            if let Some(key) = Key::from_aux(code) {
                self.shared.sink.emit(InputEvent::Key { key, pressed: false });
            }
        }
        for &code in current.iter().filter(|c| !state.keys.contains(*c)) {
            if let Some(key) = Key::from_aux(code) {
                self.shared.sink.emit(InputEvent::Key { key, pressed: true });
            }
        }
        state.keys = current;
    }

    /// Arm the repeat timer for `value`, replacing any armed one.
    fn arm(&self, state: &mut EdgeState, value: i32) {
        state.disarm();
        let interval = self.shared.config.repeat_interval;
        if interval.is_zero() {
            return;
        }
        let Some(runtime) = &self.runtime else {
            warn!("No async runtime, tilt repeat disabled");
            return;
        };

        let generation = state.generation;
        let delay = match self.shared.config.repeat_delay {
            d if d.is_zero() => interval,
            d => d,
        };
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let state = shared.state.lock();
                if state.generation != generation {
                    break;
                }
                shared.sink.emit(InputEvent::HWheel(value));
            }
        });
        debug!(value, ?interval, ?delay, "Tilt repeat armed");
        state.repeat = Some(Repeat { value, task });
    }

    /// Cancel any armed timer. Further reports are still processed.
    pub fn shutdown(&self) {
        self.shared.state.lock().disarm();
    }
}

impl Drop for InputRemapper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for InputRemapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputRemapper")
            .field("config", &self.shared.config)
            .field("repeating", &self.is_repeating())
            .finish()
    }
}
