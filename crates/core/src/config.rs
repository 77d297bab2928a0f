//! Engine configuration, persisted as JSON.

use crate::capability::{CapabilityTable, ModelEntry};
use crate::dpi_stages::TruncationPolicy;
use crate::error::{Error, Result};
use crate::remap::RemapConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "OPEN_RAZER_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Handling of over-long DPI stage lists and custom-frame writes.
    pub truncation: TruncationPolicy,
    /// Tilt repeat period; 0 disables repeat.
    pub tilt_repeat_interval_ms: u64,
    /// Delay before the first repeat; defaults to the interval.
    pub tilt_repeat_delay_ms: Option<u64>,
    /// Tilt bits become horizontal wheel events.
    pub tilt_as_wheel: bool,
    /// Device database replacing the built-in one.
    pub device_database: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            truncation: TruncationPolicy::Truncate,
            tilt_repeat_interval_ms: 0,
            tilt_repeat_delay_ms: None,
            tilt_as_wheel: true,
            device_database: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("config: {e}")))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// The configured device database, or the built-in one.
    pub fn capability_table(&self) -> Result<Arc<CapabilityTable>> {
        match &self.device_database {
            Some(path) => CapabilityTable::load(path).map(Arc::new),
            None => CapabilityTable::builtin(),
        }
    }

    /// Remapper settings for a model.
    pub fn remap_config(&self, entry: &ModelEntry) -> RemapConfig {
        let interval = Duration::from_millis(self.tilt_repeat_interval_ms);
        let delay = self
            .tilt_repeat_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(interval);
        RemapConfig {
            tilt_as_wheel: self.tilt_as_wheel && entry.tilt_wheel,
            repeat_interval: interval,
            repeat_delay: delay,
            aux_keys: entry.aux_keys,
        }
    }
}

/// Default config file location.
///
/// `$OPEN_RAZER_CONFIG`, else `$XDG_CONFIG_HOME/open-razer/config.json`,
/// else `$HOME/.config/open-razer/config.json`.
pub fn config_path() -> Result<PathBuf> {
    config_path_from(|key| std::env::var_os(key))
}

fn config_path_from(env: impl Fn(&str) -> Option<OsString>) -> Result<PathBuf> {
    let non_empty = |key: &str| env(key).filter(|v| !v.is_empty());
    if let Some(explicit) = non_empty(CONFIG_ENV) {
        return Ok(PathBuf::from(explicit));
    }
    let base = match non_empty("XDG_CONFIG_HOME") {
        Some(xdg) => PathBuf::from(xdg),
        None => non_empty("HOME")
            .map(|home| PathBuf::from(home).join(".config"))
            .ok_or_else(|| Error::Config("neither XDG_CONFIG_HOME nor HOME is set".into()))?,
    };
    Ok(base.join("open-razer").join("config.json"))
}
