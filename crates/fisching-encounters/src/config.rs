//! Scheduler configuration.
//!
//! Loaded from TOML. Missing keys take their defaults, so an empty file is a
//! valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use fisching_common::{EncounterError, EncounterResult};

/// Configuration file name.
pub const CONFIG_FILE: &str = "fisching.toml";

/// Shortest loop period accepted.
const MIN_TICK_INTERVAL_MS: u64 = 10;

/// Runtime knobs shared by both schedulers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Allow forced triggers from the dev-tool surface
    pub dev_tools_enabled: bool,
    /// Loop period in milliseconds
    pub tick_interval_ms: u64,
    /// How long `stop` waits for the loop to exit, in milliseconds
    pub stop_timeout_ms: u64,
    /// Buffer notifications instead of printing them
    pub suppress_notifications: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dev_tools_enabled: false,
            tick_interval_ms: 1000,
            stop_timeout_ms: 1000,
            suppress_notifications: false,
        }
    }
}

impl SchedulerConfig {
    /// Loop period, never shorter than 10ms.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }

    /// Bounded wait used by `stop`.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Parses a config strictly.
    pub fn from_toml_str(text: &str) -> EncounterResult<Self> {
        toml::from_str(text).map_err(|e| EncounterError::Config(e.to_string()))
    }

    /// Reads scheduler settings from `path`.
    ///
    /// The schedulers must start even without a usable file: a missing file
    /// is logged at info, an unreadable or malformed one at warn, and both
    /// fall back to [`SchedulerConfig::default`].
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No scheduler config at {}, using defaults", path.display());
                return Self::default();
            },
            Err(e) => {
                warn!("Cannot read scheduler config {}: {e}", path.display());
                return Self::default();
            },
        };

        Self::from_toml_str(&text).map_or_else(
            |e| {
                warn!("Ignoring scheduler config {}: {e}", path.display());
                Self::default()
            },
            |config| {
                info!(
                    "Scheduler config from {}: tick {}ms, dev tools {}",
                    path.display(),
                    config.tick_interval().as_millis(),
                    if config.dev_tools_enabled { "on" } else { "off" }
                );
                config
            },
        )
    }

    /// Writes these settings as TOML, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> EncounterResult<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(|e| EncounterError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        info!("Wrote scheduler config to {}", path.display());
        Ok(())
    }
}
