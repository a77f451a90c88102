use crate::error::{CoreError, Result};
use crate::playlist::PlaybackPolicy;
use crate::session::SessionOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub default_policy: PlaybackPolicy,
    /// Volume while another application holds duckable focus
    #[serde(default = "default_duck_volume")]
    pub duck_volume: f32,
}

const fn default_duck_volume() -> f32 {
    0.2
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_policy: PlaybackPolicy::default(),
            duck_volume: default_duck_volume(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

const fn default_tick_interval() -> u64 {
    100
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    64
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file_enabled: bool,
}

impl PlayerConfig {
    /// Get the config file path (~/.config/catmusic/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path or create the template on first run
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// [`Self::load_or_create`] against an explicit path
    ///
    /// # Errors
    ///
    /// See [`Self::load_or_create`].
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns `ConfigParseError` for malformed TOML and `ConfigInvalid` for
    /// out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.playback.duck_volume) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "playback.duck_volume must be within 0.0..=1.0, got {}",
                    self.playback.duck_volume
                ),
            });
        }
        if self.sync.tick_interval_ms == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "sync.tick_interval_ms must be greater than 0".to_string(),
            });
        }
        if self.events.channel_capacity == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "events.channel_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.sync.tick_interval_ms)
    }

    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            policy: self.playback.default_policy,
            duck_volume: self.playback.duck_volume,
            event_capacity: self.events.channel_capacity,
        }
    }
}

const CONFIG_TEMPLATE: &str = r#"# CatMusic Configuration
# ~/.config/catmusic/config.toml

[playback]
# Traversal policy: "loop_all", "loop_one" or "shuffle"
default_policy = "loop_all"
# Volume (0.0 - 1.0) while another app briefly shares audio output
duck_volume = 0.2

[sync]
# How often the lyric highlight follows the playback position
tick_interval_ms = 100

[events]
# Buffered session events per subscriber
channel_capacity = 64

[logging]
# Also write logs to ~/.config/catmusic/catmusic.log
file_enabled = false
"#;
