//! Application settings and configuration management

use crate::audio::StreamConfig;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extra time granted to the playback thread on shutdown, on top of the
/// time needed to play out a full buffer.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Largest sample buffer accepted, in samples (64 MiB of f32).
pub const MAX_BUFFER_SAMPLES: usize = 1 << 24;

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Node server used for registration
    #[serde(default = "default_node_server")]
    pub node_server: String,
    /// Bus server address that overrides the one returned by the node server
    #[serde(default)]
    pub local: Option<String>,
    /// Name this node registers under
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// ALSA device to use for audio playback ("null" discards audio)
    #[serde(default = "default_alsa_device")]
    pub alsa_device: String,
    /// Sampling rate in samples per second
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Samples per device pull
    #[serde(default = "default_fragment")]
    pub fragment: usize,
    /// Sample buffer capacity, in fragments
    #[serde(default = "default_buffer_fragments")]
    pub buffer_fragments: usize,
    /// Open the output device at startup instead of on the first frame
    #[serde(default)]
    pub eager_open: bool,
    /// Log every device pull
    #[serde(default)]
    pub verbose: bool,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,
}

fn default_node_server() -> String {
    "127.0.0.1:9990".to_string()
}

fn default_node_name() -> String {
    "PulseAudioRx".to_string()
}

fn default_alsa_device() -> String {
    "default".to_string()
}

fn default_rate() -> u32 {
    44_100
}

fn default_fragment() -> usize {
    2048
}

fn default_buffer_fragments() -> usize {
    4
}

/// Error types for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    ParseError(String),
    ValidationError(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(s) => write!(f, "Parse error: {}", s),
            ConfigError::ValidationError(s) => write!(f, "Validation error: {}", s),
        }
    }
}

impl Error for ConfigError {}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_server: default_node_server(),
            local: None,
            node_name: default_node_name(),
            alsa_device: default_alsa_device(),
            rate: default_rate(),
            fragment: default_fragment(),
            buffer_fragments: default_buffer_fragments(),
            eager_open: false,
            verbose: false,
            log_json: false,
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("pulse-rx").join("config.json")
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_server.trim().is_empty() {
            return Err(ConfigError::ValidationError("Node server cannot be empty".to_string()));
        }
        if matches!(&self.local, Some(local) if local.trim().is_empty()) {
            return Err(ConfigError::ValidationError("Local bus server cannot be empty".to_string()));
        }
        if self.alsa_device.is_empty() {
            return Err(ConfigError::ValidationError("ALSA device cannot be empty".to_string()));
        }
        if self.rate == 0 {
            return Err(ConfigError::ValidationError("Sampling rate must be positive".to_string()));
        }
        if self.fragment == 0 {
            return Err(ConfigError::ValidationError("Fragment size must be positive".to_string()));
        }
        if self.buffer_fragments == 0 {
            return Err(ConfigError::ValidationError(
                "Buffer must hold at least one fragment".to_string(),
            ));
        }
        match self.fragment.checked_mul(self.buffer_fragments) {
            Some(samples) if samples <= MAX_BUFFER_SAMPLES => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Buffer of {} x {} samples exceeds the limit of {} samples",
                    self.buffer_fragments, self.fragment, MAX_BUFFER_SAMPLES
                )));
            }
        }
        Ok(())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig { rate: self.rate, fragment: self.fragment }
    }

    /// Sample buffer capacity in samples.
    pub fn buffer_capacity(&self) -> usize {
        self.fragment.saturating_mul(self.buffer_fragments)
    }

    /// Upper bound on how long shutdown waits for buffered audio to play.
    pub fn drain_timeout(&self) -> Duration {
        let fragments = u32::try_from(self.buffer_fragments).unwrap_or(u32::MAX);
        self.stream_config()
            .fragment_duration()
            .saturating_mul(fragments)
            .saturating_add(DRAIN_GRACE)
    }
}
