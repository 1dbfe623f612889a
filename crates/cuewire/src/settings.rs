//! TOML settings for cuewire tools
//!
//! Settings live in `cuewire.toml`. Every section is optional; a missing
//! section or key falls back to the defaults below.

use cuewire_osc::{QueuePolicy, ReceiverConfig, SenderConfig, ValueKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Filename used for settings
pub const SETTINGS_FILENAME: &str = "cuewire.toml";

/// Inbound side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveSettings {
    /// UDP port to listen on
    pub port: u16,
    /// Maximum queued messages, 0 for unbounded
    pub queue_capacity: usize,
}

impl Default for ReceiveSettings {
    fn default() -> Self {
        Self {
            port: 20001,
            queue_capacity: 0,
        }
    }
}

impl ReceiveSettings {
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            queue_policy: QueuePolicy::from_capacity(self.queue_capacity),
            ..ReceiverConfig::with_port(self.port)
        }
    }
}

/// Outbound side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendSettings {
    pub host: String,
    pub port: u16,
    /// Minimum seconds between periodic sends
    pub interval: f32,
    /// Prepended to command addresses
    pub prefix: String,
}

impl Default for SendSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 17200,
            interval: 0.033,
            prefix: String::new(),
        }
    }
}

impl SendSettings {
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            host: self.host.clone(),
            port: self.port,
            prefix: self.prefix.clone(),
        }
    }

    /// Periodic send interval. Non-positive values mean no limit.
    pub fn interval(&self) -> Duration {
        if self.interval.is_finite() && self.interval > 0.0 {
            Duration::from_secs_f32(self.interval)
        } else {
            Duration::ZERO
        }
    }
}

/// Startup broadcast that tells peers where to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceSettings {
    pub enabled: bool,
    pub address: String,
    /// Appended to `address` as the last path segment
    pub name: String,
}

impl Default for AnnounceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "/setAddress".to_string(),
            name: "cuewire".to_string(),
        }
    }
}

impl AnnounceSettings {
    /// Full OSC address of the announce message, e.g. `/setAddress/cuewire`
    pub fn message_address(&self) -> String {
        let base = self.address.trim_end_matches('/');
        if self.name.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, self.name.trim_start_matches('/'))
        }
    }
}

/// A static mapping declared in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSettings {
    pub address: String,
    pub kind: ValueKind,
}

/// Top-level settings, serialized as cuewire.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub receive: Option<ReceiveSettings>,
    pub send: Option<SendSettings>,
    pub announce: Option<AnnounceSettings>,
    #[serde(default, rename = "mapping", skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<MappingSettings>,
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = Self::from_toml(&contents).map_err(|e| SettingsError::ParseToml {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Load `cuewire.toml` from `dir`. Returns Ok(None) if the file doesn't exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Load from an explicit file if given, otherwise from `cuewire.toml` in
    /// the working directory, otherwise defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::load_from_dir(Path::new("."))?.unwrap_or_default()),
        }
    }

    /// Write settings to a file, replacing it
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| SettingsError::SerializeToml {
                path: path.to_path_buf(),
                source: e,
            })?;
        std::fs::write(path, contents).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Write settings to `cuewire.toml` in `dir`
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf, SettingsError> {
        let path = dir.join(SETTINGS_FILENAME);
        self.save(&path)?;
        Ok(path)
    }

    pub fn receive(&self) -> ReceiveSettings {
        self.receive.clone().unwrap_or_default()
    }

    pub fn send(&self) -> SendSettings {
        self.send.clone().unwrap_or_default()
    }

    pub fn announce(&self) -> AnnounceSettings {
        self.announce.clone().unwrap_or_default()
    }
}

/// Errors that can occur during settings operations
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize TOML for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}
