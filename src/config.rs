use crate::brew::ScannerSettings;
use crate::sink::DEFAULT_DATABASE;
use crate::sink::influx::DEFAULT_TIMEOUT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8099;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub scanner: Option<ScannerSection>,
    #[serde(default)]
    pub sink: Option<SinkSection>,
    #[serde(default)]
    pub scale: Option<ScaleSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Segmentation and classification tuning. Unset fields keep their defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScannerSection {
    pub expected_single_shot_weight: Option<f64>,
    pub expected_double_shot_weight: Option<f64>,
    pub single_shot_beans_weight: Option<f64>,
    pub double_shot_beans_weight: Option<f64>,
    pub grind_setting: Option<f64>,
    pub min_brew_duration_ms: Option<u64>,
    pub max_brew_duration_ms: Option<u64>,
    pub increase_threshold: Option<f64>,
    pub plateau_threshold: Option<f64>,
    pub window_size: Option<usize>,
    pub history_capacity: Option<usize>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Memory,
    Influx,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SinkSection {
    #[serde(default)]
    pub kind: SinkKind,
    /// Base URL of the time-series store, e.g. `http://localhost:8086`
    pub endpoint: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScaleSection {
    /// JSON recording replayed as the sample source
    pub replay_path: Option<PathBuf>,
    pub sample_interval_ms: Option<u64>,
    pub battery_level: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8099)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Scanner settings with defaults applied, rejected if inconsistent.
    pub fn scanner_settings(&self) -> Result<ScannerSettings, ConfigError> {
        let mut settings = ScannerSettings::default();
        if let Some(section) = &self.scanner {
            let ms = Duration::from_millis;
            if let Some(value) = section.expected_single_shot_weight {
                settings.expected_single_shot_weight = value;
            }
            if let Some(value) = section.expected_double_shot_weight {
                settings.expected_double_shot_weight = value;
            }
            if let Some(value) = section.single_shot_beans_weight {
                settings.single_shot_beans_weight = value;
            }
            if let Some(value) = section.double_shot_beans_weight {
                settings.double_shot_beans_weight = value;
            }
            if let Some(value) = section.grind_setting {
                settings.grind_setting = value;
            }
            if let Some(value) = section.min_brew_duration_ms {
                settings.min_brew_duration = ms(value);
            }
            if let Some(value) = section.max_brew_duration_ms {
                settings.max_brew_duration = ms(value);
            }
            if let Some(value) = section.increase_threshold {
                settings.increase_threshold = value;
            }
            if let Some(value) = section.plateau_threshold {
                settings.plateau_threshold = value;
            }
            if let Some(value) = section.window_size {
                settings.window_size = value;
            }
            if let Some(value) = section.history_capacity {
                settings.history_capacity = value;
            }
            if let Some(value) = section.queue_capacity {
                settings.queue_capacity = value;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn sink_kind(&self) -> SinkKind {
        self.sink.as_ref().map(|s| s.kind).unwrap_or_default()
    }

    /// Returns the target database name (default: "brews")
    pub fn database(&self) -> &str {
        self.sink
            .as_ref()
            .and_then(|s| s.database.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DATABASE)
    }

    /// Socket timeout for sink requests (default: 2s). Zero is rejected.
    pub fn sink_timeout(&self) -> Result<Duration, ConfigError> {
        match self.sink.as_ref().and_then(|s| s.timeout_ms) {
            Some(0) => Err(ConfigError::Invalid(
                "[sink].timeout_ms must be positive".to_string(),
            )),
            Some(ms) => Ok(Duration::from_millis(ms)),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }

    pub fn replay_path(&self) -> Option<&Path> {
        let path = self.scale.as_ref()?.replay_path.as_deref()?;
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }

    /// Returns the server port (default: 8099)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}
