use crate::global;
use crate::sources::browser::BrowserAction;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub capture: CaptureConfig,
    pub browser: BrowserConfig,
    /// Optional stream to start automatically when the service launches.
    pub stream: Option<MixConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit path to the ffmpeg binary. Resolved from PATH when unset.
    pub ffmpeg_path: Option<String>,
    /// How long to wait for the engine's first output frame before giving up.
    pub startup_timeout_seconds: u64,
    /// Grace period between asking the engine to quit and force-killing it.
    pub stop_grace_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            startup_timeout_seconds: 15,
            stop_grace_seconds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Command that records a capture device to a file path argument.
    pub command: String,
    /// Extra arguments inserted before the target/path arguments.
    pub extra_args: Vec<String>,
    /// How long to wait for the capture file to start filling.
    pub ready_timeout_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "pw-record".to_string(),
            extra_args: Vec::new(),
            ready_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Shell command driving an external browser-automation tool.
    /// Receives the page URL and viewport via env vars and the action list
    /// as JSON on stdin; must print "ready" once the page is set up.
    pub command: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Navigation plus scripted actions must finish within this window.
    pub navigation_timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            viewport_width: 1280,
            viewport_height: 720,
            navigation_timeout_seconds: 30,
        }
    }
}

/// How the secondary audio source is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Disabled,
    Url,
    Device,
    Browser,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Url => "url",
            Self::Device => "device",
            Self::Browser => "browser",
        }
    }
}

impl Default for SourceMode {
    fn default() -> Self {
        Self::Disabled
    }
}

/// Mode-specific parameters for the secondary source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceParams {
    /// Capture device name (device mode).
    pub device: Option<String>,
    /// Direct audio URL (url mode).
    pub audio_url: Option<String>,
    /// Page to open (browser mode).
    pub page_url: Option<String>,
    /// Scripted actions handed to the browser-automation collaborator.
    pub actions: Vec<BrowserAction>,
}

pub const VOLUME_MAX: u32 = 200;
pub const DELAY_MAX_MS: u32 = 5000;

/// One pipeline session's full parameter set. Supplied by the caller and
/// never mutated by the core — live updates produce a fresh copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    pub input_url: String,
    pub output_url: String,
    pub source_mode: SourceMode,
    pub source_params: SourceParams,
    /// Primary audio gain, percent. 100 = unity.
    pub primary_volume: u32,
    /// Secondary audio gain, percent. 100 = unity.
    pub secondary_volume: u32,
    pub primary_delay_ms: u32,
    pub secondary_delay_ms: u32,
    /// Video bitrate used when the video stream must be re-encoded.
    pub video_bitrate_kbps: u32,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            input_url: String::new(),
            output_url: String::new(),
            source_mode: SourceMode::Disabled,
            source_params: SourceParams::default(),
            primary_volume: 100,
            secondary_volume: 100,
            primary_delay_ms: 0,
            secondary_delay_ms: 0,
            video_bitrate_kbps: 4500,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be between 0 and {max}, got {value}", max = VOLUME_MAX)]
    VolumeOutOfRange { field: &'static str, value: u32 },
    #[error("{field} must be between 0 and {max} ms, got {value}", max = DELAY_MAX_MS)]
    DelayOutOfRange { field: &'static str, value: u32 },
    #[error("video_bitrate_kbps must be positive")]
    ZeroBitrate,
    #[error("{field} must not be empty")]
    EmptyEndpoint { field: &'static str },
}

impl MixConfig {
    /// Checks every numeric field against its closed range. Runs before any
    /// pipeline state is touched; a failure leaves the pipeline unchanged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_url.is_empty() {
            return Err(ConfigError::EmptyEndpoint { field: "input_url" });
        }
        if self.output_url.is_empty() {
            return Err(ConfigError::EmptyEndpoint { field: "output_url" });
        }
        if self.primary_volume > VOLUME_MAX {
            return Err(ConfigError::VolumeOutOfRange {
                field: "primary_volume",
                value: self.primary_volume,
            });
        }
        if self.secondary_volume > VOLUME_MAX {
            return Err(ConfigError::VolumeOutOfRange {
                field: "secondary_volume",
                value: self.secondary_volume,
            });
        }
        if self.primary_delay_ms > DELAY_MAX_MS {
            return Err(ConfigError::DelayOutOfRange {
                field: "primary_delay_ms",
                value: self.primary_delay_ms,
            });
        }
        if self.secondary_delay_ms > DELAY_MAX_MS {
            return Err(ConfigError::DelayOutOfRange {
                field: "secondary_delay_ms",
                value: self.secondary_delay_ms,
            });
        }
        if self.video_bitrate_kbps == 0 {
            return Err(ConfigError::ZeroBitrate);
        }
        Ok(())
    }

    /// Returns a copy with the given live adjustments applied. Unset fields
    /// keep their current values.
    pub fn merged(&self, update: &LiveUpdate) -> MixConfig {
        let mut next = self.clone();
        if let Some(v) = update.primary_volume {
            next.primary_volume = v;
        }
        if let Some(v) = update.secondary_volume {
            next.secondary_volume = v;
        }
        if let Some(v) = update.primary_delay_ms {
            next.primary_delay_ms = v;
        }
        if let Some(v) = update.secondary_delay_ms {
            next.secondary_delay_ms = v;
        }
        next
    }
}

/// Partial parameter change applied to a running pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveUpdate {
    pub primary_volume: Option<u32>,
    pub secondary_volume: Option<u32>,
    pub primary_delay_ms: Option<u32>,
    pub secondary_delay_ms: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
