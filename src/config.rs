// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::QualityProfile;
use crate::engine::hardware::HardwareRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Quality profile used when none is given on the command line (low, med, high)
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Hardware mode used when none is given on the command line
    #[serde(default)]
    pub hardware: HardwareRequest,

    /// Compress every encode
    #[serde(default)]
    pub compress: bool,

    /// Fail instead of retrying on the CPU when the GPU encoder cannot be launched
    #[serde(default)]
    pub disable_cpu_fallback: bool,

    /// Kill encodes that run longer than this many seconds
    #[serde(default)]
    pub encode_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// ffmpeg binary (name on PATH or absolute path)
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    /// ffprobe binary (name on PATH or absolute path)
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_profile() -> String {
    "med".to_string()
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            hardware: HardwareRequest::Auto,
            compress: false,
            disable_cpu_fallback: false,
            encode_timeout_secs: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

impl DefaultsConfig {
    pub fn quality_profile(&self) -> QualityProfile {
        QualityProfile::parse(&self.profile)
    }

    pub fn encode_timeout(&self) -> Option<Duration> {
        self.encode_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("vr")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("vr")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            Self::parse(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })
        } else {
            let config = Config::default();

            // Saving is best effort (e.g. the directory isn't writable)
            if let Err(e) = config.save() {
                tracing::warn!("Could not create default config file: {:#}", e);
            }

            Ok(config)
        }
    }

    /// Parse config from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid config TOML")
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }
}
