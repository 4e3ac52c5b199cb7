// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::engine::{Engine, Limits, VideoCodec};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Ranges for numeric options; probe results are clamped into these
    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ffmpeg executable, looked up on PATH unless absolute
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Trial-encode a few frames before trusting a hardware encoder with a file
    #[serde(default = "default_true_config")]
    pub verify_hardware: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Where converted files go (default: next to the input)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Whether to overwrite existing output files
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub video_codec: VideoCodec,

    /// Use NVENC when available
    #[serde(default)]
    pub hardware: bool,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_true_config() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            verify_hardware: true,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("fftool")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("fftool")
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

            Self::from_toml(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })
        } else {
            let config = Config::default();

            // The directory may not be writable; built-in defaults still work
            if let Err(e) = config.save() {
                tracing::warn!(
                    "Could not create default config file: {:#}. Using built-in defaults; run 'fftool init-config' to create one.",
                    e
                );
            }

            Ok(config)
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid config TOML")
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

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

    /// The engine described by `[engine]`
    pub fn engine(&self) -> Engine {
        Engine::new(&self.engine.ffmpeg_path)
    }
}
