use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gladia: GladiaConfig,
    pub analysis: AnalysisConfig,
    pub converter: ConverterConfig,
    pub purge: PurgeConfig,
}

/// Transcription provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GladiaConfig {
    pub api_key: String,
    pub base_url: String,
    pub poll_interval_seconds: u64,
    /// Bound on how long a single transcript retrieval may poll.
    pub poll_timeout_seconds: u64,
}

impl Default for GladiaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.gladia.io/v2".to_string(),
            poll_interval_seconds: 3,
            poll_timeout_seconds: 600,
        }
    }
}

/// AI completion provider settings for the analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub bitrate_kbps: u32,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self { bitrate_kbps: 96 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    pub page_size: usize,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
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
        let dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(dir.join("reelscribe").join("config.toml"))
    }

    /// Default root for session documents.
    pub fn session_root() -> Result<PathBuf> {
        let dir = dirs::data_dir().context("Could not determine data directory")?;
        Ok(dir.join("reelscribe").join("sessions"))
    }
}
