use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Volume applied when the player starts, `0.0..=1.0`.
    #[serde(default = "default_volume")]
    pub default_volume: f64,
    /// Rates offered by the speed menu.
    #[serde(default = "default_playback_rates")]
    pub playback_rates: Vec<f64>,
    /// Increment used by subtitle offset nudges, in seconds.
    #[serde(default = "default_subtitle_offset_step")]
    pub subtitle_offset_step: f64,
}

/// Local TCP control socket used by presentation clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    /// Explicit mpv binary; searched beside the exe and on PATH when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// Open a video window.  Audio-only setups can turn this off.
    #[serde(default = "default_video")]
    pub video: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Station list source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Local TOML station file.  The built-in list is used when it is missing.
    /// Defaults to `<config dir>/stations.toml`.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            playback_rates: default_playback_rates(),
            subtitle_offset_step: default_subtitle_offset_step(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            binary: None,
            video: default_video(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
        }
    }
}

fn default_volume() -> f64 {
    1.0
}

fn default_playback_rates() -> Vec<f64> {
    vec![0.5, 0.75, 1.0, 1.25, 1.5, 2.0]
}

fn default_subtitle_offset_step() -> f64 {
    0.1
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::CONTROL_TCP_PORT
}

fn default_video() -> bool {
    true
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.player.default_volume = config.player.default_volume.clamp(0.0, 1.0);
        config
            .player
            .playback_rates
            .retain(|r| r.is_finite() && *r > 0.0);
        if config.player.playback_rates.is_empty() {
            config.player.playback_rates = default_playback_rates();
        }
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
