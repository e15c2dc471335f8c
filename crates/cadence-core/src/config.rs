//! Engine configuration and YAML persistence

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::effect::CompositionMode;

/// Engine construction parameters
///
/// Loaded from YAML or built in code. Unknown fields are ignored and
/// missing fields fall back to their defaults, so old config files keep
/// working.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    /// Default: 44100
    pub sample_rate: u32,

    /// Frames per rendered buffer
    /// Default: 512
    pub buffer_size: usize,

    /// Buffers held in the producer queue
    /// Default: 8
    pub queue_capacity: usize,

    /// Producer head start before the device stream opens, in milliseconds
    /// Default: 100
    pub startup_delay_ms: u64,

    /// Initial volume as a percentage, 0 to 120
    /// Default: 60.0
    pub volume: f32,

    /// Use a multi-channel mixer; a single solo channel otherwise
    /// Default: true
    pub use_mixer: bool,

    /// How each channel's effect chain combines its effects
    /// Default: parallel
    pub effect_composition: CompositionMode,

    /// Output device name; `None` picks the system default
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            queue_capacity: 8,
            startup_delay_ms: 100,
            volume: 60.0,
            use_mixer: true,
            effect_composition: CompositionMode::Parallel,
            device: None,
        }
    }
}

/// Load a configuration from a YAML file
///
/// A missing file yields the default configuration; an unreadable or
/// invalid one logs a warning and yields the default too.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: Failed to read config: {}, using defaults", e);
            T::default()
        }
    }
}

/// Save a configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

/// Default config file location: `~/.config/cadence/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join(filename)
}
