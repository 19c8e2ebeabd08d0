//! Configuration management for Entrain
//!
//! This module provides:
//! - Runtime engine configuration (fades, ramps, stream preferences)
//! - Preset system with TOML serialization for saved audio settings
//! - Config manager for the main config file under the user config dir

use crate::domain::settings::AudioSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Runtime engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Start/stop fade duration in seconds
    pub fade_secs: f32,

    /// Ramp duration applied to live parameter updates, seconds
    pub update_ramp_secs: f32,

    /// Preferred sample rate (the device may impose another)
    pub preferred_sample_rate: u32,

    /// Audio buffer size in frames
    pub buffer_size: u32,

    /// Fixed RNG seed for the noise generators (None = entropy)
    #[serde(default)]
    pub noise_seed: Option<u64>,

    /// Preset directory
    pub preset_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fade_secs: 0.5,
            update_ramp_secs: 0.05,
            preferred_sample_rate: 48000,
            buffer_size: 512,
            noise_seed: None,
            preset_dir: PathBuf::from("presets"),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fade_secs.is_finite() || self.fade_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fade_secs must be non-negative, got {}",
                self.fade_secs
            )));
        }
        if !self.update_ramp_secs.is_finite() || self.update_ramp_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "update_ramp_secs must be non-negative, got {}",
                self.update_ramp_secs
            )));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete Entrain configuration: engine parameters plus the settings
/// restored on next launch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntrainConfig {
    pub engine: EngineConfig,
    pub settings: AudioSettings,
}

impl EntrainConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.engine.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str)?;

        debug!("Configuration saved successfully");
        Ok(())
    }
}

/// Preset manager for named [`AudioSettings`] snapshots
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    fn preset_path(&self, name: &str) -> PathBuf {
        self.preset_dir.join(format!("{}.toml", name))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        for entry in fs::read_dir(&self.preset_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub fn load_preset(&self, name: &str) -> Result<AudioSettings> {
        let path = self.preset_path(name);
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save a preset by name
    #[instrument(skip(self, settings))]
    pub fn save_preset(&self, name: &str, settings: &AudioSettings) -> Result<()> {
        fs::create_dir_all(&self.preset_dir)?;
        let toml_str = toml::to_string_pretty(settings)?;
        fs::write(self.preset_path(name), toml_str)?;
        info!(name, "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name);
        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path)?;
        info!(name, "Preset deleted");
        Ok(())
    }

    pub fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).exists()
    }
}

/// Configuration manager for the main Entrain config
///
/// Manages the main configuration file at `~/.config/entrain/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/entrain` on Linux/Mac and `%APPDATA%\entrain` on
    /// Windows.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("entrain"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, returns the default. If the file
    /// is corrupt, backs it up, logs an error and returns the default.
    #[instrument(skip(self))]
    pub fn load(&self) -> EntrainConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating default"
            );

            let config = EntrainConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path) {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }
            return config;
        }

        match EntrainConfig::load_from_file(&self.config_path) {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path) {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                EntrainConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub fn save(&self, config: &EntrainConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        config.save_to_file(&self.config_path)
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
