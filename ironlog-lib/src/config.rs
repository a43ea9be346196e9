//src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR: &str = "ironlog";
const CONFIG_ENV_VAR: &str = "IRONLOG_CONFIG_DIR";
const DATA_ENV_VAR: &str = "IRONLOG_DATA_DIR";

pub const DEFAULT_WORKOUT_NAME: &str = "New Workout";
pub const DEFAULT_POINTER_FILE_NAME: &str = "CurrentWorkout";

const KG_TO_LB: f64 = 2.204_62;
const KM_TO_MILE: f64 = 0.621_371;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory.")]
    CannotDetermineConfigDir,
    #[error("Could not determine data directory.")]
    CannotDetermineDataDir,
    #[error("I/O error accessing config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file (TOML): {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize config data (TOML): {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Pointer write attempts must be at least 1, got {0}")]
    InvalidWriteAttempts(u32),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric, // kg, km
    Imperial, // lbs, miles
}

impl Units {
    /// Converts user input to the stored unit (kg).
    #[must_use]
    pub fn weight_from_input(self, value: f64) -> f64 {
        match self {
            Self::Metric => value,
            Self::Imperial => value / KG_TO_LB,
        }
    }

    #[must_use]
    pub fn weight_for_display(self, kg: f64) -> f64 {
        match self {
            Self::Metric => kg,
            Self::Imperial => kg * KG_TO_LB,
        }
    }

    /// Converts user input to the stored unit (km).
    #[must_use]
    pub fn distance_from_input(self, value: f64) -> f64 {
        match self {
            Self::Metric => value,
            Self::Imperial => value / KM_TO_MILE,
        }
    }

    #[must_use]
    pub fn distance_for_display(self, km: f64) -> f64 {
        match self {
            Self::Metric => km,
            Self::Imperial => km * KM_TO_MILE,
        }
    }

    #[must_use]
    pub const fn weight_label(self) -> &'static str {
        match self {
            Self::Metric => "kg",
            Self::Imperial => "lbs",
        }
    }

    #[must_use]
    pub const fn distance_label(self) -> &'static str {
        match self {
            Self::Metric => "km",
            Self::Imperial => "miles",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)] // Missing keys fall back to defaults
pub struct Config {
    pub units: Units,
    /// Name given to workouts started without a template.
    pub default_workout_name: String,
    /// File (inside the data directory) holding the in-progress workout pointer.
    pub pointer_file_name: String,
    pub pointer_write_attempts: u32,
    /// Resume the in-progress workout on startup.
    pub restore_on_launch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: Units::default(),
            default_workout_name: DEFAULT_WORKOUT_NAME.to_string(),
            pointer_file_name: DEFAULT_POINTER_FILE_NAME.to_string(),
            pointer_write_attempts: 1,
            restore_on_launch: true,
        }
    }
}

impl Config {
    /// # Errors
    /// `ConfigError::InvalidWriteAttempts` if `pointer_write_attempts` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pointer_write_attempts == 0 {
            return Err(ConfigError::InvalidWriteAttempts(0));
        }
        Ok(())
    }
}

fn dir_from_env_or(var: &str, fallback: Option<PathBuf>, err: ConfigError) -> Result<PathBuf, ConfigError> {
    let dir = if let Ok(path_str) = std::env::var(var) {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            warn!(
                "Environment variable {} points to '{}', which is not a directory. Trying to create it.",
                var,
                path.display()
            );
        }
        path
    } else {
        fallback.ok_or(err)?.join(APP_DIR)
    };

    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Determines the path to the configuration file.
/// # Errors
/// Returns `ConfigError` if no config directory can be found or created.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let dir = dir_from_env_or(
        CONFIG_ENV_VAR,
        dirs::config_dir(),
        ConfigError::CannotDetermineConfigDir,
    )?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Directory holding the database and the session pointer file.
/// # Errors
/// Returns `ConfigError` if no data directory can be found or created.
pub fn get_data_dir() -> Result<PathBuf, ConfigError> {
    dir_from_env_or(
        DATA_ENV_VAR,
        dirs::data_dir(),
        ConfigError::CannotDetermineDataDir,
    )
}

/// Loads the configuration, writing defaults on first run.
/// # Errors
/// Returns `ConfigError` on I/O, parse or validation failure.
pub fn load(config_path: &Path) -> Result<Config, ConfigError> {
    if config_path.exists() {
        let config_content = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let default_config = Config::default();
        save(config_path, &default_config)?;
        Ok(default_config)
    }
}

/// Saves the configuration to the TOML file.
/// # Errors
/// Returns `ConfigError` on I/O or serialization failure.
pub fn save(config_path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }
    let config_content = toml::to_string_pretty(config)?;
    fs::write(config_path, config_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn missing_keys_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "units = \"imperial\"\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.units, Units::Imperial);
        assert_eq!(config.default_workout_name, DEFAULT_WORKOUT_NAME);
        assert!(config.restore_on_launch);
    }

    #[test]
    fn zero_write_attempts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "pointer_write_attempts = 0\n").unwrap();
        assert!(matches!(
            load(&path),
            Err(ConfigError::InvalidWriteAttempts(0))
        ));
    }

    #[test]
    fn units_round_trip_through_input() {
        let kg = Units::Imperial.weight_from_input(225.0);
        assert!((Units::Imperial.weight_for_display(kg) - 225.0).abs() < 1e-9);
        assert!((Units::Metric.distance_from_input(5.0) - 5.0).abs() < f64::EPSILON);
    }
}
