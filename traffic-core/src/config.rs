use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::{
    model::Coordinates,
    peak_hours::MalformedLinePolicy,
    predictor::EncoderFallbacks,
    provider::openweather::{CURRENT_URL, TIMEMACHINE_URL},
};

/// Overrides `openweather.api_key` from the config file when set.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// OpenWeather credentials and endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenWeatherConfig {
    pub api_key: Option<String>,
    pub timemachine_url: String,
    pub current_url: String,
    pub timeout_secs: u64,
}

impl Default for OpenWeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            timemachine_url: TIMEMACHINE_URL.to_string(),
            current_url: CURRENT_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Where the trained artifacts live and which classes stand in for unseen categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: PathBuf,
    pub holiday_fallback: String,
    pub weather_fallback: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let fallbacks = EncoderFallbacks::default();
        Self {
            dir: PathBuf::from("models"),
            holiday_fallback: fallbacks.holiday,
            weather_fallback: fallbacks.weather,
        }
    }
}

impl ModelConfig {
    pub fn fallbacks(&self) -> EncoderFallbacks {
        EncoderFallbacks {
            holiday: self.holiday_fallback.clone(),
            weather: self.weather_fallback.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Directory of newline-delimited JSON files written by the batch job.
    pub peak_hours_dir: PathBuf,
    pub malformed_lines: MalformedLinePolicy,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            peak_hours_dir: PathBuf::from("spark/data/analytics_results/peak_hours"),
            malformed_lines: MalformedLinePolicy::default(),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// [openweather]
/// api_key = "..."
///
/// [location]
/// lat = 12.9716
/// lon = 77.5946
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub openweather: OpenWeatherConfig,
    /// Location used when a request gives no coordinates.
    pub location: Coordinates,
    pub model: ModelConfig,
    pub analytics: AnalyticsConfig,
}

impl Config {
    /// Load config from disk (or defaults if it doesn't exist yet), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "traffic-predict", "traffic-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.openweather.api_key = Some(api_key);
    }

    pub fn api_key(&self) -> Option<&str> {
        self.openweather
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    fn apply_api_key_override(&mut self, value: Option<String>) {
        if let Some(key) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            self.openweather.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_point_at_reference_city_and_openweather() {
        let cfg = Config::default();

        assert_eq!(cfg.location, Coordinates::default());
        assert_eq!(cfg.openweather.current_url, CURRENT_URL);
        assert_eq!(cfg.openweather.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.model.fallbacks(), EncoderFallbacks::default());
        assert_eq!(cfg.analytics.malformed_lines, MalformedLinePolicy::Fail);
        assert_eq!(cfg.api_key(), None);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [openweather]
            api_key = "OPEN_KEY"

            [analytics]
            malformed_lines = "skip"
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.api_key(), Some("OPEN_KEY"));
        assert_eq!(cfg.openweather.timemachine_url, TIMEMACHINE_URL);
        assert_eq!(cfg.analytics.malformed_lines, MalformedLinePolicy::Skip);
        assert_eq!(cfg.model.dir, PathBuf::from("models"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let cfg = Config::load_from(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.set_api_key("SAVED_KEY".to_string());
        cfg.location = Coordinates {
            lat: 48.8566,
            lon: 2.3522,
        };
        cfg.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn invalid_toml_names_the_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[openweather\napi_key = 1").expect("write");

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn env_override_replaces_stored_key() {
        let mut cfg = Config::default();
        cfg.set_api_key("FILE_KEY".to_string());

        cfg.apply_api_key_override(Some("  ENV_KEY ".to_string()));
        assert_eq!(cfg.api_key(), Some("ENV_KEY"));

        cfg.apply_api_key_override(Some(String::new()));
        assert_eq!(cfg.api_key(), Some("ENV_KEY"));

        cfg.apply_api_key_override(None);
        assert_eq!(cfg.api_key(), Some("ENV_KEY"));
    }
}
