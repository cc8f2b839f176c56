//! # Dia-Log
//!
//! Settings loading and helpers shared by the `dia-log` command line.
//!
//! Settings come from `dia_log.toml` when present, with every field defaulted,
//! and two environment overrides applied on top:
//!
//! - `DIA_LOG_FORECAST_URL` replaces `forecast.base_url`
//! - `DIA_LOG_UTC_OFFSET` replaces `forecast.utc_offset`

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use glucose_forecast::{fetch_template, ForecastConfig, ForecastError, MealLedger};
use glucose_template::utils::{generate_template, parse_hhmm, GeneratorConfig};
use glucose_template::{TemplateError, TemplateStore};
use log::{info, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default settings file, looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "dia_log.toml";

pub const ENV_FORECAST_URL: &str = "DIA_LOG_FORECAST_URL";
pub const ENV_UTC_OFFSET: &str = "DIA_LOG_UTC_OFFSET";

/// Errors raised while loading settings or their referenced files
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Where the template comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TemplateSource {
    /// CSV file on disk
    File { path: PathBuf },
    /// CSV served over HTTP
    Url { url: String },
    /// Synthetic template built in memory
    Generated { seed: u64 },
}

impl Default for TemplateSource {
    fn default() -> Self {
        TemplateSource::Generated { seed: 42 }
    }
}

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub template: TemplateSource,
    /// JSON file holding the meal ledger
    pub meals_path: Option<PathBuf>,
    pub forecast: ForecastConfig,
}

impl Settings {
    /// Parse settings from TOML text, defaulting missing fields
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = match fs::read_to_string(path) {
            Ok(text) => {
                info!("Loaded settings from {}", path.display());
                Self::from_toml(&text)?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.forecast.validate()?;
        Ok(settings)
    }

    /// Apply environment overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_FORECAST_URL) {
            self.forecast.base_url = url;
        }
        if let Some(offset) = lookup(ENV_UTC_OFFSET) {
            self.forecast.utc_offset = offset;
        }
    }

    /// Load or build the template
    pub async fn load_template(&self) -> Result<TemplateStore> {
        let store = match &self.template {
            TemplateSource::File { path } => {
                TemplateStore::from_path(path).map_err(ForecastError::from)?
            }
            TemplateSource::Url { url } => {
                let url = Url::parse(url).map_err(|e| {
                    ForecastError::Template(TemplateError::Load(format!("{}: {}", url, e)))
                })?;
                let client = reqwest::Client::builder()
                    .timeout(self.forecast.request_timeout())
                    .build()
                    .map_err(ForecastError::from)?;
                fetch_template(&client, url).await?
            }
            TemplateSource::Generated { seed } => {
                let config = GeneratorConfig {
                    seed: *seed,
                    ..Default::default()
                };
                generate_template(&config).map_err(ForecastError::from)?
            }
        };
        Ok(store)
    }

    /// Load the meal ledger; no configured or existing file yields an empty ledger
    pub fn load_meals(&self) -> Result<MealLedger> {
        let Some(path) = &self.meals_path else {
            return Ok(MealLedger::new());
        };
        match fs::read_to_string(path) {
            Ok(text) => Ok(MealLedger::from_json(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Meal ledger {} not found, starting empty", path.display());
                Ok(MealLedger::new())
            }
            Err(source) => Err(SettingsError::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Write the meal ledger to `meals_path`
    pub fn save_meals(&self, ledger: &MealLedger) -> Result<()> {
        let Some(path) = &self.meals_path else {
            return Err(SettingsError::Forecast(ForecastError::InvalidParameter(
                "meals_path is not configured".to_string(),
            )));
        };
        fs::write(path, ledger.to_json()?).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }
}

/// Fill whichever of `--date` and `--at HH:MM` was not given from `clock`.
pub fn resolve_now(date: Option<NaiveDate>, at: Option<NaiveTime>, clock: NaiveDateTime) -> NaiveDateTime {
    NaiveDateTime::new(date.unwrap_or(clock.date()), at.unwrap_or(clock.time()))
}

/// Clap value parser for `HH:MM`
pub fn parse_at(raw: &str) -> std::result::Result<NaiveTime, String> {
    parse_hhmm(raw).map_err(|e| e.to_string())
}
