use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::indicator::{IndicatorParams, RsiSmoothing};
use crate::model::{IndicatorKind, Timespan};
use crate::provider::batch::BatchPolicy;
use crate::provider::rest::DEFAULT_BASE_URL;
use crate::provider::{ApiKey, BarsRequest};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_timespan() -> String {
    "day".into()
}

fn default_multiplier() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overridden by `--api-key` / `SHEET_TA_API_KEY`.
    pub api_key: Option<ApiKey>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_true")]
    pub adjusted: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            requests_per_second: default_requests_per_second(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            adjusted: default_true(),
        }
    }
}

impl ProviderConfig {
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            width: self.batch_size,
            delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

/// One ticker/indicator pair processed by the `watch` command.
#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    pub ticker: String,
    pub indicator: String,
    #[serde(default = "default_timespan")]
    pub timespan: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Quoted `"YYYY-MM-DD"`.
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub params: toml::Table,
}

impl WatchConfig {
    /// Indicator kind; `None` only for configs that skipped validation.
    pub fn kind(&self) -> Option<IndicatorKind> {
        IndicatorKind::from_str(&self.indicator)
    }

    pub fn request(&self) -> Option<BarsRequest> {
        let timespan = Timespan::from_str(&self.timespan)?;
        Some(BarsRequest {
            ticker: self.ticker.clone(),
            timespan,
            multiplier: self.multiplier,
            from: self.from,
            to: self.to,
        })
    }

    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            period: self.params.get("period").and_then(|v| v.as_integer()),
            std_dev_multiplier: self.params.get("std_dev_multiplier").and_then(|v| {
                v.as_float().or_else(|| v.as_integer().map(|n| n as f64))
            }),
            smoothing: self
                .params
                .get("smoothing")
                .and_then(|v| v.as_str())
                .and_then(RsiSmoothing::from_str),
        }
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const KNOWN_PARAMS: &[&str] = &["period", "std_dev_multiplier", "smoothing"];

pub fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_provider(config)?;
    validate_watch_entries(config)?;
    validate_watch_unique(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" must be \"text\" or \"json\"",
            config.general.log_format
        )));
    }
    Ok(())
}

fn validate_provider(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let provider = &config.provider;
    if provider.requests_per_second == 0 {
        return Err(invalid("provider.requests_per_second must be > 0".into()));
    }
    if provider.batch_size == 0 {
        return Err(invalid("provider.batch_size must be > 0".into()));
    }
    if provider.base_url.trim().is_empty() {
        return Err(invalid("provider.base_url must not be empty".into()));
    }
    Ok(())
}

fn validate_watch_entries(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    for entry in &config.watch {
        let at = format!("watch[ticker={}, indicator={}]", entry.ticker, entry.indicator);

        if entry.ticker.trim().is_empty() {
            return Err(invalid(format!("{at}.ticker must not be empty")));
        }
        if entry.kind().is_none() {
            return Err(invalid(format!(
                "{at}.indicator: unknown indicator \"{}\"",
                entry.indicator
            )));
        }
        if Timespan::from_str(&entry.timespan).is_none() {
            return Err(invalid(format!(
                "{at}.timespan: unknown timespan \"{}\"",
                entry.timespan
            )));
        }
        if entry.multiplier == 0 {
            return Err(invalid(format!("{at}.multiplier must be > 0")));
        }
        if entry.from > entry.to {
            return Err(invalid(format!(
                "{at}: from {} is after to {}",
                entry.from, entry.to
            )));
        }
        validate_params(&at, &entry.params)?;
    }
    Ok(())
}

fn validate_params(at: &str, params: &toml::Table) -> Result<(), Report<ConfigError>> {
    for (key, value) in params {
        let ok = match key.as_str() {
            "period" => value.is_integer(),
            "std_dev_multiplier" => value.is_float() || value.is_integer(),
            "smoothing" => value.as_str().and_then(RsiSmoothing::from_str).is_some(),
            _ => {
                return Err(invalid(format!(
                    "{at}.params: unknown key \"{key}\" (expected one of {KNOWN_PARAMS:?})"
                )));
            }
        };
        if !ok {
            return Err(invalid(format!("{at}.params.{key}: invalid value {value}")));
        }
    }
    Ok(())
}

fn validate_watch_unique(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for entry in &config.watch {
        let key = (
            entry.ticker.as_str(),
            entry.kind(),
            entry.timespan.as_str(),
            entry.multiplier,
        );
        if !seen.insert(key) {
            return Err(invalid(format!(
                "watch: duplicate entry ticker={} indicator={} timespan={}",
                entry.ticker, entry.indicator, entry.timespan
            )));
        }
    }
    Ok(())
}
