//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::market_data::Granularity;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Charting backend configuration
    pub feed: FeedConfig,

    /// Chart surface and paging configuration
    pub chart: ChartConfig,

    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Base URL serving `/ohlc-data` and `/zones/all-zones`
    pub base_url: String,

    /// Days covered by the initial load
    pub lookback_days: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Interval used when none is given on the command line
    pub default_interval: Granularity,

    /// Size used when the surface never reports one
    pub fallback_width: u32,
    pub fallback_height: u32,

    /// Surface readiness polling
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,

    /// Days fetched per "load more" page
    pub load_more_days: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level
    pub level: String,

    /// Rolling log file; empty disables file logging
    pub file_path: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            lookback_days: 365,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            default_interval: Granularity::Day1,
            fallback_width: 800,
            fallback_height: 500,
            poll_interval_ms: 100,
            max_poll_attempts: 30,
            load_more_days: 365,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: "logs/zonechart.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply `ZONECHART_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            lookup(name)?.trim().parse().ok()
        }

        if let Some(url) = lookup("ZONECHART_FEED_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.feed.base_url = url;
        }
        if let Some(days) = parsed(&lookup, "ZONECHART_FEED_LOOKBACK_DAYS") {
            self.feed.lookback_days = days;
        }

        if let Some(interval) = parsed(&lookup, "ZONECHART_CHART_DEFAULT_INTERVAL") {
            self.chart.default_interval = interval;
        }
        if let Some(width) = parsed(&lookup, "ZONECHART_CHART_FALLBACK_WIDTH") {
            self.chart.fallback_width = width;
        }
        if let Some(height) = parsed(&lookup, "ZONECHART_CHART_FALLBACK_HEIGHT") {
            self.chart.fallback_height = height;
        }
        if let Some(ms) = parsed(&lookup, "ZONECHART_CHART_POLL_INTERVAL_MS") {
            self.chart.poll_interval_ms = ms;
        }
        if let Some(attempts) = parsed(&lookup, "ZONECHART_CHART_MAX_POLL_ATTEMPTS") {
            self.chart.max_poll_attempts = attempts;
        }
        if let Some(days) = parsed(&lookup, "ZONECHART_CHART_LOAD_MORE_DAYS") {
            self.chart.load_more_days = days;
        }

        if let Some(level) = lookup("ZONECHART_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(file_path) = lookup("ZONECHART_LOG_FILE_PATH") {
            self.log.file_path = file_path;
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
        }

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {:#}, using defaults", err);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let url = self.feed.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("feed.base_url must be an http(s) URL, got {:?}", self.feed.base_url);
        }

        if self.feed.lookback_days == 0 {
            anyhow::bail!("feed.lookback_days must be greater than 0");
        }

        if self.chart.fallback_width == 0 || self.chart.fallback_height == 0 {
            anyhow::bail!("chart fallback size must be positive");
        }

        if self.chart.poll_interval_ms == 0 {
            anyhow::bail!("chart.poll_interval_ms must be greater than 0");
        }

        if self.chart.max_poll_attempts == 0 {
            anyhow::bail!("chart.max_poll_attempts must be greater than 0");
        }

        if self.chart.load_more_days == 0 {
            anyhow::bail!("chart.load_more_days must be greater than 0");
        }

        if self.log.level.parse::<tracing::Level>().is_err() {
            anyhow::bail!("Invalid log level: {}", self.log.level);
        }

        Ok(())
    }

    /// Log file path, if file logging is enabled
    pub fn log_file(&self) -> Option<&Path> {
        let path = self.log.file_path.trim();
        (!path.is_empty()).then(|| Path::new(path))
    }
}
