//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for zonechart.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::market_data::Granularity;

#[derive(Parser, Debug, Clone)]
#[command(name = "zonechart")]
#[command(about = "Demand zone chart engine")]
#[command(
    long_about = "Loads OHLC candles, overlays demand/supply zones and renders the chart in the terminal"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load a chart, overlay zones and print it
    Chart(ChartArgs),

    /// Print the canonical time key for a date value
    Normalize {
        /// ISO-8601 date, epoch seconds or epoch milliseconds
        value: String,

        /// Candle interval (1m, 5m, 15m, 30m, 1h, 1d, 1wk, 1mo, 3mo)
        #[arg(short, long, default_value = "1d")]
        interval: Granularity,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChartArgs {
    /// Ticker symbol, e.g. RELIANCE or RELIANCE.NS
    pub ticker: String,

    /// Candle interval; defaults to the configured interval
    #[arg(short, long)]
    pub interval: Option<Granularity>,

    /// JSON file with zones to overlay instead of asking the zone service
    #[arg(long)]
    pub zones: Option<PathBuf>,

    /// First day of the initial range (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day of the initial range (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Number of "load more" history pages to fetch after the initial load
    #[arg(long, default_value_t = 0)]
    pub load_more: u32,

    /// Use the built-in synthetic feed instead of the backend
    #[arg(long)]
    pub offline: bool,

    /// Chart width in columns; defaults to the terminal size
    #[arg(long)]
    pub width: Option<u32>,

    /// Chart height in rows
    #[arg(long)]
    pub height: Option<u32>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration to the config file
    Reset,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level from the flags, if any
    pub fn effective_log_level(&self) -> Option<String> {
        if self.verbose {
            Some("debug".to_string())
        } else {
            self.log_level.clone()
        }
    }
}
