use anyhow::{Context, Result};
use colored::Colorize;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use zonechart::cli::{ChartArgs, Cli, Commands, ConfigAction};
use zonechart::config::Config;
use zonechart::feed::{DateRange, MockFeed, OhlcFeed, OhlcRestClient, ZoneSource};
use zonechart::market_data::{DateInput, Granularity, normalize};
use zonechart::session::{ChartSession, SessionSettings};
use zonechart::surface::{TerminalEngine, TerminalSurface};
use zonechart::zones::{Zone, summarize, zones_from_values};
use zonechart::{AppResult, init_logging, ui};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    let mut config = Config::load_or_default(&cli.config_file);
    if let Some(level) = cli.effective_log_level() {
        config.log.level = level;
    }

    let _log_guard = init_logging(&config.log.level, config.log_file())?;

    info!("zonechart starting");
    tracing::debug!("CLI arguments: {:?}", cli);

    match &cli.command {
        Commands::Chart(args) => run_chart(args, &config).await?,
        Commands::Normalize { value, interval } => run_normalize(value, *interval),
        Commands::Config { action } => run_config(action.as_ref(), &config, &cli.config_file)?,
    }

    Ok(())
}

async fn run_chart(args: &ChartArgs, config: &Config) -> Result<()> {
    let granularity = args.interval.unwrap_or(config.chart.default_interval);
    let end = args.to.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let range = match args.from {
        Some(start) if start > end => anyhow::bail!("--from {} is after --to {}", start, end),
        Some(start) => DateRange::new(start, end),
        None => DateRange::ending_at(end, config.feed.lookback_days),
    };

    let surface = match (args.width, args.height) {
        (None, None) => TerminalSurface::new(),
        (width, height) => TerminalSurface::with_size(width.unwrap_or(100), height.unwrap_or(30)),
    };

    let (feed, zone_source): (Arc<dyn OhlcFeed>, Arc<dyn ZoneSource>) = if args.offline {
        // Cover every history page the run may ask for.
        let pages = args.load_more.saturating_mul(config.chart.load_more_days);
        let covered = DateRange::new(range.preceding(pages.max(1)).start, range.end);
        let mock = Arc::new(MockFeed::synthetic(covered, granularity));
        let feed: Arc<dyn OhlcFeed> = mock.clone();
        let zones: Arc<dyn ZoneSource> = mock;
        (feed, zones)
    } else {
        let client = Arc::new(OhlcRestClient::new(config.feed.base_url.clone()));
        let feed: Arc<dyn OhlcFeed> = client.clone();
        let zones: Arc<dyn ZoneSource> = client;
        (feed, zones)
    };

    let settings = SessionSettings::from_config(config);
    let mut session =
        ChartSession::new(feed, &args.ticker, granularity, settings, TerminalEngine::new)
            .with_range(range);

    match &args.zones {
        Some(path) => {
            let zones = load_zones(path)?;
            session.set_zones(zones);
        }
        None => {
            if let Err(e) = session.refresh_zones(zone_source.as_ref()).await {
                warn!("Continuing without zones: {}", e);
            }
        }
    }

    let initial = session.start(&surface).await;
    print_events(&mut session);
    let initial = initial.with_context(|| format!("Failed to load {}", session.key()))?;

    let mut outcomes = vec![("initial load", initial)];
    for page in 1..=args.load_more {
        match session.load_more().await {
            Ok(outcome) => outcomes.push(("load more", outcome)),
            Err(e) => {
                warn!("History page {} failed: {}", page, e);
                break;
            }
        }
        print_events(&mut session);
    }

    if let Some(series) = session.series().await {
        println!("{}", ui::cli::format_series_summary(&session.key(), &series));
    }
    for (label, outcome) in &outcomes {
        println!("{}", ui::cli::format_load_outcome(label, outcome));
    }
    if let Some(engine) = session.engine() {
        print!("{}", engine.render_to_string());
    }
    print!(
        "{}",
        ui::cli::format_zone_legend(&summarize(session.zones()), session.annotations())
    );
    println!("{}", ui::cli::format_metrics(&session.metrics().snapshot()));

    session.dispose().await;
    Ok(())
}

fn print_events<F: OhlcFeed>(session: &mut ChartSession<F, TerminalEngine>) {
    for event in session.drain_events() {
        if let Some(line) = ui::cli::format_event(&event) {
            eprintln!("{}", line);
        }
    }
}

/// Zones as a bare list or as a page from `/zones/all-zones`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ZoneFile {
    List(Vec<serde_json::Value>),
    Page { data: Vec<serde_json::Value> },
}

fn load_zones(path: &Path) -> Result<Vec<Zone>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read zones file: {}", path.display()))?;
    let file: ZoneFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse zones file: {}", path.display()))?;

    let (zones, skipped) = match file {
        ZoneFile::List(values) | ZoneFile::Page { data: values } => zones_from_values(values),
    };
    if skipped > 0 {
        warn!("Skipped {} unreadable zones in {}", skipped, path.display());
    }
    Ok(zones)
}

fn run_normalize(value: &str, granularity: Granularity) {
    let input = DateInput::from(value);
    let result = normalize(&input, granularity);
    println!("{}", ui::cli::format_time_key(&input, granularity, &result));
}

fn run_config(action: Option<&ConfigAction>, config: &Config, path: &str) -> Result<()> {
    match action {
        Some(ConfigAction::Show) => {
            println!("{}", format!("Configuration ({})", path).bold());
            let rendered =
                toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigAction::Reset) => {
            Config::default().save_to_file(path)?;
            println!("{} Default configuration written to {}", "✓".green(), path);
        }
        None => {
            println!("Configuration management commands:");
            println!("  zonechart config show    - Show current configuration");
            println!("  zonechart config reset   - Reset to default configuration");
        }
    }
    Ok(())
}
