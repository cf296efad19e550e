//! Simple CLI output implementation
//!
//! Plain-text summaries printed around the rendered chart.

use colored::Colorize;
use std::fmt::Write;

use crate::market_data::{
    CandleSeries, DateInput, Granularity, LoadOutcome, SeriesKey, TimeKey, Unparseable,
};
use crate::metrics::FetchSnapshot;
use crate::session::ChartEvent;
use crate::zones::{PriceLineAnnotation, ZoneSummary};

/// Header line for a loaded series
pub fn format_series_summary(key: &SeriesKey, series: &CandleSeries) -> String {
    let mut out = format!("📊 {}", key.to_string().bold());
    match (series.first(), series.last()) {
        (Some(first), Some(last)) => {
            let _ = write!(out, "  {} → {}  ({} candles)", first.time, last.time, series.len());
            if let Some((low, high)) = series.price_bounds() {
                let _ = write!(out, "  range {:.2} – {:.2}", low, high);
            }
            if last.is_bullish() {
                let _ = write!(out, "  last {}", format!("{:.2}", last.close).green());
            } else {
                let _ = write!(out, "  last {}", format!("{:.2}", last.close).red());
            }
        }
        _ => out.push_str("  (no candles)"),
    }
    out
}

/// One line describing a load result
pub fn format_load_outcome(label: &str, outcome: &LoadOutcome) -> String {
    let mut out = format!(
        "   {} #{}: {} records, {} candles added",
        label, outcome.seq, outcome.received, outcome.added
    );
    if outcome.dropped.total() > 0 {
        let _ = write!(out, "  {}", outcome.dropped.to_string().yellow());
    }
    out
}

/// Zone legend: counts plus the drawn price lines
pub fn format_zone_legend(summary: &ZoneSummary, lines: &[PriceLineAnnotation]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "🧭 Zones: {} ({} RBR, {} DBR, {} nested)",
        summary.total, summary.rbr, summary.dbr, summary.nested
    );
    let _ = writeln!(
        out,
        "   Freshness: {} fresh, {} tested, {} breached",
        summary.fresh.to_string().green(),
        summary.tested.to_string().yellow(),
        summary.breached.to_string().red()
    );

    if lines.is_empty() {
        out.push_str("   (No price lines)\n");
        return out;
    }

    for line in lines {
        let label = if line.label_visible {
            line.label.normal()
        } else {
            line.label.dimmed()
        };
        let _ = writeln!(
            out,
            "   {:>10.2}  {:<13} {:?}/{}px  {}",
            line.price,
            line.color,
            line.style,
            line.width.pixels(),
            label
        );
    }
    out
}

/// Result of `zonechart normalize`
pub fn format_time_key(
    input: &DateInput,
    granularity: Granularity,
    result: &Result<TimeKey, Unparseable>,
) -> String {
    match result {
        Ok(key) => format!("{} ({}) → {}", input, granularity, key.to_string().bold()),
        Err(e) => format!("{} ({}) → {}", input, granularity, e.to_string().red()),
    }
}

pub fn format_metrics(snapshot: &FetchSnapshot) -> String {
    format!(
        "⏱  Fetches: {} initial, {} history, {} failed, {} stale | \
         latency p50 {}ms p95 {}ms | {} records, {}",
        snapshot.initial_loads,
        snapshot.history_loads,
        snapshot.failures,
        snapshot.stale_responses,
        snapshot.latency_p50,
        snapshot.latency_p95,
        snapshot.records_received,
        snapshot.dropped
    )
}

/// Session events worth showing to the user; `None` for routine ones
pub fn format_event(event: &ChartEvent) -> Option<String> {
    match event {
        ChartEvent::SurfaceTimeout(timeout) => {
            Some(format!("⚠️  {}", timeout).yellow().to_string())
        }
        ChartEvent::RecordsDropped { key, dropped } => {
            Some(format!("⚠️  {}: {}", key, dropped).yellow().to_string())
        }
        ChartEvent::AnnotationsReplaced { skipped, .. } if !skipped.is_empty() => Some(
            skipped
                .iter()
                .map(|e| format!("⚠️  {}", e).yellow().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        ChartEvent::Error { message } => Some(format!("❌ {}", message).red().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Candle, normalize};
    use crate::zones::{Freshness, Pattern, Zone, annotate, summarize};
    use chrono::NaiveDate;

    #[test]
    fn test_series_summary() {
        let day = |d| TimeKey::Day(NaiveDate::from_ymd_opt(2025, 6, d).unwrap());
        let (series, _) = CandleSeries::from_unsorted(vec![
            Candle::new(day(2), 10.0, 12.0, 9.0, 11.0),
            Candle::new(day(3), 11.0, 13.0, 10.0, 12.5),
        ]);
        let text = format_series_summary(&SeriesKey::new("abb", Granularity::Day1), &series);
        assert!(text.contains("2025-06-02 → 2025-06-03"));
        assert!(text.contains("(2 candles)"));
        assert!(text.contains("12.50"));
    }

    #[test]
    fn test_zone_legend() {
        let zones = vec![
            Zone::new("a", 100.5, 95.0, Pattern::Rbr).with_freshness(Freshness::Tested),
            Zone::new("b", 80.0, 78.0, Pattern::Dbr),
        ];
        let text = format_zone_legend(&summarize(&zones), &annotate(&zones));
        assert!(text.contains("Zones: 2 (1 RBR, 1 DBR, 0 nested)"));
        assert!(text.contains("RBR Proximal (F:1.5)"));
        assert!(text.contains("100.50"));
        assert!(format_zone_legend(&ZoneSummary::default(), &[]).contains("(No price lines)"));
    }

    #[test]
    fn test_time_key_output() {
        let input = DateInput::from(1719254400000_i64);
        let result = normalize(&input, Granularity::Day1);
        let text = format_time_key(&input, Granularity::Day1, &result);
        assert!(text.contains("2024-06-24"));
    }
}
