//! Zone overlay module
//!
//! Zones come from the external zone-detection service; this module turns
//! them into price-line annotations for the chart.

pub mod annotation;
pub mod types;

pub use annotation::{
    AnnotationSet, ColorFamily, LineStyle, LineWidth, PriceLineAnnotation, ZoneRenderError,
    annotate, annotate_with_report, color_family, palette_color,
};
pub use types::{Freshness, Pattern, Zone, zones_from_values};

/// Legend counts for a zone list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneSummary {
    pub total: usize,
    pub rbr: usize,
    pub dbr: usize,
    pub fresh: usize,
    pub tested: usize,
    pub breached: usize,
    pub nested: usize,
}

pub fn summarize(zones: &[Zone]) -> ZoneSummary {
    zones.iter().fold(ZoneSummary::default(), |mut summary, zone| {
        summary.total += 1;
        summary.nested += zone.coinciding_lower_zones.len();
        match zone.pattern {
            Pattern::Rbr => summary.rbr += 1,
            Pattern::Dbr => summary.dbr += 1,
            Pattern::Other(_) => {}
        }
        match zone.freshness_class() {
            Some(Freshness::Fresh) => summary.fresh += 1,
            Some(Freshness::Tested) => summary.tested += 1,
            Some(Freshness::Breached) => summary.breached += 1,
            None => {}
        }
        summary
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize() {
        let zones = vec![
            Zone::new("a", 10.0, 9.0, Pattern::Rbr)
                .with_lower_zones(vec![Zone::new("a1", 9.8, 9.5, Pattern::Rbr)]),
            Zone::new("b", 20.0, 19.0, Pattern::Dbr).with_freshness(Freshness::Breached),
        ];

        let summary = summarize(&zones);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.rbr, 1);
        assert_eq!(summary.dbr, 1);
        assert_eq!(summary.fresh, 1);
        assert_eq!(summary.breached, 1);
        assert_eq!(summary.nested, 1);
    }
}
