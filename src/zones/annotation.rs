//! Price-line annotations derived from zones
//!
//! `annotate` is pure: the same zones always give the same lines in the same
//! order. Callers replace their whole line set with the result on every
//! change instead of appending to it.

use serde::Serialize;
use tracing::{debug, warn};

use super::types::{Pattern, Zone};

/// Stroke style of a price line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
    SparseDotted,
}

/// Stroke width of a price line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LineWidth {
    Thin,
    Thick,
}

impl LineWidth {
    pub fn pixels(&self) -> u8 {
        match self {
            LineWidth::Thin => 1,
            LineWidth::Thick => 2,
        }
    }
}

/// A horizontal line drawn across the price axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLineAnnotation {
    pub price: f64,
    pub color: String,
    pub style: LineStyle,
    pub width: LineWidth,
    pub label: String,
    pub label_visible: bool,
}

/// Colors used for the two lines of a top-level zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorFamily {
    pub proximal: &'static str,
    pub distal: &'static str,
}

pub const RBR_FAMILY: ColorFamily = ColorFamily {
    proximal: "#26a69a",
    distal: "#00796b",
};

pub const DBR_FAMILY: ColorFamily = ColorFamily {
    proximal: "#ef5350",
    distal: "#c62828",
};

/// Base colors for nested lower-timeframe zones.
pub const NESTED_PALETTE: [(u8, u8, u8); 5] = [
    (0x00, 0x79, 0x6b),
    (0x19, 0x76, 0xd2),
    (0x7b, 0x1f, 0xa2),
    (0xf5, 0x7c, 0x00),
    (0xc6, 0x28, 0x28),
];

/// Per-lap channel offsets once the palette has wrapped around.
const LAP_OFFSET: (usize, usize, usize) = (30, 20, 25);

const NESTED_ALPHA: &str = "0.7";

/// Anything that is not a rally-base-rally uses the DBR family.
pub fn color_family(pattern: &Pattern) -> ColorFamily {
    match pattern {
        Pattern::Rbr => RBR_FAMILY,
        _ => DBR_FAMILY,
    }
}

/// Color of a nested zone line.
///
/// `base_index` is the nested zone's index within its parent and picks the
/// palette slot; every full pass over the palette shifts the channels by a
/// fixed offset so zones sharing a slot still differ. `depth` is the shade
/// level, 0 for the proximal line and 1 for the darker distal line.
pub fn palette_color(base_index: usize, depth: usize) -> String {
    let (r, g, b) = NESTED_PALETTE[base_index % NESTED_PALETTE.len()];
    let lap = base_index / NESTED_PALETTE.len();

    let shift = |channel: u8, offset: usize| -> usize {
        let step = (lap % 256) * offset % 256;
        let shifted = (usize::from(channel) + step) % 256;
        // Each shade level darkens by a quarter.
        (0..depth).fold(shifted, |c, _| c * 3 / 4)
    };

    format!(
        "rgba({}, {}, {}, {})",
        shift(r, LAP_OFFSET.0),
        shift(g, LAP_OFFSET.1),
        shift(b, LAP_OFFSET.2),
        NESTED_ALPHA
    )
}

/// A zone that could not be drawn.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("zone {zone_id} skipped: {reason}")]
pub struct ZoneRenderError {
    pub zone_id: String,
    pub parent_id: Option<String>,
    pub reason: String,
}

/// Lines for one rendering pass plus the zones that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet {
    pub lines: Vec<PriceLineAnnotation>,
    pub skipped: Vec<ZoneRenderError>,
}

/// Price lines for `zones`, skipping malformed entries.
pub fn annotate(zones: &[Zone]) -> Vec<PriceLineAnnotation> {
    annotate_with_report(zones).lines
}

/// Like [`annotate`], also reporting which zones were skipped.
pub fn annotate_with_report(zones: &[Zone]) -> AnnotationSet {
    let mut set = AnnotationSet::default();

    for zone in zones {
        match top_level_lines(zone) {
            Ok(lines) => set.lines.extend(lines),
            Err(e) => {
                warn!("{}", e);
                set.skipped.push(e);
            }
        }

        for (index, lower) in zone.coinciding_lower_zones.iter().enumerate() {
            if !lower.coinciding_lower_zones.is_empty() {
                debug!(
                    "Ignoring {} zones nested below {}",
                    lower.coinciding_lower_zones.len(),
                    lower.zone_id
                );
            }

            match nested_lines(zone, lower, index) {
                Ok(lines) => set.lines.extend(lines),
                Err(e) => {
                    warn!("{}", e);
                    set.skipped.push(e);
                }
            }
        }
    }

    set
}

fn top_level_lines(zone: &Zone) -> Result<[PriceLineAnnotation; 2], ZoneRenderError> {
    check_lines(zone, None)?;
    let family = color_family(&zone.pattern);
    let pattern = zone.pattern.label();

    Ok([
        PriceLineAnnotation {
            price: zone.proximal_line,
            color: family.proximal.to_string(),
            style: LineStyle::Solid,
            width: LineWidth::Thick,
            label: format!("{} Proximal (F:{})", pattern, zone.freshness),
            label_visible: true,
        },
        PriceLineAnnotation {
            price: zone.distal_line,
            color: family.distal.to_string(),
            style: LineStyle::Dashed,
            width: LineWidth::Thin,
            label: format!("{} Distal", pattern),
            label_visible: true,
        },
    ])
}

fn nested_lines(
    parent: &Zone,
    lower: &Zone,
    index: usize,
) -> Result<[PriceLineAnnotation; 2], ZoneRenderError> {
    check_lines(lower, Some(parent))?;
    let pattern = lower.pattern.label();

    Ok([
        PriceLineAnnotation {
            price: lower.proximal_line,
            color: palette_color(index, 0),
            style: LineStyle::Dotted,
            width: LineWidth::Thin,
            label: format!("LTF {} P ({:.2})", pattern, lower.proximal_line),
            label_visible: false,
        },
        PriceLineAnnotation {
            price: lower.distal_line,
            color: palette_color(index, 1),
            style: LineStyle::SparseDotted,
            width: LineWidth::Thin,
            label: format!("LTF {} D ({:.2})", pattern, lower.distal_line),
            label_visible: false,
        },
    ])
}

fn check_lines(zone: &Zone, parent: Option<&Zone>) -> Result<(), ZoneRenderError> {
    let bad = |name: &str, value: f64| ZoneRenderError {
        zone_id: zone.zone_id.clone(),
        parent_id: parent.map(|p| p.zone_id.clone()),
        reason: format!("{} line is not a number ({})", name, value),
    };

    if !zone.proximal_line.is_finite() {
        return Err(bad("proximal", zone.proximal_line));
    }
    if !zone.distal_line.is_finite() {
        return Err(bad("distal", zone.distal_line));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::Freshness;

    fn rbr_with_nested() -> Zone {
        Zone::new("top", 100.5, 95.0, Pattern::Rbr)
            .with_lower_zones(vec![Zone::new("low-0", 98.0, 96.5, Pattern::Rbr)])
    }

    #[test]
    fn test_empty_input() {
        assert!(annotate(&[]).is_empty());
    }

    #[test]
    fn test_zone_with_one_nested_zone() {
        let lines = annotate(&[rbr_with_nested()]);
        assert_eq!(lines.len(), 4);

        let shapes: Vec<_> = lines
            .iter()
            .map(|l| (l.style, l.width.pixels(), l.label_visible))
            .collect();
        assert_eq!(
            shapes,
            vec![
                (LineStyle::Solid, 2, true),
                (LineStyle::Dashed, 1, true),
                (LineStyle::Dotted, 1, false),
                (LineStyle::SparseDotted, 1, false),
            ]
        );
        assert_eq!(lines[0].price, 100.5);
        assert_eq!(lines[1].price, 95.0);
        assert_eq!(lines[2].price, 98.0);
        assert_eq!(lines[3].price, 96.5);
        assert_eq!(lines[0].color, RBR_FAMILY.proximal);
        assert_eq!(lines[0].label, "RBR Proximal (F:3)");
        assert_eq!(lines[2].label, "LTF RBR P (98.00)");
    }

    #[test]
    fn test_idempotent() {
        let zones = vec![
            rbr_with_nested(),
            Zone::new("dbr", 80.0, 78.0, Pattern::Dbr).with_freshness(Freshness::Tested),
        ];
        assert_eq!(annotate(&zones), annotate(&zones));
    }

    #[test]
    fn test_pattern_color_families() {
        let lines = annotate(&[Zone::new("d", 50.0, 48.0, Pattern::Dbr)]);
        assert_eq!(lines[0].color, DBR_FAMILY.proximal);
        assert_eq!(lines[1].color, DBR_FAMILY.distal);
        assert_eq!(lines[0].label, "DBR Proximal (F:3)");
    }

    #[test]
    fn test_bad_zone_does_not_block_others() {
        let zones = vec![
            Zone::new("bad", f64::NAN, 95.0, Pattern::Rbr),
            Zone::new("good", 120.0, 118.0, Pattern::Dbr),
        ];

        let set = annotate_with_report(&zones);
        assert_eq!(set.lines.len(), 2);
        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].zone_id, "bad");
        assert_eq!(set.lines[0].price, 120.0);
    }

    #[test]
    fn test_bad_nested_zone_is_skipped_alone() {
        let zone = Zone::new("top", 100.0, 90.0, Pattern::Rbr).with_lower_zones(vec![
            Zone::new("low-0", 97.0, f64::NAN, Pattern::Rbr),
            Zone::new("low-1", 95.0, 93.0, Pattern::Rbr),
        ]);

        let set = annotate_with_report(&[zone]);
        assert_eq!(set.lines.len(), 4);
        assert_eq!(set.skipped[0].parent_id.as_deref(), Some("top"));
        assert_eq!(set.lines[2].color, palette_color(1, 0));
    }

    #[test]
    fn test_second_level_nesting_is_not_drawn() {
        let deep = Zone::new("deep", 10.0, 9.0, Pattern::Rbr);
        let zone = Zone::new("top", 100.0, 90.0, Pattern::Rbr).with_lower_zones(vec![
            Zone::new("low-0", 97.0, 96.0, Pattern::Rbr).with_lower_zones(vec![deep]),
        ]);

        let lines = annotate(&[zone]);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.price != 10.0));
    }

    #[test]
    fn test_palette_wraps_with_offset() {
        assert_eq!(palette_color(0, 0), "rgba(0, 121, 107, 0.7)");
        assert_eq!(palette_color(5, 0), "rgba(30, 141, 132, 0.7)");
        assert_ne!(palette_color(0, 0), palette_color(5, 0));
        assert_ne!(palette_color(3, 0), palette_color(3, 1));
        assert_eq!(palette_color(7, 1), palette_color(7, 1));
    }

    #[test]
    fn test_palette_handles_huge_indices() {
        // usize::MAX sits in slot 0 on a lap congruent to 51 (mod 256), like index 255.
        assert_eq!(palette_color(usize::MAX, 0), palette_color(255, 0));
        assert!(palette_color(usize::MAX, 1).starts_with("rgba("));
    }
}
