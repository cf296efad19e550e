use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use tracing::debug;

use super::{ChartEngine, Dimensions, Surface};
use crate::market_data::{Candle, CandleSeries};
use crate::zones::{LineStyle, PriceLineAnnotation};

/// The terminal as a chart surface, measured in character cells.
#[derive(Debug, Clone, Default)]
pub struct TerminalSurface {
    requested: Option<Dimensions>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit size instead of asking the terminal.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            requested: Some(Dimensions::new(width, height)),
        }
    }
}

impl Surface for TerminalSurface {
    fn rendered_box(&self) -> Option<Dimensions> {
        self.requested
    }

    fn content_box(&self) -> Option<Dimensions> {
        crossterm::terminal::size()
            .ok()
            .map(|(cols, rows)| Dimensions::new(u32::from(cols), u32::from(rows)))
    }

    fn bounding_rect(&self) -> Option<Dimensions> {
        let read = |name: &str| std::env::var(name).ok()?.trim().parse::<u32>().ok();
        Some(Dimensions::new(read("COLUMNS")?, read("LINES")?))
    }
}

/// Candlestick renderer drawing into a ratatui buffer.
#[derive(Debug, Clone)]
pub struct TerminalEngine {
    size: Dimensions,
    series: CandleSeries,
    lines: Vec<PriceLineAnnotation>,
    visible: Option<usize>,
    released: bool,
}

impl TerminalEngine {
    pub fn new(size: Dimensions) -> Self {
        Self {
            size,
            series: CandleSeries::default(),
            lines: Vec::new(),
            visible: None,
            released: false,
        }
    }

    pub fn size(&self) -> Dimensions {
        self.size
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    pub fn price_lines(&self) -> &[PriceLineAnnotation] {
        &self.lines
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Restrict the time axis to the newest `count` candles.
    pub fn show_last(&mut self, count: usize) {
        self.visible = Some(count.max(1));
    }

    fn visible_candles(&self) -> &[Candle] {
        let all = self.series.as_slice();
        match self.visible {
            Some(count) if count < all.len() => &all[all.len() - count..],
            _ => all,
        }
    }

    /// Draw the current chart.
    pub fn render(&self) -> Buffer {
        let area = Rect::new(
            0,
            0,
            self.size.width.min(u32::from(u16::MAX)) as u16,
            self.size.height.min(u32::from(u16::MAX)) as u16,
        );
        let mut buffer = Buffer::empty(area);

        let candles = self.visible_candles();
        if self.released || candles.is_empty() || area.width < 12 || area.height < 4 {
            let message = if self.released { "Chart released" } else { "No candle data" };
            buffer.set_string(area.x, area.y, message, Style::default().fg(Color::Gray));
            return buffer;
        }

        let horizontal = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(8), Constraint::Min(2)])
            .split(area);
        let price_axis_area = horizontal[0];
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(2), Constraint::Length(1)])
            .split(horizontal[1]);
        let chart_area = vertical[0];
        let time_axis_area = vertical[1];

        let (min_price, max_price) = self.price_range(candles);
        let span = (max_price - min_price).max(f64::EPSILON);

        for line in &self.lines {
            draw_price_line(&mut buffer, chart_area, line, min_price, span);
        }

        let columns = bucket_candles(candles, usize::from(chart_area.width));
        draw_candlesticks(&mut buffer, chart_area, &columns, min_price, span);

        for line in self.lines.iter().filter(|l| l.label_visible) {
            draw_line_label(&mut buffer, chart_area, line, min_price, span);
        }

        let label_style = Style::default().fg(Color::Gray);
        buffer.set_string(
            price_axis_area.x,
            price_axis_area.y,
            format_price_label(max_price, price_axis_area.width),
            label_style,
        );
        if price_axis_area.height > 2 {
            buffer.set_string(
                price_axis_area.x,
                price_axis_area.y + price_axis_area.height / 2,
                format_price_label((min_price + max_price) / 2.0, price_axis_area.width),
                label_style,
            );
        }
        buffer.set_string(
            price_axis_area.x,
            price_axis_area.y + price_axis_area.height.saturating_sub(1),
            format_price_label(min_price, price_axis_area.width),
            label_style,
        );

        if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
            let text = format!("{} → {} ({} candles)", first.time, last.time, candles.len());
            buffer.set_stringn(
                time_axis_area.x,
                time_axis_area.y,
                text,
                usize::from(time_axis_area.width),
                label_style,
            );
        }

        buffer
    }

    /// Plain-text rendering, one line per row.
    pub fn render_to_string(&self) -> String {
        let buffer = self.render();
        let area = buffer.area;
        let mut out = String::new();
        for y in area.top()..area.bottom() {
            let row: String = (area.left()..area.right())
                .map(|x| buffer.get(x, y).symbol())
                .collect();
            out.push_str(row.trim_end());
            out.push('\n');
        }
        out
    }

    /// Price range covering the visible candles and every price line, padded by 5%.
    fn price_range(&self, candles: &[Candle]) -> (f64, f64) {
        let prices = candles
            .iter()
            .flat_map(|c| [c.low, c.high])
            .chain(self.lines.iter().map(|l| l.price));
        let (mut min_price, mut max_price) = prices
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p), hi.max(p))
            });

        if (max_price - min_price).abs() < f64::EPSILON {
            max_price = min_price + 1.0;
        } else {
            let padding = (max_price - min_price) * 0.05;
            min_price -= padding;
            max_price += padding;
        }
        (min_price, max_price)
    }
}

impl ChartEngine for TerminalEngine {
    fn resize(&mut self, size: Dimensions) {
        self.size = size;
    }

    fn set_candles(&mut self, series: &CandleSeries) {
        self.series = series.clone();
    }

    fn set_price_lines(&mut self, lines: &[PriceLineAnnotation]) {
        self.lines = lines.to_vec();
    }

    fn fit_content(&mut self) {
        self.visible = None;
    }

    fn release(&mut self) {
        debug!("Releasing terminal engine ({} candles)", self.series.len());
        self.series = CandleSeries::default();
        self.lines.clear();
        self.released = true;
    }
}

/// One drawn column, possibly aggregating several candles.
#[derive(Debug, Clone, Copy)]
struct Column {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

fn bucket_candles(candles: &[Candle], width: usize) -> Vec<Column> {
    // Two cells per candle body when there is room.
    let slots = (width / 2).max(1);
    let per_column = candles.len().div_ceil(slots).max(1);

    candles
        .chunks(per_column)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            Some(Column {
                open: first.open,
                close: last.close,
                high: chunk.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
                low: chunk.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
            })
        })
        .collect()
}

fn draw_candlesticks(
    buffer: &mut Buffer,
    area: Rect,
    columns: &[Column],
    min_price: f64,
    span: f64,
) {
    if area.width < 2 || area.height < 2 {
        return;
    }

    let denom = columns.len().saturating_sub(1).max(1) as f64;
    let width_f = f64::from(area.width.saturating_sub(2));

    for (idx, column) in columns.iter().enumerate() {
        let rel_x = if columns.len() == 1 { 0.0 } else { idx as f64 / denom };
        let x = (area.x + (rel_x * width_f).round() as u16).min(area.right() - 1);

        let style = if column.close >= column.open {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Red)
        };

        let (y_high, y_low) = ordered(
            price_to_y(column.high, min_price, span, area),
            price_to_y(column.low, min_price, span, area),
        );
        for y in y_high..=y_low {
            if within(area, x, y) {
                buffer.get_mut(x, y).set_style(style).set_symbol("│");
            }
        }

        let (y_top, y_bottom) = ordered(
            price_to_y(column.open, min_price, span, area),
            price_to_y(column.close, min_price, span, area),
        );
        let symbol = if y_top == y_bottom { "─" } else { "█" };
        for y in y_top..=y_bottom {
            for cx in [x, x.saturating_add(1)] {
                if within(area, cx, y) {
                    buffer.get_mut(cx, y).set_style(style).set_symbol(symbol);
                }
            }
        }
    }
}

fn draw_price_line(
    buffer: &mut Buffer,
    area: Rect,
    line: &PriceLineAnnotation,
    min_price: f64,
    span: f64,
) {
    let y = price_to_y(line.price, min_price, span, area);
    let style = Style::default().fg(parse_color(&line.color).unwrap_or(Color::Gray));
    let glyph = line_glyph(line);

    for x in area.left()..area.right() {
        let sparse_gap = line.style == LineStyle::SparseDotted && (x - area.x) % 3 != 0;
        if !sparse_gap {
            buffer.get_mut(x, y).set_style(style).set_symbol(glyph);
        }
    }
}

/// Labels sit at the right edge, on top of candles.
fn draw_line_label(
    buffer: &mut Buffer,
    area: Rect,
    line: &PriceLineAnnotation,
    min_price: f64,
    span: f64,
) {
    let y = price_to_y(line.price, min_price, span, area);
    let style = Style::default().fg(parse_color(&line.color).unwrap_or(Color::Gray));
    let len = line.label.chars().count().min(usize::from(area.width));
    let x = area.right() - len as u16;
    buffer.set_stringn(x, y, &line.label, len, style);
}

fn line_glyph(line: &PriceLineAnnotation) -> &'static str {
    match (line.style, line.width.pixels()) {
        (LineStyle::Solid, 2) => "━",
        (LineStyle::Solid, _) => "─",
        (LineStyle::Dashed, _) => "╌",
        (LineStyle::Dotted, _) => "┄",
        (LineStyle::SparseDotted, _) => "·",
    }
}

/// Parse `#rrggbb` or `rgba(r, g, b, a)`; alpha is ignored.
fn parse_color(text: &str) -> Option<Color> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?));
    }

    let inner = text
        .strip_prefix("rgba(")
        .or_else(|| text.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u8>().ok());
    Some(Color::Rgb(parts.next()??, parts.next()??, parts.next()??))
}

fn ordered(a: u16, b: u16) -> (u16, u16) {
    if a <= b { (a, b) } else { (b, a) }
}

fn price_to_y(price: f64, min_price: f64, span: f64, area: Rect) -> u16 {
    if area.height <= 1 {
        return area.y;
    }
    let normalized = ((price - min_price) / span).clamp(0.0, 1.0);
    let offset = ((1.0 - normalized) * f64::from(area.height - 1)).round() as u16;
    area.y + offset.min(area.height - 1)
}

fn within(area: Rect, x: u16, y: u16) -> bool {
    x >= area.x && x < area.right() && y >= area.y && y < area.bottom()
}

fn format_price_label(value: f64, width: u16) -> String {
    let mut label = format!("{:.2}", value);
    let max_len = usize::from(width);
    if max_len > 0 && label.len() > max_len {
        label.truncate(max_len);
    }
    label
}
