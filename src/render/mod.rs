//! Rasterize a [`ChartSpec`] to an RGB image.

mod font;

use std::collections::HashSet;
use std::path::Path;

use image::{Rgb, RgbImage};

use font::{ADVANCE, GLYPH_H, GLYPH_W, glyph, text_width};

/// Largest accepted canvas side, in pixels.
pub const MAX_SIDE: u32 = 4096;
/// Largest accepted number of points in one series.
pub const MAX_POINTS: usize = 10_000;
/// Largest accepted number of series in one chart.
pub const MAX_SERIES: usize = 16;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TEXT: Rgb<u8> = Rgb([40, 40, 40]);

pub const PALETTE: [Rgb<u8>; 8] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Scatter,
}

/// One data point. `x` is set when the key is numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub label: String,
    pub x: Option<f64>,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedSeries {
    pub label: String,
    pub series: Series,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub width: u32,
    pub height: u32,
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub series: Vec<NamedSeries>,
    pub legend: bool,
}

impl ChartSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            kind: ChartKind::default(),
            width: width.clamp(1, MAX_SIDE),
            height: height.clamp(1, MAX_SIDE),
            title: None,
            x_label: None,
            y_label: None,
            series: vec![],
            legend: false,
        }
    }

    /// Category labels across all series, in first-seen order.
    fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for s in &self.series {
            for p in &s.series.points {
                if seen.insert(p.label.as_str()) {
                    out.push(p.label.as_str());
                }
            }
        }
        out
    }

    fn numeric_x(&self) -> bool {
        let mut any = false;
        for p in self.series.iter().flat_map(|s| &s.series.points) {
            if p.x.is_none() {
                return false;
            }
            any = true;
        }
        any
    }
}

/// Render and write to `path`; the format follows the extension.
pub fn save(spec: &ChartSpec, path: &Path) -> Result<(), image::ImageError> {
    render(spec).save(path)
}

pub fn render(spec: &ChartSpec) -> RgbImage {
    let mut canvas = Canvas::new(spec.width, spec.height);

    let show_legend = spec.legend && !spec.series.is_empty();
    let legend_w = if show_legend {
        spec.series
            .iter()
            .map(|s| text_width(&s.label, 1))
            .max()
            .unwrap_or(0) as i64
            + 24
    } else {
        0
    };

    let mut top = 12;
    if spec.title.is_some() {
        top += 20;
    }
    if spec.y_label.is_some() {
        top += 12;
    }
    let mut bottom_margin = 24;
    if spec.x_label.is_some() {
        bottom_margin += 14;
    }
    let plot = Rect {
        left: 56,
        top,
        right: spec.width as i64 - 16 - legend_w,
        bottom: spec.height as i64 - bottom_margin,
    };

    // Too small for axes: plain background only.
    if plot.width() < 20 || plot.height() < 20 {
        return canvas.img;
    }

    if let Some(title) = &spec.title {
        let scale = if text_width(title, 2) as i64 <= spec.width as i64 - 8 { 2 } else { 1 };
        let x = (spec.width as i64 - text_width(title, scale) as i64) / 2;
        canvas.text(x.max(2), 6, title, scale, BLACK);
    }
    if let Some(label) = &spec.y_label {
        canvas.text(4, plot.top - 10, label, 1, TEXT);
    }
    if let Some(label) = &spec.x_label {
        let x = plot.left + (plot.width() - text_width(label, 1) as i64) / 2;
        canvas.text(x, plot.bottom + 20, label, 1, TEXT);
    }

    let (ymin, ymax) = y_range(spec);
    let map_y = |v: f64| -> i64 { plot.bottom.saturating_sub(offset(v, ymin, ymax, plot.height())) };

    for i in 0..=5 {
        let v = ymin + (ymax - ymin) * f64::from(i) / 5.0;
        let y = map_y(v);
        canvas.hline(plot.left, plot.right, y, GRID);
        let label = format_tick(v);
        let x = plot.left - 4 - text_width(&label, 1) as i64;
        canvas.text(x, y - GLYPH_H as i64 / 2, &label, 1, TEXT);
    }

    match spec.kind {
        ChartKind::Bar => draw_bars(&mut canvas, spec, &plot, &map_y),
        ChartKind::Line | ChartKind::Scatter => draw_points(&mut canvas, spec, &plot, &map_y),
    }

    canvas.vline(plot.left, plot.top, plot.bottom, BLACK);
    canvas.hline(plot.left, plot.right, map_y(0.0_f64.clamp(ymin, ymax)), BLACK);

    if show_legend {
        let lx = plot.right + 8;
        let mut ly = plot.top;
        for (i, s) in spec.series.iter().enumerate() {
            canvas.fill_rect(lx, ly, lx + 10, ly + 10, PALETTE[i % PALETTE.len()]);
            canvas.text(lx + 14, ly + 2, &s.label, 1, TEXT);
            ly += 14;
        }
    }

    canvas.img
}

fn y_range(spec: &ChartSpec) -> (f64, f64) {
    let ys = spec
        .series
        .iter()
        .flat_map(|s| s.series.points.iter().map(|p| p.y))
        .filter(|y| y.is_finite());
    let (mut lo, mut hi) = (0.0_f64, 0.0_f64);
    for y in ys {
        lo = lo.min(y);
        hi = hi.max(y);
    }
    if hi - lo < f64::EPSILON {
        hi = lo + 1.0;
    } else if hi > 0.0 {
        hi += (hi - lo) * 0.05;
    }
    (lo, hi)
}

/// Pixel offset of `v` within `lo..hi` spread over `span` pixels. Values far
/// outside the range are pinned just past the plot edges.
fn offset(v: f64, lo: f64, hi: f64, span: i64) -> i64 {
    let frac = (v - lo) / (hi - lo);
    if !frac.is_finite() {
        return 0;
    }
    (frac.clamp(-1.0, 2.0) * span as f64).round() as i64
}

fn format_tick(v: f64) -> String {
    let a = v.abs();
    if a >= 1e6 {
        format!("{:.1}M", v / 1e6)
    } else if a >= 1e3 {
        format!("{:.1}K", v / 1e3)
    } else if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.1}")
    }
}

/// Cut `label` to fit `width` pixels at scale 1.
fn fit_label(label: &str, width: f64) -> String {
    let max = ((width / f64::from(ADVANCE)).floor() as usize).max(1);
    label.chars().take(max).collect()
}

fn draw_bars(canvas: &mut Canvas, spec: &ChartSpec, plot: &Rect, map_y: &impl Fn(f64) -> i64) {
    let categories = spec.categories();
    if categories.is_empty() {
        return;
    }
    let group_w = plot.width() as f64 / categories.len() as f64;
    let bar_w = group_w * 0.8 / spec.series.len() as f64;
    let base = map_y(0.0);

    for (s, named) in spec.series.iter().enumerate() {
        let colour = PALETTE[s % PALETTE.len()];
        for p in named.series.points.iter().filter(|p| p.y.is_finite()) {
            let Some(c) = categories.iter().position(|l| *l == p.label) else {
                continue;
            };
            let x0 = plot.left as f64 + c as f64 * group_w + group_w * 0.1 + s as f64 * bar_w;
            let x0 = x0.round() as i64;
            let x1 = (x0 + bar_w.round() as i64).max(x0 + 1);
            let y = map_y(p.y);
            canvas.fill_rect(x0, y.min(base), x1, y.max(base) + 1, colour);
        }
    }

    for (c, label) in categories.iter().enumerate() {
        let label = fit_label(label, group_w);
        let center = plot.left as f64 + (c as f64 + 0.5) * group_w;
        let x = center.round() as i64 - text_width(&label, 1) as i64 / 2;
        canvas.text(x, plot.bottom + 6, &label, 1, TEXT);
    }
}

fn draw_points(canvas: &mut Canvas, spec: &ChartSpec, plot: &Rect, map_y: &impl Fn(f64) -> i64) {
    let numeric = spec.numeric_x();
    let categories = spec.categories();
    if categories.is_empty() {
        return;
    }

    let (xmin, xmax) = if numeric {
        let xs = spec
            .series
            .iter()
            .flat_map(|s| s.series.points.iter().filter_map(|p| p.x))
            .filter(|x| x.is_finite());
        let (lo, hi) = xs.fold((f64::MAX, f64::MIN), |(lo, hi), x| (lo.min(x), hi.max(x)));
        if hi - lo < f64::EPSILON { (lo - 1.0, hi + 1.0) } else { (lo, hi) }
    } else {
        (0.0, 0.0)
    };
    let slot_w = plot.width() as f64 / categories.len() as f64;
    let map_x = |p: &Point| -> i64 {
        match (numeric, p.x) {
            (true, Some(x)) => plot.left.saturating_add(offset(x, xmin, xmax, plot.width())),
            _ => {
                let c = categories.iter().position(|l| *l == p.label).unwrap_or(0);
                (plot.left as f64 + (c as f64 + 0.5) * slot_w).round() as i64
            }
        }
    };

    for (s, named) in spec.series.iter().enumerate() {
        let colour = PALETTE[s % PALETTE.len()];
        let pts: Vec<(i64, i64)> = named
            .series
            .points
            .iter()
            .filter(|p| p.y.is_finite())
            .map(|p| (map_x(p), map_y(p.y)))
            .collect();

        if spec.kind == ChartKind::Line {
            for pair in pts.windows(2) {
                canvas.line(pair[0], pair[1], colour);
                canvas.line((pair[0].0, pair[0].1 + 1), (pair[1].0, pair[1].1 + 1), colour);
            }
        }
        let r = if spec.kind == ChartKind::Scatter { 2 } else { 1 };
        for (x, y) in pts {
            canvas.fill_rect(x - r, y - r, x + r + 1, y + r + 1, colour);
        }
    }

    if numeric {
        for i in 0..=4 {
            let v = xmin + (xmax - xmin) * f64::from(i) / 4.0;
            let label = format_tick(v);
            let x = plot.left + (plot.width() as f64 * f64::from(i) / 4.0).round() as i64;
            canvas.text(x - text_width(&label, 1) as i64 / 2, plot.bottom + 6, &label, 1, TEXT);
        }
    } else {
        for (c, label) in categories.iter().enumerate() {
            let label = fit_label(label, slot_w);
            let center = (plot.left as f64 + (c as f64 + 0.5) * slot_w).round() as i64;
            canvas.text(center - text_width(&label, 1) as i64 / 2, plot.bottom + 6, &label, 1, TEXT);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
}

impl Rect {
    fn width(&self) -> i64 {
        self.right - self.left
    }

    fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

/// Bounds-checked drawing on top of an `RgbImage`.
struct Canvas {
    img: RgbImage,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, WHITE),
        }
    }

    fn put(&mut self, x: i64, y: i64, c: Rgb<u8>) {
        if x >= 0 && y >= 0 && x < i64::from(self.img.width()) && y < i64::from(self.img.height()) {
            self.img.put_pixel(x as u32, y as u32, c);
        }
    }

    /// Fill `[x0, x1) x [y0, y1)`.
    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, c: Rgb<u8>) {
        let (w, h) = (i64::from(self.img.width()), i64::from(self.img.height()));
        for y in y0.max(0)..y1.min(h) {
            for x in x0.max(0)..x1.min(w) {
                self.img.put_pixel(x as u32, y as u32, c);
            }
        }
    }

    fn hline(&mut self, x0: i64, x1: i64, y: i64, c: Rgb<u8>) {
        self.fill_rect(x0, y, x1 + 1, y + 1, c);
    }

    fn vline(&mut self, x: i64, y0: i64, y1: i64, c: Rgb<u8>) {
        self.fill_rect(x, y0, x + 1, y1 + 1, c);
    }

    /// Bresenham.
    fn line(&mut self, (x0, y0): (i64, i64), (x1, y1): (i64, i64), c: Rgb<u8>) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.put(x, y, c);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn text(&mut self, x: i64, y: i64, text: &str, scale: u32, c: Rgb<u8>) {
        let scale = i64::from(scale);
        let mut cx = x;
        for ch in text.chars() {
            for (row, bits) in glyph(ch).iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (0x10 >> col) != 0 {
                        let px = cx + i64::from(col) * scale;
                        let py = y + row as i64 * scale;
                        self.fill_rect(px, py, px + scale, py + scale, c);
                    }
                }
            }
            cx += i64::from(ADVANCE) * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(label: &str, points: &[(&str, f64)]) -> NamedSeries {
        NamedSeries {
            label: label.into(),
            series: Series {
                points: points
                    .iter()
                    .map(|(l, y)| Point {
                        label: (*l).into(),
                        x: None,
                        y: *y,
                    })
                    .collect(),
            },
        }
    }

    fn has_colour(img: &RgbImage, c: Rgb<u8>) -> bool {
        img.pixels().any(|p| *p == c)
    }

    #[test]
    fn placeholder_is_plain_background() {
        let img = render(&ChartSpec::new(1, 1));
        assert_eq!(img.dimensions(), (1, 1));
        assert_eq!(*img.get_pixel(0, 0), WHITE);
    }

    #[test]
    fn size_is_clamped() {
        let spec = ChartSpec::new(0, 100_000);
        assert_eq!((spec.width, spec.height), (1, MAX_SIDE));
    }

    #[test]
    fn grouped_bars_use_one_colour_per_series() {
        let mut spec = ChartSpec::new(400, 300);
        spec.title = Some("Q1 sales".into());
        spec.legend = true;
        spec.series = vec![
            series("2024", &[("Latte", 120.0), ("Mocha", 80.0)]),
            series("2025", &[("Latte", 150.0), ("Cocoa", 30.0)]),
        ];
        let img = render(&spec);
        assert_eq!(img.dimensions(), (400, 300));
        assert!(has_colour(&img, PALETTE[0]));
        assert!(has_colour(&img, PALETTE[1]));
        assert!(!has_colour(&img, PALETTE[2]));
        assert_eq!(spec.categories(), vec!["Latte", "Mocha", "Cocoa"]);
    }

    #[test]
    fn line_chart_with_numeric_x() {
        let mut spec = ChartSpec::new(300, 200);
        spec.kind = ChartKind::Line;
        spec.series = vec![NamedSeries {
            label: "monthly".into(),
            series: Series {
                points: (1..=6)
                    .map(|m| Point {
                        label: m.to_string(),
                        x: Some(f64::from(m)),
                        y: f64::from(m * m),
                    })
                    .collect(),
            },
        }];
        assert!(spec.numeric_x());
        let img = render(&spec);
        assert!(has_colour(&img, PALETTE[0]));
    }

    #[test]
    fn negative_values_extend_range() {
        let mut spec = ChartSpec::new(300, 200);
        spec.series = vec![series("delta", &[("a", -5.0), ("b", 10.0)])];
        let (lo, hi) = y_range(&spec);
        assert_eq!(lo, -5.0);
        assert!(hi > 10.0);
        assert!(has_colour(&render(&spec), PALETTE[0]));
    }

    #[test]
    fn empty_chart_still_renders_axes() {
        let img = render(&ChartSpec::new(200, 150));
        assert!(has_colour(&img, BLACK));
    }

    #[test]
    fn non_finite_and_extreme_values_do_not_overflow() {
        for kind in [ChartKind::Bar, ChartKind::Line, ChartKind::Scatter] {
            let mut spec = ChartSpec::new(200, 150);
            spec.kind = kind;
            spec.series = vec![series(
                "s",
                &[
                    ("a", f64::NEG_INFINITY),
                    ("b", f64::NAN),
                    ("c", -1.7e308),
                    ("d", 1.7e308),
                    ("e", 5.0),
                ],
            )];
            assert_eq!(render(&spec).dimensions(), (200, 150));
        }
    }

    #[test]
    fn offset_pins_out_of_range_values() {
        assert_eq!(offset(5.0, 0.0, 10.0, 100), 50);
        assert_eq!(offset(1e300, 0.0, 10.0, 100), 200);
        assert_eq!(offset(-1e300, 0.0, 10.0, 100), -100);
        assert_eq!(offset(f64::INFINITY, 0.0, 10.0, 100), 0);
        assert_eq!(offset(1.0, f64::NEG_INFINITY, 10.0, 100), 0);
    }

    #[test]
    fn tick_formatting() {
        assert_eq!(format_tick(0.0), "0");
        assert_eq!(format_tick(12.5), "12.5");
        assert_eq!(format_tick(2500.0), "2.5K");
        assert_eq!(format_tick(3_000_000.0), "3.0M");
    }

    #[test]
    fn save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        save(&ChartSpec::new(64, 48), &path).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (64, 48));
    }
}
