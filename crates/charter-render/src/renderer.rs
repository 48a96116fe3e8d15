//! Candlestick, overlay and volume profile rendering.

use std::ops::Range;

use charter_core::{Bar, VolumeProfile};

use crate::surface::{Color, Point, Surface};
use crate::viewport::Viewport;
use crate::{BODY_RATIO, MIN_BODY_PIXELS, VOLUME_PROFILE_WIDTH_RATIO};

/// Chart colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub background: Color,
    pub up: Color,
    pub down: Color,
    pub last_price: Color,
    pub profile: Color,
    pub value_area: Color,
    pub poc: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: [0.07, 0.08, 0.1, 1.0],
            up: [0.15, 0.65, 0.6, 1.0],
            down: [0.94, 0.33, 0.31, 1.0],
            last_price: [0.9, 0.9, 0.9, 0.8],
            profile: [0.5, 0.5, 0.6, 0.35],
            value_area: [0.4, 0.55, 0.8, 0.5],
            poc: [0.95, 0.75, 0.2, 0.8],
        }
    }
}

/// Vertical mapping for an overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueScale {
    /// Shares the candles' price scale.
    Price,
    /// Maps `[min, max]` onto a horizontal band of the plot. `top` and
    /// `bottom` are fractions of the plot height measured from the top.
    Band {
        min: f64,
        max: f64,
        top: f64,
        bottom: f64,
    },
}

impl ValueScale {
    /// A band fitted to the finite values.
    pub fn band(values: &[Option<f64>], top: f64, bottom: f64) -> Self {
        let (min, max) = values
            .iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let (min, max) = if min.is_finite() { (min, max) } else { (0.0, 1.0) };
        ValueScale::Band {
            min,
            max,
            top,
            bottom,
        }
    }

    pub fn to_y(&self, value: f64, viewport: &Viewport) -> f64 {
        match *self {
            ValueScale::Price => viewport.price_to_y(value),
            ValueScale::Band {
                min,
                max,
                top,
                bottom,
            } => {
                let top_px = top * viewport.height;
                let bottom_px = bottom * viewport.height;
                let span = if max > min { max - min } else { 1.0 };
                bottom_px - (value - min) / span * (bottom_px - top_px)
            }
        }
    }

    /// Y of the histogram/area base: zero when in range, otherwise the
    /// nearer edge.
    fn baseline(&self, viewport: &Viewport) -> f64 {
        match *self {
            ValueScale::Price => viewport.height,
            ValueScale::Band { min, max, .. } => {
                self.to_y(0.0_f64.max(min).min(max), viewport)
            }
        }
    }
}

/// Values aligned to bar indices; `None` is a gap.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySeries {
    pub values: Vec<Option<f64>>,
    pub scale: ValueScale,
    pub color: Color,
    pub line_width: f64,
}

impl OverlaySeries {
    pub fn new(values: Vec<Option<f64>>, scale: ValueScale, color: Color) -> Self {
        Self {
            values,
            scale,
            color,
            line_width: 1.5,
        }
    }
}

/// Indicator series drawn over the candles.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Line(OverlaySeries),
    Histogram(OverlaySeries),
    Area(OverlaySeries),
}

/// What a draw call covered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawStats {
    pub visible: Range<usize>,
    pub bars_drawn: usize,
    /// Visible bars with a non-finite coordinate.
    pub skipped: usize,
}

/// Draws bar snapshots onto a [`Surface`].
///
/// Drawing reads only its arguments; the same inputs always produce the
/// same draw calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRenderer {
    pub theme: Theme,
    /// Body width as a share of bar spacing.
    pub body_ratio: f64,
    pub show_last_price: bool,
}

impl ChartRenderer {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            body_ratio: BODY_RATIO,
            show_last_price: true,
        }
    }

    pub fn draw<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        bars: &[Bar],
        viewport: &Viewport,
        overlays: &[Overlay],
    ) -> DrawStats {
        surface.clear(self.theme.background);

        let visible = viewport.visible_range(bars.len());
        let dpr = surface.device_pixel_ratio().max(f64::EPSILON);
        let body_width = (viewport.bar_spacing * self.body_ratio).max(MIN_BODY_PIXELS);

        let mut stats = DrawStats {
            visible: visible.clone(),
            ..DrawStats::default()
        };
        for index in visible.clone() {
            if self.draw_candle(surface, &bars[index], index, viewport, body_width, dpr) {
                stats.bars_drawn += 1;
            } else {
                stats.skipped += 1;
            }
        }
        if stats.skipped > 0 {
            log::debug!("Skipped {} bars with non-finite coordinates", stats.skipped);
        }

        for overlay in overlays {
            self.draw_overlay(surface, overlay, visible.clone(), viewport, body_width);
        }

        if self.show_last_price {
            if let Some(last) = bars.last() {
                self.draw_last_price(surface, last, viewport);
            }
        }
        stats
    }

    /// Draws the profile as a histogram anchored to the plot's right edge.
    /// Returns the number of levels drawn.
    pub fn draw_volume_profile<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        profile: &VolumeProfile,
        viewport: &Viewport,
    ) -> usize {
        let max_volume = profile.max_volume();
        if max_volume <= 0.0 {
            return 0;
        }
        let max_width = viewport.width * VOLUME_PROFILE_WIDTH_RATIO;
        let row_height = profile_row_height(profile, viewport);

        let mut drawn = 0;
        for level in &profile.levels {
            let y = viewport.price_to_y(level.price);
            let width = level.volume / max_volume * max_width;
            let x = viewport.width - width;
            if ![x, y, width].iter().all(|v| v.is_finite()) || width <= 0.0 {
                continue;
            }
            let color = if level.price == profile.poc {
                self.theme.poc
            } else if level.price >= profile.val && level.price <= profile.vah {
                self.theme.value_area
            } else {
                self.theme.profile
            };
            surface.fill_rect(x, y - row_height / 2.0, width, row_height, color);
            drawn += 1;
        }
        drawn
    }

    fn draw_candle<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        bar: &Bar,
        index: usize,
        viewport: &Viewport,
        body_width: f64,
        dpr: f64,
    ) -> bool {
        let x = snap(viewport.index_to_x(index as f64), dpr);
        let high = viewport.price_to_y(bar.high);
        let low = viewport.price_to_y(bar.low);
        let open = viewport.price_to_y(bar.open);
        let close = viewport.price_to_y(bar.close);
        if ![x, high, low, open, close].iter().all(|v| v.is_finite()) {
            return false;
        }

        let color = if bar.close >= bar.open {
            self.theme.up
        } else {
            self.theme.down
        };
        surface.stroke_line(Point::new(x, high), Point::new(x, low), color, 1.0);

        let top = open.min(close);
        let height = (open - close).abs().max(1.0 / dpr);
        surface.fill_rect(x - body_width / 2.0, top, body_width, height, color);
        true
    }

    fn draw_overlay<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        overlay: &Overlay,
        visible: Range<usize>,
        viewport: &Viewport,
        body_width: f64,
    ) {
        let (Overlay::Line(series) | Overlay::Histogram(series) | Overlay::Area(series)) = overlay;
        let range = visible.start.min(series.values.len())..visible.end.min(series.values.len());

        match overlay {
            Overlay::Histogram(_) => {
                let base = series.scale.baseline(viewport);
                for index in range {
                    let Some(value) = series.values[index] else {
                        continue;
                    };
                    let x = viewport.index_to_x(index as f64);
                    let y = series.scale.to_y(value, viewport);
                    if ![x, y, base].iter().all(|v| v.is_finite()) {
                        continue;
                    }
                    let top = y.min(base);
                    let height = (y - base).abs();
                    surface.fill_rect(x - body_width / 2.0, top, body_width, height, series.color);
                }
            }
            Overlay::Line(_) => {
                for segment in segments(series, range, viewport) {
                    surface.stroke_path(&segment, series.color, series.line_width);
                }
            }
            Overlay::Area(_) => {
                let base = series.scale.baseline(viewport);
                let [r, g, b, a] = series.color;
                let fill = [r, g, b, a * 0.25];
                for segment in segments(series, range, viewport) {
                    if base.is_finite() {
                        let mut polygon = segment.clone();
                        if let (Some(first), Some(last)) = (segment.first(), segment.last()) {
                            polygon.push(Point::new(last.x, base));
                            polygon.push(Point::new(first.x, base));
                        }
                        surface.fill_path(&polygon, fill);
                    }
                    surface.stroke_path(&segment, series.color, series.line_width);
                }
            }
        }
    }

    fn draw_last_price<S: Surface + ?Sized>(&self, surface: &mut S, last: &Bar, viewport: &Viewport) {
        let y = viewport.price_to_y(last.close);
        if !y.is_finite() || !viewport.width.is_finite() {
            return;
        }
        surface.stroke_line(
            Point::new(0.0, y),
            Point::new(viewport.width, y),
            self.theme.last_price,
            1.0,
        );
    }
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Centers `x` on a device pixel so 1px lines stay sharp.
fn snap(x: f64, dpr: f64) -> f64 {
    ((x * dpr).floor() + 0.5) / dpr
}

/// Runs of consecutive drawable points; gaps and non-finite values split
/// runs, and runs shorter than two points are dropped.
fn segments(series: &OverlaySeries, range: Range<usize>, viewport: &Viewport) -> Vec<Vec<Point>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for index in range {
        let point = series.values[index].map(|value| {
            Point::new(
                viewport.index_to_x(index as f64),
                series.scale.to_y(value, viewport),
            )
        });
        match point {
            Some(point) if point.is_finite() => current.push(point),
            _ => {
                if current.len() >= 2 {
                    runs.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
    }
    if current.len() >= 2 {
        runs.push(current);
    }
    runs
}

/// Pixel height of one profile row from the smallest gap between levels.
fn profile_row_height(profile: &VolumeProfile, viewport: &Viewport) -> f64 {
    let gap = profile
        .levels
        .windows(2)
        .map(|pair| (pair[0].price - pair[1].price).abs())
        .filter(|gap| *gap > 0.0)
        .fold(f64::INFINITY, f64::min);
    if !gap.is_finite() {
        return 1.0;
    }
    let px = (viewport.price_to_y(0.0) - viewport.price_to_y(gap)).abs();
    if px.is_finite() {
        (px * 0.9).max(1.0)
    } else {
        1.0
    }
}
