//! Time and price scales for a chart plot area.

use std::ops::Range;

use charter_core::Bar;

use crate::{
    DEFAULT_BAR_SPACING, MAX_BAR_SPACING, MAX_PRICE_ZOOM, MIN_BAR_SPACING, MIN_PRICE_ZOOM,
    PRICE_PADDING,
};

/// Smallest plot extent in pixels; keeps the scales invertible.
const MIN_EXTENT: f64 = 1.0;

/// Pan/zoom state mapping (bar index, price) to plot pixels.
///
/// X grows to the right from the plot's left edge, Y grows downwards from
/// its top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Horizontal scroll in pixels.
    pub offset: f64,
    /// Pixels per bar.
    pub bar_spacing: f64,
    pub price_min: f64,
    pub price_max: f64,
    /// Vertical zoom; above 1 narrows the visible price range.
    pub price_zoom: f64,
    pub width: f64,
    pub height: f64,
    price_padding: f64,
    /// Unpadded extremes from the last `set_range`.
    range: Option<(f64, f64)>,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            offset: 0.0,
            bar_spacing: DEFAULT_BAR_SPACING,
            price_min: 0.0,
            price_max: 1.0,
            price_zoom: 1.0,
            width: width.max(MIN_EXTENT),
            height: height.max(MIN_EXTENT),
            price_padding: PRICE_PADDING,
            range: None,
        }
    }

    pub fn with_bar_spacing(mut self, bar_spacing: f64) -> Self {
        self.bar_spacing = bar_spacing.clamp(MIN_BAR_SPACING, MAX_BAR_SPACING);
        self
    }

    pub fn with_price_padding(mut self, padding: f64) -> Self {
        self.price_padding = padding.max(0.0);
        self.reapply_range();
        self
    }

    /// Pixel x of the center of bar `index`.
    pub fn index_to_x(&self, index: f64) -> f64 {
        index * self.bar_spacing - self.offset
    }

    /// Nearest bar index at pixel `x`. May be negative or past the series end.
    pub fn x_to_index(&self, x: f64) -> i64 {
        ((x + self.offset) / self.bar_spacing).round() as i64
    }

    pub fn price_to_y(&self, price: f64) -> f64 {
        self.height - (price - self.price_min) / (self.price_max - self.price_min) * self.height
    }

    pub fn y_to_price(&self, y: f64) -> f64 {
        self.price_min + (self.height - y) / self.height * (self.price_max - self.price_min)
    }

    /// Scrolls by `dx` pixels; positive `dx` reveals earlier bars.
    pub fn pan(&mut self, dx: f64) {
        if dx.is_finite() {
            self.offset -= dx;
        }
    }

    /// Multiplies bar spacing by `factor`, clamped to `[1, 100]` pixels.
    pub fn zoom(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.bar_spacing = (self.bar_spacing * factor).clamp(MIN_BAR_SPACING, MAX_BAR_SPACING);
        }
    }

    /// Sets the visible price range from data extremes, applying padding and
    /// the current price zoom.
    pub fn set_range(&mut self, min: f64, max: f64) {
        if !min.is_finite() || !max.is_finite() {
            return;
        }
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.range = Some((min, max));
        self.reapply_range();
    }

    /// Sets the price zoom, clamped to `[0.1, 10]`.
    pub fn set_scale(&mut self, zoom: f64) {
        if !zoom.is_finite() {
            return;
        }
        self.price_zoom = zoom.clamp(MIN_PRICE_ZOOM, MAX_PRICE_ZOOM);
        self.reapply_range();
    }

    /// Bar indices intersecting `[0, width]` plus one bar on each side.
    pub fn visible_range(&self, len: usize) -> Range<usize> {
        if len == 0 || !self.bar_spacing.is_finite() || self.bar_spacing <= 0.0 {
            return 0..0;
        }
        let first = (self.offset / self.bar_spacing).floor() - 1.0;
        let last = ((self.offset + self.width) / self.bar_spacing).ceil() + 1.0;
        let start = first.max(0.0).min(len as f64) as usize;
        let end = (last + 1.0).max(0.0).min(len as f64) as usize;
        start..end.max(start)
    }

    /// Resets spacing and zoom, puts the last bar at the right edge and fits
    /// the price range to all bars.
    pub fn fit_content(&mut self, bars: &[Bar]) {
        self.bar_spacing = DEFAULT_BAR_SPACING;
        self.price_zoom = 1.0;
        self.offset = match bars.len() {
            0 => 0.0,
            len => (len - 1) as f64 * self.bar_spacing + self.bar_spacing / 2.0 - self.width,
        };
        match price_extremes(bars) {
            Some((min, max)) => self.set_range(min, max),
            None => self.reapply_range(),
        }
    }

    /// Fits the price range to the bars currently in view.
    pub fn auto_scale(&mut self, bars: &[Bar]) {
        let visible = self.visible_range(bars.len());
        if let Some((min, max)) = price_extremes(&bars[visible]) {
            self.set_range(min, max);
        }
    }

    /// Changes the plot size keeping the bar at the right edge in place.
    /// Extents below one pixel are raised to one.
    pub fn resize(&mut self, width: f64, height: f64) {
        if !width.is_finite() || !height.is_finite() {
            return;
        }
        let (width, height) = (width.max(MIN_EXTENT), height.max(MIN_EXTENT));
        self.offset += self.width - width;
        self.width = width;
        self.height = height;
    }

    fn reapply_range(&mut self) {
        let Some((min, max)) = self.range else {
            return;
        };
        let mut span = max - min;
        if span <= 0.0 {
            span = min.abs().max(1.0) * 0.01;
        }
        let center = (min + max) / 2.0;
        let half = span * (0.5 + self.price_padding) / self.price_zoom;
        self.price_min = center - half;
        self.price_max = center + half;
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}

/// Lowest low and highest high over finite bars.
fn price_extremes(bars: &[Bar]) -> Option<(f64, f64)> {
    bars.iter()
        .filter(|b| b.low.is_finite() && b.high.is_finite())
        .fold(None, |acc, b| match acc {
            None => Some((b.low, b.high)),
            Some((min, max)) => Some((f64::min(min, b.low), f64::max(max, b.high))),
        })
}
