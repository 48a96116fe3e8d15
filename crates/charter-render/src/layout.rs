//! Plot and axis regions and pointer hit-testing.

use crate::{PRICE_AXIS_WIDTH, TIME_AXIS_HEIGHT};

/// Axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: left and top edges are inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Region under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Plot,
    PriceAxis,
    TimeAxis,
}

/// Surface split into a plot area, a price axis on the right and a time
/// axis along the bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartLayout {
    pub width: f64,
    pub height: f64,
    pub price_axis_width: f64,
    pub time_axis_height: f64,
}

impl ChartLayout {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            price_axis_width: PRICE_AXIS_WIDTH,
            time_axis_height: TIME_AXIS_HEIGHT,
        }
    }

    pub fn with_axes(mut self, price_axis_width: f64, time_axis_height: f64) -> Self {
        self.price_axis_width = price_axis_width.max(0.0);
        self.time_axis_height = time_axis_height.max(0.0);
        self
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn plot(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            (self.width - self.price_axis_width).max(0.0),
            (self.height - self.time_axis_height).max(0.0),
        )
    }

    /// Right strip beside the plot.
    pub fn price_axis(&self) -> Rect {
        let plot = self.plot();
        Rect::new(plot.right(), 0.0, self.price_axis_width, plot.height)
    }

    /// Bottom strip across the full width, including the corner.
    pub fn time_axis(&self) -> Rect {
        let plot = self.plot();
        Rect::new(0.0, plot.bottom(), self.width, self.time_axis_height)
    }

    /// Classifies a surface position. Positions outside the surface are
    /// attributed to the nearest region.
    pub fn hit_test(&self, x: f64, y: f64) -> Region {
        let plot = self.plot();
        if y >= plot.bottom() {
            Region::TimeAxis
        } else if x >= plot.right() {
            Region::PriceAxis
        } else {
            debug_assert!(
                !self.price_axis().contains(x, y) && !self.time_axis().contains(x, y),
                "plot overlaps an axis at ({x}, {y})"
            );
            Region::Plot
        }
    }
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}
