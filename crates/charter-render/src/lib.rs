//! Chart geometry and rendering for charter.
//!
//! [`Viewport`] maps bar indices and prices to pixels, [`ChartLayout`]
//! splits the surface into plot and axis regions, and [`ChartRenderer`]
//! turns a bar snapshot into draw calls on any [`Surface`].

pub mod layout;
pub mod renderer;
pub mod surface;
pub mod viewport;

pub use layout::{ChartLayout, Rect, Region};
pub use renderer::{ChartRenderer, DrawStats, Overlay, OverlaySeries, Theme, ValueScale};
pub use surface::{Color, DrawCommand, Point, RecordingSurface, Surface};
pub use viewport::Viewport;

/// Constants for candle rendering.
pub const DEFAULT_BAR_SPACING: f64 = 8.0;
pub const MIN_BAR_SPACING: f64 = 1.0;
pub const MAX_BAR_SPACING: f64 = 100.0;
pub const BODY_RATIO: f64 = 0.8; // Body width as a share of bar spacing
pub const MIN_BODY_PIXELS: f64 = 1.0;

/// Price scale constants.
pub const PRICE_PADDING: f64 = 0.1; // 10% of the range on each side
pub const MIN_PRICE_ZOOM: f64 = 0.1;
pub const MAX_PRICE_ZOOM: f64 = 10.0;

/// Layout constants.
pub const PRICE_AXIS_WIDTH: f64 = 60.0;
pub const TIME_AXIS_HEIGHT: f64 = 24.0;
pub const VOLUME_PROFILE_WIDTH_RATIO: f64 = 0.25; // Profile takes at most 25% of plot width
