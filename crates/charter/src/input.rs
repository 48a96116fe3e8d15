//! Pointer, wheel and keyboard handling for a chart.
//!
//! [`InteractionController`] turns raw winit input into [`Viewport`]
//! mutations. It never touches the bar series; callers redraw when a
//! handler returns [`InputResponse::Redraw`].

use charter_core::Bar;
use charter_render::{ChartLayout, Region, Viewport};
use winit::{
    event::{ElementState, MouseButton, MouseScrollDelta},
    keyboard::KeyCode,
};

/// Bar-spacing factor applied per wheel notch.
pub const WHEEL_ZOOM_FACTOR: f64 = 1.1;

/// Default zoom change per pixel of axis drag.
pub const DEFAULT_AXIS_SENSITIVITY: f64 = 0.005;

/// Smallest factor a single axis-drag step may apply.
const MIN_AXIS_FACTOR: f64 = 0.1;

/// Outcome of one input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResponse {
    /// Nothing changed.
    Ignored,
    /// The viewport changed.
    Redraw,
    /// The pointer is over bar `index`.
    Hover { index: usize },
    /// The pointer is no longer over a bar.
    HoverCleared,
}

/// An active left-button drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drag {
    /// Region hit at pointer-down; fixed for the whole drag.
    pub region: Region,
    pub origin: (f64, f64),
    pub last: (f64, f64),
}

/// Translates pointer and wheel input into viewport changes.
///
/// winit reports the button and the cursor position in separate events, so
/// the controller remembers the last cursor position to hit-test presses.
///
/// # Example
///
/// ```ignore
/// let mut input = InteractionController::new();
/// input.handle_cursor_moved((120.0, 80.0), &mut viewport, &layout, bars.len());
/// input.handle_mouse_input(ElementState::Pressed, MouseButton::Left, &layout);
/// if input.handle_cursor_moved((170.0, 80.0), &mut viewport, &layout, bars.len())
///     == InputResponse::Redraw
/// {
///     renderer.draw(&mut surface, bars, &viewport, &[]);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InteractionController {
    drag: Option<Drag>,
    cursor: Option<(f64, f64)>,
    hover: Option<usize>,
    /// Zoom change per pixel when dragging an axis.
    pub axis_sensitivity: f64,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            drag: None,
            cursor: None,
            hover: None,
            axis_sensitivity: DEFAULT_AXIS_SENSITIVITY,
        }
    }

    #[must_use]
    pub fn with_axis_sensitivity(mut self, sensitivity: f64) -> Self {
        self.axis_sensitivity = sensitivity;
        self
    }

    pub fn drag(&self) -> Option<&Drag> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn cursor_position(&self) -> Option<(f64, f64)> {
        self.cursor
    }

    /// Bar index last reported by [`InputResponse::Hover`].
    pub fn hovered(&self) -> Option<usize> {
        self.hover
    }

    /// Left-button press starts a drag in the region under the cursor.
    /// Releasing any button ends it.
    pub fn handle_mouse_input(
        &mut self,
        state: ElementState,
        button: MouseButton,
        layout: &ChartLayout,
    ) -> InputResponse {
        match state {
            ElementState::Pressed if button != MouseButton::Left => InputResponse::Ignored,
            ElementState::Pressed => {
                let Some(position) = self.cursor else {
                    return InputResponse::Ignored;
                };
                let region = layout.hit_test(position.0, position.1);
                log::trace!("Drag started in {region:?} at {position:?}");
                self.drag = Some(Drag {
                    region,
                    origin: position,
                    last: position,
                });
                InputResponse::Ignored
            }
            ElementState::Released => {
                self.drag = None;
                InputResponse::Ignored
            }
        }
    }

    /// Applies the active drag, or reports the hovered bar when not
    /// dragging. `len` is the number of bars in the series.
    pub fn handle_cursor_moved(
        &mut self,
        position: (f64, f64),
        viewport: &mut Viewport,
        layout: &ChartLayout,
        len: usize,
    ) -> InputResponse {
        if !position.0.is_finite() || !position.1.is_finite() {
            return InputResponse::Ignored;
        }
        self.cursor = Some(position);

        let Some(mut drag) = self.drag else {
            return self.update_hover(position, viewport, layout, len);
        };

        let dx = position.0 - drag.last.0;
        let dy = position.1 - drag.last.1;
        drag.last = position;
        self.drag = Some(drag);
        if dx == 0.0 && dy == 0.0 {
            return InputResponse::Ignored;
        }

        match drag.region {
            Region::Plot => viewport.pan(dx),
            Region::TimeAxis => viewport.zoom(axis_factor(dx, self.axis_sensitivity)),
            Region::PriceAxis => {
                let factor = axis_factor(dy, self.axis_sensitivity);
                viewport.set_scale(viewport.price_zoom * factor);
            }
        }
        InputResponse::Redraw
    }

    /// Pointer left the window: the drag and hover both end.
    pub fn handle_cursor_left(&mut self) -> InputResponse {
        self.drag = None;
        self.cursor = None;
        match self.hover.take() {
            Some(_) => InputResponse::HoverCleared,
            None => InputResponse::Ignored,
        }
    }

    /// Wheel always zooms the time axis, wherever the pointer is.
    pub fn handle_mouse_wheel(
        &mut self,
        delta: MouseScrollDelta,
        viewport: &mut Viewport,
    ) -> InputResponse {
        // winit reports scrolling away from the user as positive y.
        let y = match delta {
            MouseScrollDelta::LineDelta(_, y) => f64::from(y),
            MouseScrollDelta::PixelDelta(pos) => pos.y,
        };
        let factor = if y > 0.0 {
            WHEEL_ZOOM_FACTOR
        } else if y < 0.0 {
            1.0 / WHEEL_ZOOM_FACTOR
        } else {
            return InputResponse::Ignored;
        };

        let before = viewport.bar_spacing;
        viewport.zoom(factor);
        if viewport.bar_spacing == before {
            InputResponse::Ignored
        } else {
            InputResponse::Redraw
        }
    }

    /// `F` and `Home` fit the view to `bars`.
    pub fn handle_key(
        &mut self,
        code: KeyCode,
        is_pressed: bool,
        viewport: &mut Viewport,
        bars: &[Bar],
    ) -> InputResponse {
        if !is_pressed {
            return InputResponse::Ignored;
        }

        match code {
            KeyCode::KeyF | KeyCode::Home => {
                viewport.fit_content(bars);
                InputResponse::Redraw
            }
            _ => InputResponse::Ignored,
        }
    }

    fn update_hover(
        &mut self,
        position: (f64, f64),
        viewport: &Viewport,
        layout: &ChartLayout,
        len: usize,
    ) -> InputResponse {
        let index = if len > 0 && layout.hit_test(position.0, position.1) == Region::Plot {
            let nearest = viewport.x_to_index(position.0).clamp(0, len as i64 - 1);
            Some(nearest as usize)
        } else {
            None
        };

        let previous = std::mem::replace(&mut self.hover, index);
        match (previous, index) {
            (_, Some(index)) => InputResponse::Hover { index },
            (Some(_), None) => InputResponse::HoverCleared,
            (None, None) => InputResponse::Ignored,
        }
    }
}

fn axis_factor(delta: f64, sensitivity: f64) -> f64 {
    (1.0 + delta * sensitivity).max(MIN_AXIS_FACTOR)
}
