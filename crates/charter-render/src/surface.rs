//! Abstract 2D drawing surface.
//!
//! The renderer only talks to [`Surface`]. [`RecordingSurface`] keeps the
//! calls as a display list; windowed backends rasterize them.

/// RGBA color with components in `0.0..=1.0`.
pub type Color = [f32; 4];

/// Point in logical surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Drawing primitives in logical pixels.
///
/// Sizes are in logical pixels; backends multiply by
/// [`device_pixel_ratio`](Surface::device_pixel_ratio).
pub trait Surface {
    /// Logical `(width, height)`.
    fn size(&self) -> (f64, f64);

    fn device_pixel_ratio(&self) -> f64 {
        1.0
    }

    fn clear(&mut self, color: Color);

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color);

    fn stroke_line(&mut self, from: Point, to: Point, color: Color, width: f64);

    fn stroke_path(&mut self, points: &[Point], color: Color, width: f64);

    fn fill_path(&mut self, points: &[Point], color: Color);
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    FillRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
    StrokeLine {
        from: Point,
        to: Point,
        color: Color,
        width: f64,
    },
    StrokePath {
        points: Vec<Point>,
        color: Color,
        width: f64,
    },
    FillPath {
        points: Vec<Point>,
        color: Color,
    },
}

/// Surface that records draw calls instead of rasterizing them.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSurface {
    width: f64,
    height: f64,
    device_pixel_ratio: f64,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio: 1.0,
            commands: Vec::new(),
        }
    }

    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    fn push(&mut self, command: DrawCommand) {
        debug_assert!(
            command_is_finite(&command),
            "non-finite coordinate reached the surface: {command:?}"
        );
        self.commands.push(command);
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    fn clear(&mut self, color: Color) {
        // A clear invalidates everything recorded before it.
        self.commands.clear();
        self.push(DrawCommand::Clear(color));
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn stroke_line(&mut self, from: Point, to: Point, color: Color, width: f64) {
        self.push(DrawCommand::StrokeLine {
            from,
            to,
            color,
            width,
        });
    }

    fn stroke_path(&mut self, points: &[Point], color: Color, width: f64) {
        self.push(DrawCommand::StrokePath {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn fill_path(&mut self, points: &[Point], color: Color) {
        self.push(DrawCommand::FillPath {
            points: points.to_vec(),
            color,
        });
    }
}

fn command_is_finite(command: &DrawCommand) -> bool {
    match command {
        DrawCommand::Clear(_) => true,
        DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            ..
        } => [x, y, width, height].iter().all(|v| v.is_finite()),
        DrawCommand::StrokeLine {
            from, to, width, ..
        } => from.is_finite() && to.is_finite() && width.is_finite(),
        DrawCommand::StrokePath { points, width, .. } => {
            width.is_finite() && points.iter().all(Point::is_finite)
        }
        DrawCommand::FillPath { points, .. } => points.iter().all(Point::is_finite),
    }
}
