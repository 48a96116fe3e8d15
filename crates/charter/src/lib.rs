//! Charter - live candlestick charts.
//!
//! - [`app`] - winit event loop handler
//! - [`input`] - pointer, wheel and keyboard handling
//! - [`session`] - one chart wired from live feed to renderer

pub mod app;
pub mod input;
pub mod session;

pub use app::{App, AppEvent};
pub use input::{InputResponse, InteractionController};
pub use session::ChartSession;
