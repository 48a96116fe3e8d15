//! Application handler for winit events.
//!
//! The live feed runs on a tokio runtime and reaches the event loop as
//! [`AppEvent`]s through an `EventLoopProxy`; window input goes straight to
//! the [`ChartSession`].

use std::sync::Arc;

use charter_data::LiveDataEvent;
use charter_render::{RecordingSurface, Surface};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::input::InputResponse;
use crate::session::ChartSession;

/// Events delivered to the event loop from outside it.
#[derive(Debug)]
pub enum AppEvent {
    Live(LiveDataEvent),
    /// The live feed stopped; the chart stays open with its last data.
    FeedEnded,
    /// Ctrl-C or another external stop request.
    Exit,
}

/// What the event loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Redraw,
    Exit,
}

pub struct App {
    session: ChartSession,
    surface: RecordingSurface,
    window: Option<Arc<Window>>,
    title: String,
}

impl App {
    pub fn new(session: ChartSession) -> Self {
        let (width, height) = (session.layout().width, session.layout().height);
        let title = format!("Charter - {}", session.key());
        Self {
            session,
            surface: RecordingSurface::new(width, height),
            window: None,
            title,
        }
    }

    pub fn session(&self) -> &ChartSession {
        &self.session
    }

    pub fn into_session(self) -> ChartSession {
        self.session
    }

    pub fn surface(&self) -> &RecordingSurface {
        &self.surface
    }

    /// Routes one window event to the session.
    pub fn on_window_event(&mut self, event: WindowEvent) -> Flow {
        match event {
            WindowEvent::CloseRequested => return Flow::Exit,
            WindowEvent::Resized(size) => self.resize(size),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                let (width, height) = self.surface.size();
                self.surface =
                    RecordingSurface::new(width, height).with_device_pixel_ratio(scale_factor);
            }
            WindowEvent::RedrawRequested => {
                self.render();
                return Flow::Continue;
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let InputResponse::Hover { .. } =
                    self.session.handle_cursor_moved(position.x, position.y)
                {
                    self.log_hover();
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.session.handle_cursor_left();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.session.handle_mouse_input(state, button);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.session.handle_mouse_wheel(delta);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape && state.is_pressed() {
                    return Flow::Exit;
                }
                self.session.handle_key(code, state.is_pressed());
            }
            _ => {}
        }
        self.redraw_flow()
    }

    /// Applies one event from outside the loop.
    pub fn on_app_event(&mut self, event: AppEvent) -> Flow {
        match event {
            AppEvent::Live(event) => {
                self.session.apply(event);
                self.redraw_flow()
            }
            AppEvent::FeedEnded => {
                log::info!("Live feed ended for {}", self.session.key());
                Flow::Continue
            }
            AppEvent::Exit => Flow::Exit,
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        let (width, height) = (f64::from(size.width), f64::from(size.height));
        if width == 0.0 || height == 0.0 {
            // Minimized.
            return;
        }
        self.session.resize(width, height);
        self.surface.resize(width, height);
    }

    fn render(&mut self) {
        let stats = self.session.draw(&mut self.surface);
        log::debug!(
            "Drew {} bars ({:?}) as {} commands, {} skipped",
            stats.bars_drawn,
            stats.visible,
            self.surface.commands().len(),
            stats.skipped
        );
    }

    fn log_hover(&self) {
        if let Some(bar) = self.session.hovered_bar() {
            let imbalances = self
                .session
                .hovered_imbalances()
                .map_or(0, |found| found.imbalances.len());
            log::trace!(
                "Hover {} O {:.2} H {:.2} L {:.2} C {:.2} V {:.0}, {imbalances} imbalances",
                bar.time,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            );
        }
    }

    fn redraw_flow(&self) -> Flow {
        if self.session.needs_redraw() {
            Flow::Redraw
        } else {
            Flow::Continue
        }
    }

    fn follow(&self, event_loop: &ActiveEventLoop, flow: Flow) {
        match flow {
            Flow::Continue => {}
            Flow::Redraw => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            Flow::Exit => event_loop.exit(),
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let (width, height) = self.surface.size();
        let attributes = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(width, height));
        match event_loop.create_window(attributes) {
            Ok(window) => {
                let window = Arc::new(window);
                self.surface = RecordingSurface::new(width, height)
                    .with_device_pixel_ratio(window.scale_factor());
                self.resize(window.inner_size());
                window.request_redraw();
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Unable to create window: {e}");
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        let flow = self.on_app_event(event);
        self.follow(event_loop, flow);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let flow = self.on_window_event(event);
        self.follow(event_loop, flow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_config::Config;
    use charter_core::Bar;
    use charter_data::SupervisorEvent;

    fn app() -> App {
        let session = ChartSession::from_config(&Config::default(), 800.0, 600.0).unwrap();
        App::new(session)
    }

    fn bar(time: i64) -> LiveDataEvent {
        LiveDataEvent::Bar {
            symbol: "XAUUSD".into(),
            bar: Bar::new(time, 2650.0, 2651.0, 2649.0, 2650.5, 4.0),
        }
    }

    #[test]
    fn test_redraw_clears_pending_changes() {
        let mut app = app();
        assert_eq!(app.on_window_event(WindowEvent::RedrawRequested), Flow::Continue);
        assert!(!app.session().needs_redraw());
        assert!(!app.surface().commands().is_empty());
    }

    #[test]
    fn test_live_bar_requests_redraw() {
        let mut app = app();
        app.on_window_event(WindowEvent::RedrawRequested);

        assert_eq!(app.on_app_event(AppEvent::Live(bar(60))), Flow::Redraw);
        assert_eq!(app.session().store().snapshot().len(), 1);

        app.on_window_event(WindowEvent::RedrawRequested);
        let foreign = LiveDataEvent::Bar {
            symbol: "BTCUSD".into(),
            bar: Bar::flat(120, 1.0, 1.0),
        };
        assert_eq!(app.on_app_event(AppEvent::Live(foreign)), Flow::Continue);
    }

    #[test]
    fn test_resize_reaches_session_and_surface() {
        let mut app = app();
        app.on_window_event(WindowEvent::RedrawRequested);

        let flow = app.on_window_event(WindowEvent::Resized(PhysicalSize::new(1024, 768)));
        assert_eq!(flow, Flow::Redraw);
        assert_eq!(app.session().layout().width, 1024.0);
        assert_eq!(app.surface().size(), (1024.0, 768.0));

        // A minimized window keeps the last size.
        app.on_window_event(WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert_eq!(app.surface().size(), (1024.0, 768.0));
    }

    #[test]
    fn test_exit_paths() {
        let mut app = app();
        assert_eq!(app.on_window_event(WindowEvent::CloseRequested), Flow::Exit);
        assert_eq!(app.on_app_event(AppEvent::Exit), Flow::Exit);
        assert_eq!(app.on_app_event(AppEvent::FeedEnded), Flow::Continue);
        app.on_app_event(AppEvent::Live(LiveDataEvent::Supervisor(
            SupervisorEvent::Connected,
        )));
        assert!(app.session().is_connected());
    }
}
