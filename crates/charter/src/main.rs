//! Charter - live chart window.
//!
//! Loads history, opens a window and follows the live feed. Pass a config
//! file path as the only argument to override the default search.

use anyhow::{anyhow, Context, Result};
use charter::{App, AppEvent, ChartSession};
use charter_config::Config;
use charter_data::TradeflowSource;
use tokio::runtime::Runtime;
use tradeflow_api::{StreamSocket, TradeflowClient};
use winit::event_loop::EventLoop;

const WINDOW_WIDTH: f64 = 1280.0;
const WINDOW_HEIGHT: f64 = 720.0;

fn run() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {path}"))?,
        None => Config::load_default(),
    };

    let runtime = Runtime::new().context("starting tokio runtime")?;
    let client = TradeflowClient::new(config.api.client_config())
        .context("creating TradeFlow client")?;
    let source = TradeflowSource::new(client);

    let mut session = ChartSession::from_config(&config, WINDOW_WIDTH, WINDOW_HEIGHT)?;
    runtime.block_on(session.load_history(&source, config.api.history_limit))?;

    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .map_err(|e| anyhow!("creating event loop: {e}"))?;
    let proxy = event_loop.create_proxy();

    let socket = StreamSocket::new(config.stream.ws_config(&config.api));
    let mut events = {
        let _guard = runtime.enter();
        session.start_live(config.live_config()?, socket, source)
    };

    let feed = proxy.clone();
    runtime.spawn(async move {
        while let Some(event) = events.recv().await {
            if feed.send_event(AppEvent::Live(event)).is_err() {
                return;
            }
        }
        let _ = feed.send_event(AppEvent::FeedEnded);
    });
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down");
            let _ = proxy.send_event(AppEvent::Exit);
        }
    });

    let mut app = App::new(session);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("running event loop: {e}"))?;

    let mut session = app.into_session();
    runtime.block_on(session.shutdown())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
