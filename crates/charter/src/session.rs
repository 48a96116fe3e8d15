//! One chart: its series, view and live feed.
//!
//! [`ChartSession`] owns everything a chart needs. Live events, input and
//! resizes are applied synchronously in arrival order; the caller draws
//! whenever [`ChartSession::needs_redraw`] is set.

use anyhow::Context;
use charter_config::Config;
use charter_core::{
    cumulative_delta, Bar, BarImbalances, CvdDatum, MergeOutcome, OrderFlowUpdate, SeriesKey,
    SeriesStore, TickAggregator, TickOutcome,
};
use charter_data::{
    HistoricalSource, LiveConfig, LiveDataEvent, LiveDataManager, LiveHandle, PollSource,
    PushTransport, SupervisorEvent,
};
use charter_render::{
    ChartLayout, ChartRenderer, Color, DrawStats, Overlay, OverlaySeries, Surface, ValueScale,
    Viewport,
};
use tokio::sync::mpsc;
use winit::{
    event::{ElementState, MouseButton, MouseScrollDelta},
    keyboard::KeyCode,
};

use crate::input::{InputResponse, InteractionController};

/// Band of the plot height used by the CVD overlay, from the top.
const CVD_BAND: (f64, f64) = (0.78, 0.98);
const CVD_COLOR: Color = [0.55, 0.45, 0.9, 0.9];

/// Imbalance ratio requested with the order-flow history.
const IMBALANCE_RATIO: f64 = 3.0;

/// A single chart with its own store, viewport and live connection.
pub struct ChartSession {
    store: SeriesStore,
    aggregator: TickAggregator,
    viewport: Viewport,
    layout: ChartLayout,
    renderer: ChartRenderer,
    input: InteractionController,
    live: Option<LiveHandle>,
    /// Push connection is up; the last-price line is only meaningful then.
    connected: bool,
    show_cvd: bool,
    show_volume_profile: bool,
    /// Store revision at the last draw.
    drawn_revision: Option<u64>,
    view_changed: bool,
}

impl ChartSession {
    pub fn new(store: SeriesStore, layout: ChartLayout, viewport: Viewport) -> Self {
        let aggregator = TickAggregator::new(store.key().timeframe);
        Self {
            store,
            aggregator,
            viewport,
            layout,
            renderer: ChartRenderer::new(),
            input: InteractionController::new(),
            live: None,
            connected: false,
            show_cvd: true,
            show_volume_profile: true,
            drawn_revision: None,
            view_changed: true,
        }
    }

    /// Session for the configured default series on a `width` x `height`
    /// surface.
    pub fn from_config(config: &Config, width: f64, height: f64) -> anyhow::Result<Self> {
        let store = config.series_store()?;
        let layout = config.chart.layout(width, height);
        let viewport = config.chart.viewport(&layout);
        Ok(Self::new(store, layout, viewport))
    }

    pub fn key(&self) -> &SeriesKey {
        self.store.key()
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn layout(&self) -> &ChartLayout {
        &self.layout
    }

    pub fn input(&self) -> &InteractionController {
        &self.input
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(LiveHandle::is_running)
    }

    pub fn set_show_cvd(&mut self, show: bool) {
        self.show_cvd = show;
        self.view_changed = true;
    }

    pub fn set_show_volume_profile(&mut self, show: bool) {
        self.show_volume_profile = show;
        self.view_changed = true;
    }

    /// Bar under the pointer, if any.
    pub fn hovered_bar(&self) -> Option<&Bar> {
        self.input
            .hovered()
            .and_then(|index| self.store.snapshot().get(index))
    }

    /// Imbalances of the bar under the pointer, if any were found.
    pub fn hovered_imbalances(&self) -> Option<&BarImbalances> {
        self.hovered_bar()
            .and_then(|bar| self.store.imbalances_at(bar.time))
    }

    /// Loads bars and order flow, then fits the view.
    ///
    /// Bars are required. Order-flow failures are logged and leave those
    /// series empty, except that CVD falls back to the bars' bid/ask split
    /// and imbalances to the loaded footprint.
    pub async fn load_history<H>(&mut self, source: &H, limit: u32) -> anyhow::Result<()>
    where
        H: HistoricalSource + ?Sized,
    {
        let SeriesKey { symbol, timeframe } = self.store.key().clone();

        let bars = source
            .load_bars(&symbol, timeframe, limit)
            .await
            .with_context(|| format!("loading history for {symbol} {timeframe}"))?;
        self.store.replace(bars);
        self.aggregator.seed(self.store.last_bar().copied());

        match source.load_cvd(&symbol, timeframe, limit).await {
            Ok(cvd) => self.store.apply_order_flow(OrderFlowUpdate::Cvd(cvd)),
            Err(e) if self.has_side_split() => {
                log::warn!("CVD unavailable for {symbol}, deriving from bars: {e:#}");
                let cvd = cumulative_delta(self.store.snapshot());
                self.store.apply_order_flow(OrderFlowUpdate::Cvd(cvd));
            }
            Err(e) => log::warn!("CVD unavailable for {symbol}: {e:#}"),
        }
        match source.load_footprint(&symbol, timeframe, limit).await {
            Ok(footprint) => self
                .store
                .apply_order_flow(OrderFlowUpdate::Footprint(footprint)),
            Err(e) => log::warn!("Footprint unavailable for {symbol}: {e:#}"),
        }
        match source
            .load_imbalances(&symbol, timeframe, limit, IMBALANCE_RATIO)
            .await
        {
            Ok(found) => self
                .store
                .apply_order_flow(OrderFlowUpdate::Imbalances(found)),
            Err(e) if !self.store.footprint().is_empty() => {
                log::warn!("Imbalances unavailable for {symbol}, detecting locally: {e:#}");
                let found = self
                    .store
                    .footprint()
                    .iter()
                    .map(|bar| BarImbalances::detect(bar, IMBALANCE_RATIO))
                    .collect();
                self.store
                    .apply_order_flow(OrderFlowUpdate::Imbalances(found));
            }
            Err(e) => log::warn!("Imbalances unavailable for {symbol}: {e:#}"),
        }
        match source.load_volume_profile(&symbol).await {
            Ok(profile) => self
                .store
                .apply_order_flow(OrderFlowUpdate::VolumeProfile(profile)),
            Err(e) => log::warn!("Volume profile unavailable for {symbol}: {e:#}"),
        }

        self.fit_content();
        log::info!(
            "{} ready with {} bars",
            self.store.key(),
            self.store.snapshot().len()
        );
        Ok(())
    }

    /// Starts the live feed for this chart's series.
    ///
    /// Must be called inside a tokio runtime. The returned receiver feeds
    /// [`apply`](Self::apply).
    pub fn start_live<T, P>(
        &mut self,
        config: LiveConfig,
        transport: T,
        poller: P,
    ) -> mpsc::Receiver<LiveDataEvent>
    where
        T: PushTransport + 'static,
        P: PollSource + 'static,
    {
        let key = self.store.key();
        let config = LiveConfig {
            timeframe: key.timeframe,
            symbols: vec![key.symbol.clone()],
            ..config
        };
        let (handle, events) = LiveDataManager::new(config, transport, poller).start();
        self.attach_live(handle);
        events
    }

    /// Takes ownership of a running feed, replacing any previous one.
    pub fn attach_live(&mut self, handle: LiveHandle) {
        // Dropping the old handle shuts its task down.
        self.live = Some(handle);
    }

    /// Stops the live feed, if any, and waits for it to finish.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.connected = false;
        match self.live.take() {
            Some(handle) => handle.shutdown().await,
            None => Ok(()),
        }
    }

    /// Applies one live event. Returns `true` if the chart changed.
    pub fn apply(&mut self, event: LiveDataEvent) -> bool {
        match event {
            LiveDataEvent::Bar { symbol, bar } => {
                if !self.is_own_symbol(&symbol) {
                    return false;
                }
                if self.aggregator.current().map_or(true, |c| bar.time >= c.time) {
                    self.aggregator.seed(Some(bar));
                }
                self.merge(bar);
                true
            }
            LiveDataEvent::Tick {
                symbol,
                price,
                size,
                time,
            } => {
                if !self.is_own_symbol(&symbol) {
                    return false;
                }
                self.apply_tick(price, size, time)
            }
            LiveDataEvent::OrderFlow { symbol, update } => {
                if !self.is_own_symbol(&symbol) {
                    return false;
                }
                self.store.apply_order_flow(update);
                true
            }
            LiveDataEvent::Error(message) => {
                log::warn!("{}: {message}", self.store.key());
                false
            }
            LiveDataEvent::Supervisor(event) => self.apply_supervisor(event),
        }
    }

    /// Resizes the surface, keeping the latest bar anchored at the right.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.layout.resize(width, height);
        let plot = self.layout.plot();
        self.viewport.resize(plot.width, plot.height);
        self.view_changed = true;
    }

    pub fn fit_content(&mut self) {
        self.viewport.fit_content(self.store.snapshot());
        self.view_changed = true;
    }

    pub fn handle_cursor_moved(&mut self, x: f64, y: f64) -> InputResponse {
        let len = self.store.snapshot().len();
        let response = self
            .input
            .handle_cursor_moved((x, y), &mut self.viewport, &self.layout, len);
        self.note(response)
    }

    pub fn handle_cursor_left(&mut self) -> InputResponse {
        let response = self.input.handle_cursor_left();
        self.note(response)
    }

    pub fn handle_mouse_input(&mut self, state: ElementState, button: MouseButton) -> InputResponse {
        let response = self.input.handle_mouse_input(state, button, &self.layout);
        self.note(response)
    }

    pub fn handle_mouse_wheel(&mut self, delta: MouseScrollDelta) -> InputResponse {
        let response = self.input.handle_mouse_wheel(delta, &mut self.viewport);
        self.note(response)
    }

    pub fn handle_key(&mut self, code: KeyCode, is_pressed: bool) -> InputResponse {
        let response =
            self.input
                .handle_key(code, is_pressed, &mut self.viewport, self.store.snapshot());
        self.note(response)
    }

    /// Something changed since the last [`draw`](Self::draw).
    pub fn needs_redraw(&self) -> bool {
        self.view_changed || self.drawn_revision != Some(self.store.revision())
    }

    /// Draws the chart, fitting the price scale to the bars in view.
    pub fn draw<S: Surface + ?Sized>(&mut self, surface: &mut S) -> DrawStats {
        let bars = self.store.snapshot();
        self.viewport.auto_scale(bars);

        let mut overlays = Vec::new();
        if self.show_cvd {
            overlays.extend(cvd_overlay(bars, self.store.cvd()));
        }

        self.renderer.show_last_price = self.connected;
        let stats = self.renderer.draw(surface, bars, &self.viewport, &overlays);
        if self.show_volume_profile {
            if let Some(profile) = self.store.volume_profile() {
                self.renderer
                    .draw_volume_profile(surface, profile, &self.viewport);
            }
        }

        self.drawn_revision = Some(self.store.revision());
        self.view_changed = false;
        stats
    }

    fn has_side_split(&self) -> bool {
        self.store
            .snapshot()
            .iter()
            .any(|bar| bar.bid_volume.is_some() || bar.ask_volume.is_some())
    }

    fn is_own_symbol(&self, symbol: &str) -> bool {
        let own = symbol == self.store.key().symbol;
        if !own {
            log::debug!("Ignoring update for {symbol} on {}", self.store.key());
        }
        own
    }

    fn apply_tick(&mut self, price: f64, size: f64, time: i64) -> bool {
        match self.aggregator.apply(price, size, time) {
            TickOutcome::Opened(bar) | TickOutcome::Updated(bar) => self.merge(bar),
            TickOutcome::Rolled { closed, opened } => {
                log::debug!("{} closed bar at {}", self.store.key(), closed.time);
                self.merge(closed);
                self.merge(opened);
            }
            TickOutcome::Stale => {
                log::debug!("Dropped stale tick at {time} for {}", self.store.key());
                return false;
            }
        }
        true
    }

    /// Merges a bar and keeps the view on the same bars. If the newest bar
    /// was in view it stays at the same position.
    fn merge(&mut self, bar: Bar) {
        let len = self.store.snapshot().len();
        let following = len > 0 && self.viewport.x_to_index(self.viewport.width) >= len as i64 - 1;

        let outcome = self.store.merge_one(bar);
        let spacing = self.viewport.bar_spacing;
        match outcome {
            MergeOutcome::Inserted => self.viewport.fit_content(self.store.snapshot()),
            MergeOutcome::Appended { evicted } if following => {
                self.viewport.offset += spacing * (1.0 - evicted as f64);
            }
            MergeOutcome::Appended { evicted } | MergeOutcome::Backfilled { evicted, .. } => {
                self.viewport.offset -= spacing * evicted as f64;
            }
            MergeOutcome::UpdatedLast | MergeOutcome::Corrected { .. } => {}
        }
    }

    fn apply_supervisor(&mut self, event: SupervisorEvent) -> bool {
        let connected = match event {
            SupervisorEvent::Connected | SupervisorEvent::PushRestored => true,
            SupervisorEvent::Disconnected { .. }
            | SupervisorEvent::FallbackToPolling
            | SupervisorEvent::Exhausted
            | SupervisorEvent::Closed => false,
        };
        log::debug!("{}: {event:?}", self.store.key());
        let changed = connected != self.connected;
        self.connected = connected;
        changed
    }

    fn note(&mut self, response: InputResponse) -> InputResponse {
        if response == InputResponse::Redraw {
            self.view_changed = true;
        }
        response
    }
}

/// CVD aligned to bar times, drawn as a line in a band at the bottom of
/// the plot. `None` if no bar has a CVD sample.
fn cvd_overlay(bars: &[Bar], cvd: &[CvdDatum]) -> Option<Overlay> {
    let values: Vec<Option<f64>> = bars
        .iter()
        .map(|bar| {
            cvd.binary_search_by_key(&bar.time, |d| d.time)
                .ok()
                .map(|i| cvd[i].cumulative_delta)
        })
        .collect();
    if values.iter().all(Option::is_none) {
        return None;
    }
    let scale = ValueScale::band(&values, CVD_BAND.0, CVD_BAND.1);
    Some(Overlay::Line(OverlaySeries::new(values, scale, CVD_COLOR)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::Timeframe;
    use charter_render::RecordingSurface;

    fn session() -> ChartSession {
        let config = Config::default();
        let mut session = ChartSession::from_config(&config, 800.0, 600.0).unwrap();
        let bars = (0..200)
            .map(|i| {
                let p = 2650.0 + i as f64;
                Bar::new(i * 60, p, p + 2.0, p - 2.0, p + 1.0, 10.0)
            })
            .collect();
        session.store.replace(bars);
        session.aggregator.seed(session.store.last_bar().copied());
        session.fit_content();
        session
    }

    fn bar_event(symbol: &str, bar: Bar) -> LiveDataEvent {
        LiveDataEvent::Bar {
            symbol: symbol.to_string(),
            bar,
        }
    }

    #[test]
    fn test_from_config() {
        let session = ChartSession::from_config(&Config::default(), 800.0, 600.0).unwrap();
        assert_eq!(session.key().symbol, "XAUUSD");
        assert_eq!(session.key().timeframe, Timeframe::Min1);
        assert_eq!(session.viewport().width, 740.0);
        assert!(session.needs_redraw());
    }

    #[test]
    fn test_foreign_symbol_is_ignored() {
        let mut session = session();
        let revision = session.store().revision();
        let changed = session.apply(bar_event("EURUSD", Bar::flat(199 * 60, 1.0, 1.0)));
        assert!(!changed);
        assert_eq!(session.store().revision(), revision);
    }

    #[test]
    fn test_appended_bar_keeps_latest_in_view() {
        let mut session = session();
        let right = session.viewport().x_to_index(session.viewport().width - 1.0);
        assert_eq!(right, 199);

        // Store holds 200 of 500, so nothing is evicted.
        assert!(session.apply(bar_event("XAUUSD", Bar::flat(200 * 60, 2851.0, 1.0))));
        assert_eq!(session.store().snapshot().len(), 201);
        assert_eq!(
            session.viewport().x_to_index(session.viewport().width - 1.0),
            200
        );
    }

    #[test]
    fn test_ticks_roll_bars() {
        let mut session = session();
        assert!(session.apply(LiveDataEvent::Tick {
            symbol: "XAUUSD".into(),
            price: 2860.0,
            size: 1.0,
            time: 199 * 60 + 30,
        }));
        let last = *session.store().last_bar().unwrap();
        assert_eq!(last.time, 199 * 60);
        assert_eq!(last.close, 2860.0);
        assert_eq!(last.high, 2860.0);

        session.apply(LiveDataEvent::Tick {
            symbol: "XAUUSD".into(),
            price: 2855.0,
            size: 2.0,
            time: 200 * 60 + 1,
        });
        let bars = session.store().snapshot();
        assert_eq!(bars.len(), 201);
        assert_eq!(bars[199].close, 2860.0);
        assert_eq!(bars[200], Bar::flat(200 * 60, 2855.0, 2.0));

        // Older bucket than the in-progress bar.
        assert!(!session.apply(LiveDataEvent::Tick {
            symbol: "XAUUSD".into(),
            price: 1.0,
            size: 1.0,
            time: 10,
        }));
    }

    #[test]
    fn test_pushed_bar_reseeds_aggregator() {
        let mut session = session();
        session.apply(bar_event(
            "XAUUSD",
            Bar::new(200 * 60, 2850.0, 2870.0, 2840.0, 2865.0, 40.0),
        ));
        session.apply(LiveDataEvent::Tick {
            symbol: "XAUUSD".into(),
            price: 2875.0,
            size: 1.0,
            time: 200 * 60 + 5,
        });
        let last = session.store().last_bar().unwrap();
        assert_eq!(last.open, 2850.0);
        assert_eq!(last.high, 2875.0);
        assert_eq!(last.volume, 41.0);
    }

    #[test]
    fn test_order_flow_and_cvd_overlay() {
        let mut session = session();
        let cvd = vec![
            CvdDatum {
                time: 198 * 60,
                delta: 5.0,
                cumulative_delta: 5.0,
            },
            CvdDatum {
                time: 199 * 60,
                delta: -2.0,
                cumulative_delta: 3.0,
            },
        ];
        assert!(session.apply(LiveDataEvent::OrderFlow {
            symbol: "XAUUSD".into(),
            update: OrderFlowUpdate::Cvd(cvd),
        }));
        assert_eq!(session.store().cvd().len(), 2);

        let overlay = cvd_overlay(session.store().snapshot(), session.store().cvd()).unwrap();
        let Overlay::Line(series) = overlay else {
            panic!("expected a line overlay");
        };
        assert_eq!(series.values.len(), 200);
        assert_eq!(series.values[198], Some(5.0));
        assert_eq!(series.values[0], None);
    }

    #[test]
    fn test_draw_clears_redraw_flag() {
        let mut session = session();
        let mut surface = RecordingSurface::new(800.0, 600.0);
        assert!(session.needs_redraw());

        let stats = session.draw(&mut surface);
        assert!(stats.bars_drawn > 0);
        assert_eq!(stats.skipped, 0);
        assert!(!session.needs_redraw());

        session.apply(bar_event("XAUUSD", Bar::flat(199 * 60, 2850.0, 1.0)));
        assert!(session.needs_redraw());
    }

    #[test]
    fn test_supervisor_events_track_connection() {
        let mut session = session();
        assert!(session.apply(LiveDataEvent::Supervisor(SupervisorEvent::Connected)));
        assert!(session.is_connected());
        assert!(!session.apply(LiveDataEvent::Supervisor(SupervisorEvent::PushRestored)));
        assert!(session.apply(LiveDataEvent::Supervisor(
            SupervisorEvent::FallbackToPolling
        )));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_resize_updates_layout_and_viewport() {
        let mut session = session();
        session.draw(&mut RecordingSurface::new(800.0, 600.0));
        session.resize(1000.0, 400.0);
        assert!(session.needs_redraw());
        assert_eq!(session.viewport().width, 940.0);
        assert_eq!(session.viewport().height, 376.0);
        assert_eq!(session.viewport().x_to_index(939.0), 199);
    }
}
