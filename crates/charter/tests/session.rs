//! Chart session wiring with in-memory history, transport and poll fakes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use charter::ChartSession;
use charter_config::Config;
use charter_core::{
    Bar, BarImbalances, CvdDatum, FootprintBar, ImbalanceSide, PriceLevel, Timeframe,
    VolumeProfile,
};
use charter_data::{
    HistoricalSource, LiveConfig, LiveDataEvent, PollSource, PushTransport, SupervisorEvent,
};
use charter_render::RecordingSurface;
use tokio::sync::mpsc;
use tradeflow_api::{ClientMessage, ServerMessage, StreamEvent};

struct FakeHistory {
    bars: Vec<Bar>,
    fail_bars: bool,
    has_cvd: bool,
    footprint: Vec<FootprintBar>,
    imbalances: Option<Vec<BarImbalances>>,
}

#[async_trait]
impl HistoricalSource for FakeHistory {
    async fn load_bars(&self, _: &str, _: Timeframe, limit: u32) -> anyhow::Result<Vec<Bar>> {
        if self.fail_bars {
            anyhow::bail!("backend unavailable");
        }
        // Newest first, as the backend returns them.
        Ok(self.bars.iter().rev().take(limit as usize).copied().collect())
    }

    async fn load_cvd(&self, _: &str, _: Timeframe, _: u32) -> anyhow::Result<Vec<CvdDatum>> {
        if !self.has_cvd {
            anyhow::bail!("cvd not computed");
        }
        let mut total = 0.0;
        Ok(self
            .bars
            .iter()
            .map(|bar| {
                total += 1.0;
                CvdDatum {
                    time: bar.time,
                    delta: 1.0,
                    cumulative_delta: total,
                }
            })
            .collect())
    }

    async fn load_footprint(
        &self,
        _: &str,
        _: Timeframe,
        _: u32,
    ) -> anyhow::Result<Vec<FootprintBar>> {
        if self.footprint.is_empty() {
            anyhow::bail!("footprint not computed");
        }
        Ok(self.footprint.clone())
    }

    async fn load_imbalances(
        &self,
        _: &str,
        _: Timeframe,
        _: u32,
        _: f64,
    ) -> anyhow::Result<Vec<BarImbalances>> {
        self.imbalances
            .clone()
            .ok_or_else(|| anyhow::anyhow!("imbalances not computed"))
    }

    async fn load_volume_profile(&self, _: &str) -> anyhow::Result<VolumeProfile> {
        anyhow::bail!("no trades")
    }
}

fn history(len: i64) -> FakeHistory {
    FakeHistory {
        bars: (0..len)
            .map(|i| {
                let p = 2650.0 + i as f64 * 0.5;
                Bar::new(i * 60, p, p + 1.0, p - 1.0, p + 0.25, 12.0)
            })
            .collect(),
        fail_bars: false,
        has_cvd: true,
        footprint: Vec::new(),
        imbalances: Some(Vec::new()),
    }
}

#[derive(Default)]
struct Shared {
    closes: usize,
    sent: Vec<ClientMessage>,
    server: Option<mpsc::Sender<StreamEvent>>,
}

#[derive(Clone, Default)]
struct FakeTransport {
    shared: Arc<Mutex<Shared>>,
}

impl FakeTransport {
    fn push_json(&self, text: &str) {
        let server = self.shared.lock().unwrap().server.clone();
        server
            .expect("not connected")
            .try_send(StreamEvent::Message(ServerMessage::parse(text).unwrap()))
            .unwrap();
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&mut self) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
        let (tx, rx) = mpsc::channel(64);
        tx.try_send(StreamEvent::Opened).unwrap();
        self.shared.lock().unwrap().server = Some(tx);
        Ok(rx)
    }

    async fn send(&mut self, message: ClientMessage) -> anyhow::Result<()> {
        self.shared.lock().unwrap().sent.push(message);
        Ok(())
    }

    async fn close(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        shared.closes += 1;
        shared.server = None;
    }
}

struct IdlePoller;

#[async_trait]
impl PollSource for IdlePoller {
    async fn latest_bar(&self, _: &str, _: Timeframe) -> anyhow::Result<Option<Bar>> {
        Ok(None)
    }
}

fn new_session() -> ChartSession {
    ChartSession::from_config(&Config::default(), 800.0, 600.0).unwrap()
}

/// Applies events until `done` holds for the session.
async fn pump(
    session: &mut ChartSession,
    events: &mut mpsc::Receiver<LiveDataEvent>,
    done: impl Fn(&ChartSession) -> bool,
) {
    let run = async {
        while !done(&*session) {
            let event = events.recv().await.expect("live feed ended early");
            session.apply(event);
        }
    };
    tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("timed out applying live events");
}

#[tokio::test]
async fn test_history_is_sorted_capped_and_fitted() {
    let mut session = new_session();
    session.load_history(&history(700), 700).await.unwrap();

    let bars = session.store().snapshot();
    assert_eq!(bars.len(), 500);
    assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
    assert_eq!(bars[499].time, 699 * 60);

    // Order flow that failed to load stays empty; the rest is kept.
    assert_eq!(session.store().cvd().len(), 500);
    assert!(session.store().footprint().is_empty());
    assert!(session.store().volume_profile().is_none());

    let viewport = session.viewport();
    assert_eq!(viewport.x_to_index(viewport.width - 1.0), 499);
}

#[tokio::test]
async fn test_history_failure_is_reported() {
    let mut session = new_session();
    let source = FakeHistory {
        fail_bars: true,
        ..history(10)
    };
    let err = session.load_history(&source, 500).await.unwrap_err();
    assert!(format!("{err:#}").contains("backend unavailable"));
    assert!(session.store().snapshot().is_empty());
}

#[tokio::test]
async fn test_order_flow_is_derived_locally_when_backend_lacks_it() {
    let mut session = new_session();
    let base = history(20);
    let last_time = 19 * 60;
    let source = FakeHistory {
        bars: base
            .bars
            .iter()
            .map(|bar| bar.with_order_flow(4.0, 6.0))
            .collect(),
        has_cvd: false,
        footprint: vec![FootprintBar::new(
            last_time,
            vec![
                PriceLevel::new(2660.0, 1.0, 9.0),
                PriceLevel::new(2659.5, 2.0, 1.0),
            ],
        )],
        imbalances: None,
        ..base
    };
    session.load_history(&source, 500).await.unwrap();

    let cvd = session.store().cvd();
    assert_eq!(cvd.len(), 20);
    assert_eq!(cvd[19].cumulative_delta, 40.0);

    let found = session.store().imbalances_at(last_time).unwrap();
    assert_eq!(found.imbalances.len(), 1);
    assert_eq!(found.imbalances[0].side, ImbalanceSide::Buy);

    let x = session.viewport().index_to_x(19.0);
    session.handle_cursor_moved(x, 100.0);
    assert_eq!(session.hovered_bar().map(|bar| bar.time), Some(last_time));
    assert_eq!(
        session.hovered_imbalances().map(|found| found.time),
        Some(last_time)
    );
}

#[tokio::test]
async fn test_backend_imbalances_are_stored() {
    let mut session = new_session();
    let source = FakeHistory {
        imbalances: Some(vec![BarImbalances {
            time: 120,
            imbalances: Vec::new(),
        }]),
        ..history(10)
    };
    session.load_history(&source, 500).await.unwrap();
    assert_eq!(session.store().imbalances().len(), 1);
    assert!(session.store().imbalances_at(120).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_live_bar_reaches_the_store_and_redraws() {
    let mut session = new_session();
    session.load_history(&history(100), 500).await.unwrap();
    let mut surface = RecordingSurface::new(800.0, 600.0);
    session.draw(&mut surface);
    assert!(!session.needs_redraw());

    let transport = FakeTransport::default();
    let mut events = session.start_live(LiveConfig::default(), transport.clone(), IdlePoller);
    pump(&mut session, &mut events, ChartSession::is_connected).await;

    let subscribed: Vec<String> = transport
        .shared
        .lock()
        .unwrap()
        .sent
        .iter()
        .flat_map(|m| m.symbols.clone())
        .collect();
    assert_eq!(subscribed, vec!["XAUUSD".to_string()]);

    transport.push_json(
        r#"{"type":"bar","symbol":"XAUUSD","data":{"time":6000,"open":2700,"high":2702,"low":2699,"close":2701,"volume":5,"timeframe":"1m"}}"#,
    );
    pump(&mut session, &mut events, |s| s.store().snapshot().len() == 101).await;

    let last = session.store().last_bar().unwrap();
    assert_eq!(last.time, 6000);
    assert_eq!(last.close, 2701.0);
    assert!(session.needs_redraw());

    let stats = session.draw(&mut surface);
    assert!(stats.visible.contains(&100));

    session.shutdown().await.unwrap();
    assert!(!session.is_live());
    assert_eq!(transport.shared.lock().unwrap().closes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_feed_symbols_follow_the_session() {
    let mut session = new_session();
    let transport = FakeTransport::default();
    let config = LiveConfig::new(Timeframe::Hour4).with_symbols(["BTCUSD"]);
    let mut events = session.start_live(config, transport.clone(), IdlePoller);
    pump(&mut session, &mut events, ChartSession::is_connected).await;

    let sent = transport.shared.lock().unwrap().sent.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].symbols, vec!["XAUUSD".to_string()]);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_supervisor_exhaustion_hides_last_price() {
    let mut session = new_session();
    session.apply(LiveDataEvent::Supervisor(SupervisorEvent::Connected));
    assert!(session.is_connected());
    session.apply(LiveDataEvent::Supervisor(SupervisorEvent::Exhausted));
    assert!(!session.is_connected());
}
