//! Live data management for real-time updates.
//!
//! [`LiveDataManager`] runs the [`Supervisor`] on a tokio task: it owns the
//! push transport, the poll source and every timer, and turns inbound
//! messages into [`LiveDataEvent`]s.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use charter_core::{Bar, OrderFlowUpdate, Timeframe};
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tradeflow_api::{ClientMessage, ServerMessage, StreamEvent, WireTime};

use crate::source::{PollSource, PushTransport};
use crate::supervisor::{
    Supervisor, SupervisorAction, SupervisorConfig, SupervisorEvent, SupervisorInput,
    SupervisorState,
};
use crate::throttle::{Throttle, DEFAULT_THROTTLE};
use crate::tradeflow::{bar_from_record, cvd_from_record, footprint_from_record};
use crate::validation;

/// Settings for one live session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub timeframe: Timeframe,
    /// Symbols subscribed at start.
    pub symbols: Vec<String>,
    pub supervisor: SupervisorConfig,
    /// Minimum spacing between accepted tick or bar messages per symbol.
    pub throttle: Duration,
    /// Overrides the timeframe's poll interval.
    pub poll_interval: Option<Duration>,
    pub channel_buffer_size: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Min1,
            symbols: Vec::new(),
            supervisor: SupervisorConfig::default(),
            throttle: DEFAULT_THROTTLE,
            poll_interval: None,
            channel_buffer_size: 1000,
        }
    }
}

impl LiveConfig {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            ..Self::default()
        }
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_supervisor(mut self, supervisor: SupervisorConfig) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| self.timeframe.poll_interval())
    }
}

/// Events emitted by the live data manager.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveDataEvent {
    /// A bar from push or poll; merge with `merge_one`.
    Bar { symbol: String, bar: Bar },
    /// A trade; feed a `TickAggregator`.
    Tick {
        symbol: String,
        price: f64,
        size: f64,
        time: i64,
    },
    OrderFlow {
        symbol: String,
        update: OrderFlowUpdate,
    },
    /// A server-reported or poll error.
    Error(String),
    Supervisor(SupervisorEvent),
}

#[derive(Debug)]
enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Shutdown,
}

/// Owner handle for a running live session.
///
/// Dropping the handle shuts the session down.
#[derive(Debug)]
pub struct LiveHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl LiveHandle {
    pub fn subscribe<I, S>(&self, symbols: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(Command::Subscribe(
            symbols.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn unsubscribe<I, S>(&self, symbols: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(Command::Unsubscribe(
            symbols.into_iter().map(Into::into).collect(),
        ))
    }

    /// Stops the session and waits for the task to finish.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        // The task may already have stopped after a normal closure.
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn command(&self, command: Command) -> anyhow::Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| anyhow::anyhow!("live data task has stopped"))
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.command_tx.send(Command::Shutdown);
        }
    }
}

/// Manages live data for a set of symbols on one timeframe.
pub struct LiveDataManager<T, P> {
    config: LiveConfig,
    transport: T,
    poller: Arc<P>,
}

impl<T, P> LiveDataManager<T, P>
where
    T: PushTransport + 'static,
    P: PollSource + 'static,
{
    pub fn new(config: LiveConfig, transport: T, poller: P) -> Self {
        Self {
            config,
            transport,
            poller: Arc::new(poller),
        }
    }

    /// Spawns the session task. Must be called inside a tokio runtime.
    pub fn start(self) -> (LiveHandle, mpsc::Receiver<LiveDataEvent>) {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::channel(64);

        let driver = Driver {
            supervisor: Supervisor::new(self.config.supervisor),
            throttle: Throttle::new(self.config.throttle),
            poll_interval: self.config.poll_interval(),
            config: self.config,
            transport: Some(self.transport),
            connecting: None,
            stream: None,
            deadline: None,
            retry: None,
            poll: None,
            poller: self.poller,
            poll_tx,
            poll_rx,
            events: event_tx,
            dropped: 0,
        };
        let task = tokio::spawn(driver.run(command_rx));

        let handle = LiveHandle {
            command_tx,
            task: Some(task),
        };
        (handle, event_rx)
    }
}

/// Log every this many dropped events.
const DROP_LOG_EVERY: u64 = 100;

type ConnectFuture<T> =
    Pin<Box<dyn Future<Output = (T, anyhow::Result<mpsc::Receiver<StreamEvent>>)> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MessageKind {
    Tick,
    Bar,
}

struct Driver<T, P> {
    config: LiveConfig,
    supervisor: Supervisor,
    throttle: Throttle<(String, MessageKind)>,
    poll_interval: Duration,
    /// `None` while a connect attempt owns it.
    transport: Option<T>,
    connecting: Option<ConnectFuture<T>>,
    stream: Option<mpsc::Receiver<StreamEvent>>,
    deadline: Option<Instant>,
    retry: Option<Instant>,
    poll: Option<Interval>,
    poller: Arc<P>,
    poll_tx: mpsc::Sender<(String, anyhow::Result<Option<Bar>>)>,
    poll_rx: mpsc::Receiver<(String, anyhow::Result<Option<Bar>>)>,
    events: mpsc::Sender<LiveDataEvent>,
    /// Events lost to a full channel.
    dropped: u64,
}

impl<T, P> Driver<T, P>
where
    T: PushTransport + 'static,
    P: PollSource + 'static,
{
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let actions = self.supervisor.subscribe(self.config.symbols.clone());
        self.execute(actions).await;
        let actions = self.supervisor.start(now());
        self.execute(actions).await;

        while self.supervisor.state() != SupervisorState::Closed {
            tokio::select! {
                (transport, result) = connect_result(&mut self.connecting) => {
                    self.connecting = None;
                    self.transport = Some(transport);
                    match result {
                        Ok(stream) => self.stream = Some(stream),
                        Err(e) => {
                            log::warn!("Push connect failed: {e:#}");
                            self.apply(SupervisorInput::ConnectFailed).await;
                        }
                    }
                }
                event = next_event(&mut self.stream) => self.on_stream_event(event).await,
                command = commands.recv() => match command {
                    Some(Command::Subscribe(symbols)) => {
                        let actions = self.supervisor.subscribe(symbols);
                        self.execute(actions).await;
                    }
                    Some(Command::Unsubscribe(symbols)) => {
                        let actions = self.supervisor.unsubscribe(symbols);
                        self.execute(actions).await;
                    }
                    Some(Command::Shutdown) | None => {
                        self.apply(SupervisorInput::Shutdown).await;
                    }
                },
                () = sleep_until_opt(self.deadline) => {
                    self.deadline = None;
                    self.apply(SupervisorInput::DeadlineElapsed).await;
                }
                () = sleep_until_opt(self.retry) => {
                    self.retry = None;
                    self.apply(SupervisorInput::RetryElapsed).await;
                }
                () = poll_tick(&mut self.poll) => self.spawn_polls(),
                Some((symbol, result)) = self.poll_rx.recv() => {
                    self.on_poll_result(symbol, result);
                }
            }
        }
        log::info!("Live data task stopped");
    }

    async fn apply(&mut self, input: SupervisorInput) {
        let actions = self.supervisor.handle(input, now());
        self.execute(actions).await;
    }

    async fn execute(&mut self, actions: Vec<SupervisorAction>) {
        for action in actions {
            match action {
                SupervisorAction::Connect => self.connect(),
                SupervisorAction::ScheduleDeadline { at } => {
                    self.deadline = Some(Instant::from_std(at));
                }
                SupervisorAction::CancelDeadline => self.deadline = None,
                SupervisorAction::ScheduleRetry { at, .. } => {
                    self.retry = Some(Instant::from_std(at));
                }
                SupervisorAction::CancelRetry => self.retry = None,
                SupervisorAction::StartPoll => {
                    let mut poll = interval(self.poll_interval);
                    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.poll = Some(poll);
                }
                SupervisorAction::StopPoll => self.poll = None,
                SupervisorAction::Subscribe(symbols) => {
                    self.send(ClientMessage::subscribe(symbols)).await;
                }
                SupervisorAction::Unsubscribe(symbols) => {
                    self.send(ClientMessage::unsubscribe(symbols)).await;
                }
                SupervisorAction::CloseTransport => {
                    self.stream = None;
                    self.settle_connect().await;
                    if let Some(transport) = self.transport.as_mut() {
                        transport.close().await;
                    }
                }
                SupervisorAction::Notify(event) => {
                    self.emit(LiveDataEvent::Supervisor(event));
                }
            }
        }
    }

    fn connect(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            log::debug!("Connect requested while an attempt is in flight");
            return;
        };
        self.stream = None;
        self.connecting = Some(
            async move {
                let result = transport.connect().await;
                (transport, result)
            }
            .boxed(),
        );
    }

    /// Waits for an in-flight attempt, up to the connect deadline, so its
    /// transport can be closed.
    async fn settle_connect(&mut self) {
        let Some(attempt) = self.connecting.take() else {
            return;
        };
        match timeout(self.config.supervisor.connect_deadline, attempt).await {
            Ok((transport, _)) => self.transport = Some(transport),
            Err(_) => log::warn!("Abandoned a connect attempt that did not settle"),
        }
    }

    async fn send(&mut self, message: ClientMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let action = message.action;
        if let Err(e) = transport.send(message).await {
            log::warn!("Failed to send {action:?}: {e:#}");
        }
    }

    async fn on_stream_event(&mut self, event: Option<StreamEvent>) {
        match event {
            Some(StreamEvent::Opened) => self.apply(SupervisorInput::Opened).await,
            Some(StreamEvent::Message(message)) => self.on_message(message),
            Some(StreamEvent::Closed { code }) => {
                self.stream = None;
                self.apply(SupervisorInput::Closed { code }).await;
            }
            None => {
                self.stream = None;
                self.apply(SupervisorInput::Closed { code: None }).await;
            }
        }
    }

    fn on_message(&mut self, message: ServerMessage) {
        let symbol = self.resolve_symbol(message.symbol());
        match message {
            ServerMessage::Tick { data, timestamp, .. } => {
                let Some(symbol) = symbol else {
                    return;
                };
                let size = data.size.unwrap_or(0.0);
                if !validation::validate_tick(data.price, size) {
                    log::warn!("Dropped invalid tick for {symbol}: {}", data.price);
                    return;
                }
                if !self.admit(&symbol, MessageKind::Tick) {
                    return;
                }
                let time = data
                    .time
                    .as_ref()
                    .or(timestamp.as_ref())
                    .and_then(WireTime::unix_seconds)
                    .unwrap_or_else(|| chrono::Utc::now().timestamp());
                self.emit(LiveDataEvent::Tick {
                    symbol,
                    price: data.price,
                    size,
                    time,
                });
            }
            ServerMessage::Bar { data, .. } => {
                let Some(symbol) = symbol else {
                    return;
                };
                if let Some(tf) = data.timeframe.as_deref() {
                    if tf.parse::<Timeframe>().ok() != Some(self.config.timeframe) {
                        log::debug!("Ignoring {tf} bar for {symbol}");
                        return;
                    }
                }
                let Some(bar) = bar_from_record(&data) else {
                    log::warn!("Dropped invalid bar for {symbol}");
                    return;
                };
                if !self.admit(&symbol, MessageKind::Bar) {
                    return;
                }
                self.emit(LiveDataEvent::Bar { symbol, bar });
            }
            ServerMessage::Cvd { data, .. } => {
                let Some(symbol) = symbol else {
                    return;
                };
                let cvd: Vec<_> = data.iter().filter_map(cvd_from_record).collect();
                if !cvd.is_empty() {
                    self.emit(LiveDataEvent::OrderFlow {
                        symbol,
                        update: OrderFlowUpdate::Cvd(cvd),
                    });
                }
            }
            ServerMessage::Footprint { data, .. } => {
                let Some(symbol) = symbol else {
                    return;
                };
                if let Some(footprint) = footprint_from_record(&data) {
                    self.emit(LiveDataEvent::OrderFlow {
                        symbol,
                        update: OrderFlowUpdate::FootprintPush(footprint),
                    });
                }
            }
            ServerMessage::Error { message } => {
                log::warn!("Server error: {message}");
                self.emit(LiveDataEvent::Error(message));
            }
            ServerMessage::Connected => log::info!("Server acknowledged session"),
            ServerMessage::Disconnected { reason } => {
                log::info!("Server is disconnecting: {}", reason.unwrap_or_default());
            }
            ServerMessage::Ack { status, symbols } => {
                log::debug!("Server ack {status}: {symbols:?}");
            }
            ServerMessage::Pong => {}
        }
    }

    /// Picks the message symbol, or the only subscription when the message
    /// omits it. Messages for unsubscribed symbols are dropped.
    fn resolve_symbol(&self, symbol: Option<&str>) -> Option<String> {
        let symbols = self.supervisor.symbols();
        match symbol {
            Some(symbol) if symbols.contains(symbol) => Some(symbol.to_string()),
            Some(symbol) => {
                log::debug!("Ignoring message for unsubscribed {symbol}");
                None
            }
            None if symbols.len() == 1 => symbols.iter().next().cloned(),
            None => None,
        }
    }

    fn admit(&mut self, symbol: &str, kind: MessageKind) -> bool {
        let accepted = self
            .throttle
            .accept((symbol.to_string(), kind), Instant::now());
        if !accepted {
            log::debug!("Throttled {kind:?} for {symbol}");
        }
        accepted
    }

    fn spawn_polls(&self) {
        for symbol in self.supervisor.symbols() {
            let symbol = symbol.clone();
            let poller = Arc::clone(&self.poller);
            let tx = self.poll_tx.clone();
            let timeframe = self.config.timeframe;
            tokio::spawn(async move {
                let result = poller.latest_bar(&symbol, timeframe).await;
                let _ = tx.send((symbol, result)).await;
            });
        }
    }

    fn on_poll_result(&mut self, symbol: String, result: anyhow::Result<Option<Bar>>) {
        if !self.supervisor.is_polling() || !self.supervisor.symbols().contains(&symbol) {
            return;
        }
        match result {
            Ok(Some(bar)) => self.emit(LiveDataEvent::Bar { symbol, bar }),
            Ok(None) => log::debug!("Poll returned no bar for {symbol}"),
            Err(e) => {
                log::warn!("Poll for {symbol} failed: {e:#}");
                self.emit(LiveDataEvent::Error(format!("poll {symbol}: {e:#}")));
            }
        }
    }

    /// Never waits on the consumer; events that do not fit are dropped.
    fn emit(&mut self, event: LiveDataEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped += 1;
                if self.dropped % DROP_LOG_EVERY == 1 {
                    log::warn!(
                        "Live event channel full, dropped {} events (latest {event:?})",
                        self.dropped
                    );
                }
            }
            Err(TrySendError::Closed(_)) => log::debug!("Live event receiver dropped"),
        }
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

async fn connect_result<T>(
    connecting: &mut Option<ConnectFuture<T>>,
) -> (T, anyhow::Result<mpsc::Receiver<StreamEvent>>) {
    match connecting {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_event(stream: &mut Option<mpsc::Receiver<StreamEvent>>) -> Option<StreamEvent> {
    match stream {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn poll_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_follows_timeframe() {
        assert_eq!(
            LiveConfig::new(Timeframe::Sec5).poll_interval(),
            Duration::from_millis(1000)
        );
        assert_eq!(
            LiveConfig::new(Timeframe::Hour1).poll_interval(),
            Duration::from_millis(30_000)
        );
        let config = LiveConfig {
            poll_interval: Some(Duration::from_millis(250)),
            ..LiveConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }
}
