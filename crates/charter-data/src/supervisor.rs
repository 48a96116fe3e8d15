//! Connection resilience state machine.
//!
//! [`Supervisor`] decides when to connect, reconnect, fall back to polling
//! and replay subscriptions. It performs no I/O and owns no timers: callers
//! feed it [`SupervisorInput`]s stamped with the current time and carry out
//! the returned [`SupervisorAction`]s.
//!
//! At most one data source is live at a time. While the push connection is
//! open polling is stopped, and polling only runs while push is down.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// WebSocket close code for an intentional shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Timing and retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How long to wait for the push connection before polling.
    pub connect_deadline: Duration,
    /// Delay before the first reconnect attempt; doubles each attempt.
    pub backoff_base: Duration,
    /// Reconnect attempts before push is abandoned.
    pub max_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            connect_deadline: Duration::from_millis(5000),
            backoff_base: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }
}

impl SupervisorConfig {
    /// Delay before reconnect attempt `attempt` (zero based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Which source is delivering data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveSource {
    Push,
    Poll,
}

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// First connection attempt in progress.
    Establishing,
    Live(LiveSource),
    /// Waiting to retry the push connection.
    Backoff { attempt: u32, resume_at: Instant },
    /// Push abandoned; polling for the rest of the session.
    Exhausted,
    /// Shut down or closed normally. Terminal.
    Closed,
}

/// Things that happen to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorInput {
    /// The push connection completed its handshake.
    Opened,
    /// The push connection ended.
    Closed { code: Option<u16> },
    /// A connect attempt failed before opening.
    ConnectFailed,
    /// The connect deadline fired.
    DeadlineElapsed,
    /// The backoff timer fired.
    RetryElapsed,
    /// The owner is done with this session.
    Shutdown,
}

/// Advisory notifications for the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    Connected,
    Disconnected { code: Option<u16> },
    FallbackToPolling,
    PushRestored,
    Exhausted,
    Closed,
}

/// Work the caller must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Start a push connection attempt.
    Connect,
    ScheduleDeadline { at: Instant },
    CancelDeadline,
    ScheduleRetry { attempt: u32, at: Instant },
    CancelRetry,
    StartPoll,
    StopPoll,
    /// Send a subscribe message for these symbols.
    Subscribe(Vec<String>),
    /// Send an unsubscribe message for these symbols.
    Unsubscribe(Vec<String>),
    /// Close the push connection with a normal closure.
    CloseTransport,
    Notify(SupervisorEvent),
}

/// Pure connection resilience state machine.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    symbols: BTreeSet<String>,
    started: bool,
    closed: bool,
    exhausted: bool,
    connecting: bool,
    push_open: bool,
    polling: bool,
    deadline: Option<Instant>,
    retry: Option<(u32, Instant)>,
    /// Attempt number of the last retry scheduled since push was last open.
    last_attempt: Option<u32>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            symbols: BTreeSet::new(),
            started: false,
            closed: false,
            exhausted: false,
            connecting: false,
            push_open: false,
            polling: false,
            deadline: None,
            retry: None,
            last_attempt: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        if self.closed {
            SupervisorState::Closed
        } else if self.push_open {
            SupervisorState::Live(LiveSource::Push)
        } else if self.exhausted {
            SupervisorState::Exhausted
        } else if self.polling {
            SupervisorState::Live(LiveSource::Poll)
        } else if let Some((attempt, resume_at)) = self.retry {
            SupervisorState::Backoff { attempt, resume_at }
        } else {
            SupervisorState::Establishing
        }
    }

    /// The authoritative subscription set.
    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn is_push_open(&self) -> bool {
        self.push_open
    }

    /// Pending retry as `(attempt, resume_at)`, also while polling.
    pub fn pending_retry(&self) -> Option<(u32, Instant)> {
        self.retry
    }

    /// Whether any timer (deadline, retry or poll interval) is armed.
    pub fn has_pending_timers(&self) -> bool {
        self.deadline.is_some() || self.retry.is_some() || self.polling
    }

    /// Begins the first connection attempt and arms the connect deadline.
    pub fn start(&mut self, now: Instant) -> Vec<SupervisorAction> {
        if self.started || self.closed {
            return Vec::new();
        }
        self.started = true;
        self.connecting = true;

        let mut actions = vec![SupervisorAction::Connect];
        self.arm_deadline(now, &mut actions);
        log::info!("supervisor: connecting");
        actions
    }

    /// Adds symbols; sends a subscribe for the newly added ones if push is open.
    pub fn subscribe<I, S>(&mut self, symbols: I) -> Vec<SupervisorAction>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.closed {
            return Vec::new();
        }
        let added: Vec<String> = symbols
            .into_iter()
            .map(Into::into)
            .filter(|s| self.symbols.insert(s.clone()))
            .collect();

        if self.push_open && !added.is_empty() {
            vec![SupervisorAction::Subscribe(added)]
        } else {
            Vec::new()
        }
    }

    /// Removes symbols; sends an unsubscribe for the removed ones if push is open.
    pub fn unsubscribe<I, S>(&mut self, symbols: I) -> Vec<SupervisorAction>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.closed {
            return Vec::new();
        }
        let removed: Vec<String> = symbols
            .into_iter()
            .map(Into::into)
            .filter(|s| self.symbols.remove(s))
            .collect();

        if self.push_open && !removed.is_empty() {
            vec![SupervisorAction::Unsubscribe(removed)]
        } else {
            Vec::new()
        }
    }

    /// Applies one input at time `now`.
    pub fn handle(&mut self, input: SupervisorInput, now: Instant) -> Vec<SupervisorAction> {
        if self.closed {
            return Vec::new();
        }

        let mut actions = Vec::new();
        match input {
            SupervisorInput::Opened => self.on_opened(&mut actions),
            SupervisorInput::Closed { code } => self.on_closed(code, now, &mut actions),
            SupervisorInput::ConnectFailed => self.on_connect_failed(now, &mut actions),
            SupervisorInput::DeadlineElapsed => self.on_deadline(&mut actions),
            SupervisorInput::RetryElapsed => self.on_retry(&mut actions),
            SupervisorInput::Shutdown => self.on_shutdown(&mut actions),
        }

        debug_assert!(
            !(self.push_open && self.polling),
            "push and poll live at the same time"
        );
        actions
    }

    fn on_opened(&mut self, actions: &mut Vec<SupervisorAction>) {
        if self.exhausted || self.push_open {
            return;
        }
        self.connecting = false;
        self.push_open = true;
        self.last_attempt = None;

        if self.deadline.take().is_some() {
            actions.push(SupervisorAction::CancelDeadline);
        }
        if self.retry.take().is_some() {
            actions.push(SupervisorAction::CancelRetry);
        }
        let restored = self.polling;
        if restored {
            self.polling = false;
            actions.push(SupervisorAction::StopPoll);
        }
        if !self.symbols.is_empty() {
            actions.push(SupervisorAction::Subscribe(
                self.symbols.iter().cloned().collect(),
            ));
        }

        actions.push(SupervisorAction::Notify(SupervisorEvent::Connected));
        if restored {
            log::info!("supervisor: push restored, polling stopped");
            actions.push(SupervisorAction::Notify(SupervisorEvent::PushRestored));
        } else {
            log::info!("supervisor: push connected");
        }
    }

    fn on_closed(
        &mut self,
        code: Option<u16>,
        now: Instant,
        actions: &mut Vec<SupervisorAction>,
    ) {
        if !self.push_open {
            if self.connecting {
                self.on_connect_failed(now, actions);
            }
            return;
        }
        self.push_open = false;

        if code == Some(NORMAL_CLOSURE) {
            log::info!("supervisor: push closed normally");
            self.close_all(actions);
            return;
        }

        log::info!("supervisor: push lost (code {code:?}), reconnecting");
        actions.push(SupervisorAction::Notify(SupervisorEvent::Disconnected { code }));
        self.arm_deadline(now, actions);
        self.schedule_retry(0, now, actions);
    }

    fn on_connect_failed(&mut self, now: Instant, actions: &mut Vec<SupervisorAction>) {
        if !self.connecting || self.exhausted {
            return;
        }
        self.connecting = false;

        let attempt = self.last_attempt.map_or(0, |a| a + 1);
        if attempt >= self.config.max_attempts {
            self.exhaust(actions);
        } else {
            self.schedule_retry(attempt, now, actions);
        }
    }

    fn on_deadline(&mut self, actions: &mut Vec<SupervisorAction>) {
        if self.deadline.take().is_none() {
            return;
        }
        if !self.push_open && !self.polling {
            log::info!("supervisor: push not open by deadline, polling");
            self.polling = true;
            actions.push(SupervisorAction::StartPoll);
            actions.push(SupervisorAction::Notify(SupervisorEvent::FallbackToPolling));
        }
    }

    fn on_retry(&mut self, actions: &mut Vec<SupervisorAction>) {
        if self.retry.take().is_none() || self.push_open {
            return;
        }
        self.connecting = true;
        actions.push(SupervisorAction::Connect);
    }

    fn on_shutdown(&mut self, actions: &mut Vec<SupervisorAction>) {
        log::info!("supervisor: shutdown");
        self.close_all(actions);
    }

    fn close_all(&mut self, actions: &mut Vec<SupervisorAction>) {
        if self.deadline.take().is_some() {
            actions.push(SupervisorAction::CancelDeadline);
        }
        if self.retry.take().is_some() {
            actions.push(SupervisorAction::CancelRetry);
        }
        if self.polling {
            self.polling = false;
            actions.push(SupervisorAction::StopPoll);
        }
        self.push_open = false;
        self.connecting = false;
        self.closed = true;
        actions.push(SupervisorAction::CloseTransport);
        actions.push(SupervisorAction::Notify(SupervisorEvent::Closed));
    }

    fn arm_deadline(&mut self, now: Instant, actions: &mut Vec<SupervisorAction>) {
        if self.polling {
            return;
        }
        let at = now + self.config.connect_deadline;
        self.deadline = Some(at);
        actions.push(SupervisorAction::ScheduleDeadline { at });
    }

    fn schedule_retry(
        &mut self,
        attempt: u32,
        now: Instant,
        actions: &mut Vec<SupervisorAction>,
    ) {
        let at = now + self.config.backoff_delay(attempt);
        self.retry = Some((attempt, at));
        self.last_attempt = Some(attempt);
        log::info!(
            "supervisor: retry {} in {:?}",
            attempt,
            self.config.backoff_delay(attempt)
        );
        actions.push(SupervisorAction::ScheduleRetry { attempt, at });
    }

    fn exhaust(&mut self, actions: &mut Vec<SupervisorAction>) {
        log::info!("supervisor: reconnect attempts exhausted, polling for the session");
        self.exhausted = true;
        if self.deadline.take().is_some() {
            actions.push(SupervisorAction::CancelDeadline);
        }
        if !self.polling {
            self.polling = true;
            actions.push(SupervisorAction::StartPoll);
            actions.push(SupervisorAction::Notify(SupervisorEvent::FallbackToPolling));
        }
        actions.push(SupervisorAction::Notify(SupervisorEvent::Exhausted));
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> (Supervisor, Instant) {
        let now = Instant::now();
        let mut sup = Supervisor::default();
        sup.subscribe(["XAUUSD"]);
        sup.start(now);
        (sup, now)
    }

    #[test]
    fn test_start_connects_and_arms_deadline() {
        let now = Instant::now();
        let mut sup = Supervisor::default();
        let actions = sup.start(now);
        assert_eq!(
            actions,
            vec![
                SupervisorAction::Connect,
                SupervisorAction::ScheduleDeadline {
                    at: now + Duration::from_millis(5000)
                },
            ]
        );
        assert_eq!(sup.state(), SupervisorState::Establishing);
        assert!(sup.start(now).is_empty());
    }

    #[test]
    fn test_open_replays_subscriptions() {
        let (mut sup, now) = started();
        let actions = sup.handle(SupervisorInput::Opened, now);
        assert!(actions.contains(&SupervisorAction::CancelDeadline));
        assert!(actions.contains(&SupervisorAction::Subscribe(vec!["XAUUSD".into()])));
        assert_eq!(sup.state(), SupervisorState::Live(LiveSource::Push));
    }

    #[test]
    fn test_incremental_subscribe_only_sends_new_symbols() {
        let (mut sup, now) = started();
        sup.handle(SupervisorInput::Opened, now);

        assert_eq!(
            sup.subscribe(["XAUUSD", "EURUSD"]),
            vec![SupervisorAction::Subscribe(vec!["EURUSD".into()])]
        );
        assert_eq!(
            sup.unsubscribe(["GBPUSD", "XAUUSD"]),
            vec![SupervisorAction::Unsubscribe(vec!["XAUUSD".into()])]
        );
        assert_eq!(sup.symbols().len(), 1);
    }

    #[test]
    fn test_subscribe_while_down_is_deferred() {
        let (mut sup, _) = started();
        assert!(sup.subscribe(["EURUSD"]).is_empty());
        assert!(sup.symbols().contains("EURUSD"));
    }

    #[test]
    fn test_normal_close_is_terminal() {
        let (mut sup, now) = started();
        sup.handle(SupervisorInput::Opened, now);
        let actions = sup.handle(SupervisorInput::Closed { code: Some(1000) }, now);
        assert!(actions.contains(&SupervisorAction::Notify(SupervisorEvent::Closed)));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, SupervisorAction::ScheduleRetry { .. })));
        assert_eq!(sup.state(), SupervisorState::Closed);
        assert!(sup.handle(SupervisorInput::RetryElapsed, now).is_empty());
    }

    #[test]
    fn test_close_during_handshake_counts_as_failure() {
        let (mut sup, now) = started();
        let actions = sup.handle(SupervisorInput::Closed { code: None }, now);
        assert!(actions.contains(&SupervisorAction::ScheduleRetry {
            attempt: 0,
            at: now + Duration::from_millis(1000),
        }));
    }

    #[test]
    fn test_stale_timers_are_ignored() {
        let (mut sup, now) = started();
        sup.handle(SupervisorInput::Opened, now);
        assert!(sup.handle(SupervisorInput::DeadlineElapsed, now).is_empty());
        assert!(sup.handle(SupervisorInput::RetryElapsed, now).is_empty());
        assert_eq!(sup.state(), SupervisorState::Live(LiveSource::Push));
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let config = SupervisorConfig::default();
        let delays: Vec<u128> = (0..5).map(|a| config.backoff_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }
}
