//! Transition tests for the connection supervisor.

use std::time::{Duration, Instant};

use charter_data::supervisor::{
    LiveSource, Supervisor, SupervisorAction, SupervisorEvent, SupervisorInput, SupervisorState,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn subscribes(actions: &[SupervisorAction]) -> Vec<Vec<String>> {
    actions
        .iter()
        .filter_map(|a| match a {
            SupervisorAction::Subscribe(symbols) => Some(symbols.clone()),
            _ => None,
        })
        .collect()
}

fn retry_of(actions: &[SupervisorAction]) -> Option<(u32, Instant)> {
    actions.iter().find_map(|a| match a {
        SupervisorAction::ScheduleRetry { attempt, at } => Some((*attempt, *at)),
        _ => None,
    })
}

fn live_push(now: Instant) -> Supervisor {
    let mut sup = Supervisor::default();
    sup.subscribe(["XAUUSD"]);
    sup.start(now);
    sup.handle(SupervisorInput::Opened, now);
    sup
}

#[test]
fn test_abnormal_close_reconnects_and_replays_once() {
    let t0 = Instant::now();
    let mut sup = live_push(t0);

    let actions = sup.handle(SupervisorInput::Closed { code: Some(1006) }, t0);
    assert_eq!(retry_of(&actions), Some((0, t0 + ms(1000))));
    assert_eq!(
        sup.state(),
        SupervisorState::Backoff {
            attempt: 0,
            resume_at: t0 + ms(1000)
        }
    );
    assert!(actions.contains(&SupervisorAction::Notify(SupervisorEvent::Disconnected {
        code: Some(1006)
    })));

    // First retry fails.
    let t1 = t0 + ms(1000);
    assert_eq!(
        sup.handle(SupervisorInput::RetryElapsed, t1),
        vec![SupervisorAction::Connect]
    );
    let actions = sup.handle(SupervisorInput::ConnectFailed, t1);
    assert_eq!(retry_of(&actions), Some((1, t1 + ms(2000))));
    assert!(subscribes(&actions).is_empty());

    // Second retry succeeds.
    let t2 = t1 + ms(2000);
    sup.handle(SupervisorInput::RetryElapsed, t2);
    let actions = sup.handle(SupervisorInput::Opened, t2);
    assert_eq!(subscribes(&actions), vec![vec!["XAUUSD".to_string()]]);
    assert_eq!(sup.state(), SupervisorState::Live(LiveSource::Push));
}

#[test]
fn test_backoff_schedule_stops_after_five_attempts() {
    let mut now = Instant::now();
    let mut sup = live_push(now);

    let mut actions = sup.handle(SupervisorInput::Closed { code: None }, now);
    let mut delays = Vec::new();
    loop {
        let Some((attempt, at)) = retry_of(&actions) else {
            break;
        };
        assert_eq!(attempt as usize, delays.len());
        delays.push((at - now).as_millis());
        now = at;
        sup.handle(SupervisorInput::RetryElapsed, now);
        actions = sup.handle(SupervisorInput::ConnectFailed, now);
    }

    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    assert!(actions.contains(&SupervisorAction::Notify(SupervisorEvent::Exhausted)));
    assert_eq!(sup.state(), SupervisorState::Exhausted);
    assert!(sup.is_polling());
    assert!(sup.pending_retry().is_none());
    assert!(sup.handle(SupervisorInput::RetryElapsed, now).is_empty());
}

#[test]
fn test_deadline_falls_back_to_polling_then_push_restores() {
    let t0 = Instant::now();
    let mut sup = Supervisor::default();
    sup.subscribe(["XAUUSD"]);
    sup.start(t0);

    // Initial connect fails; deadline stays armed.
    let actions = sup.handle(SupervisorInput::ConnectFailed, t0 + ms(100));
    assert_eq!(retry_of(&actions), Some((0, t0 + ms(1100))));
    assert!(!actions.contains(&SupervisorAction::CancelDeadline));

    sup.handle(SupervisorInput::RetryElapsed, t0 + ms(1100));
    let actions = sup.handle(SupervisorInput::DeadlineElapsed, t0 + ms(5000));
    assert_eq!(
        actions,
        vec![
            SupervisorAction::StartPoll,
            SupervisorAction::Notify(SupervisorEvent::FallbackToPolling),
        ]
    );
    assert_eq!(sup.state(), SupervisorState::Live(LiveSource::Poll));

    let actions = sup.handle(SupervisorInput::Opened, t0 + ms(7000));
    assert!(actions.contains(&SupervisorAction::StopPoll));
    assert!(actions.contains(&SupervisorAction::Notify(SupervisorEvent::PushRestored)));
    assert!(!sup.is_polling());
    assert!(sup.is_push_open());
}

#[test]
fn test_never_push_and_poll_together() {
    let t0 = Instant::now();
    let mut sup = Supervisor::default();
    sup.start(t0);

    let script = [
        SupervisorInput::ConnectFailed,
        SupervisorInput::DeadlineElapsed,
        SupervisorInput::RetryElapsed,
        SupervisorInput::Opened,
        SupervisorInput::Closed { code: Some(1011) },
        SupervisorInput::DeadlineElapsed,
        SupervisorInput::RetryElapsed,
        SupervisorInput::Opened,
        SupervisorInput::DeadlineElapsed,
    ];
    for (i, input) in script.into_iter().enumerate() {
        sup.handle(input, t0 + ms(1000 * i as u64));
        assert!(!(sup.is_push_open() && sup.is_polling()), "after {input:?}");
    }
    assert_eq!(sup.state(), SupervisorState::Live(LiveSource::Push));
}

#[test]
fn test_shutdown_cancels_every_timer() {
    let t0 = Instant::now();
    let mut sup = Supervisor::default();
    sup.subscribe(["XAUUSD"]);
    sup.start(t0);
    sup.handle(SupervisorInput::ConnectFailed, t0);
    sup.handle(SupervisorInput::DeadlineElapsed, t0 + ms(5000));
    assert!(sup.has_pending_timers());

    let actions = sup.handle(SupervisorInput::Shutdown, t0 + ms(5001));
    assert_eq!(
        actions,
        vec![
            SupervisorAction::CancelRetry,
            SupervisorAction::StopPoll,
            SupervisorAction::CloseTransport,
            SupervisorAction::Notify(SupervisorEvent::Closed),
        ]
    );
    assert!(!sup.has_pending_timers());
    assert_eq!(sup.state(), SupervisorState::Closed);

    // Late events are ignored.
    assert!(sup.handle(SupervisorInput::RetryElapsed, t0 + ms(6000)).is_empty());
    assert!(sup.handle(SupervisorInput::Opened, t0 + ms(6000)).is_empty());
    assert!(sup.subscribe(["EURUSD"]).is_empty());
}

#[test]
fn test_shutdown_while_establishing_cancels_deadline() {
    let t0 = Instant::now();
    let mut sup = Supervisor::default();
    sup.start(t0);
    let actions = sup.handle(SupervisorInput::Shutdown, t0);
    assert_eq!(actions[0], SupervisorAction::CancelDeadline);
    assert!(actions.contains(&SupervisorAction::CloseTransport));
    assert!(!sup.has_pending_timers());
}
