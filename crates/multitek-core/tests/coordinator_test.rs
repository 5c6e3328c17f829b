#![allow(clippy::unwrap_used)]
// Integration tests for the update coordinator and entity adapters.
//
// A scripted `DeviceSource` stands in for the tablet; tokio's paused clock
// makes poll timing deterministic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::{Semaphore, watch};
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready};

use multitek_api::{RawDevice, RelayAck};
use multitek_core::{
    BackoffConfig, ConnectionStatus, Coordinator, CoordinatorConfig, CoreError, DeviceId,
    DeviceSource, EntityManager, OverlapPolicy, PollState, RelayState, TabletInfo,
};

// ── Scripted source ─────────────────────────────────────────────────

#[derive(Clone)]
enum Outcome {
    Devices(Vec<RawDevice>),
    Unreachable,
    Unauthorized,
    Malformed,
    /// Never completes.
    Hang,
}

impl Outcome {
    fn into_result(self) -> Option<Result<Vec<RawDevice>, CoreError>> {
        match self {
            Outcome::Devices(d) => Some(Ok(d)),
            Outcome::Unreachable => Some(Err(CoreError::Unreachable {
                reason: "connection refused".into(),
            })),
            Outcome::Unauthorized => Some(Err(CoreError::Unauthorized {
                message: "HTTP 401".into(),
            })),
            Outcome::Malformed => Some(Err(CoreError::Malformed {
                message: "expected an object".into(),
            })),
            Outcome::Hang => None,
        }
    }
}

#[derive(Clone)]
enum WriteOutcome {
    Ack(Option<bool>),
    Reject,
}

struct ScriptedSource {
    /// Poll outcomes in order; the last one repeats once the queue drains.
    polls: Mutex<VecDeque<Outcome>>,
    last: Mutex<Outcome>,
    calls: Mutex<Vec<Instant>>,
    call_count: watch::Sender<usize>,
    /// When set, every poll takes one permit before answering.
    poll_gate: Option<Arc<Semaphore>>,
    writes: Mutex<Vec<(String, Option<bool>)>>,
    write_outcome: Mutex<WriteOutcome>,
    /// When set, every write takes one permit before answering.
    write_gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    fn new(polls: Vec<Outcome>) -> Self {
        let last = polls.last().cloned().unwrap_or(Outcome::Devices(Vec::new()));
        let (call_count, _) = watch::channel(0);
        Self {
            polls: Mutex::new(polls.into()),
            last: Mutex::new(last),
            calls: Mutex::new(Vec::new()),
            call_count,
            poll_gate: None,
            writes: Mutex::new(Vec::new()),
            write_outcome: Mutex::new(WriteOutcome::Ack(None)),
            write_gate: None,
        }
    }

    fn with_poll_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.poll_gate = Some(gate);
        self
    }

    fn with_write_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.write_gate = Some(gate);
        self
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    fn writes(&self) -> Vec<(String, Option<bool>)> {
        self.writes.lock().unwrap().clone()
    }

    fn set_write_outcome(&self, outcome: WriteOutcome) {
        *self.write_outcome.lock().unwrap() = outcome;
    }

    async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        rx.wait_for(|c| *c >= n).await.unwrap();
    }

    fn next_outcome(&self) -> Outcome {
        let mut polls = self.polls.lock().unwrap();
        match polls.pop_front() {
            Some(outcome) => {
                *self.last.lock().unwrap() = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap().clone(),
        }
    }

    async fn write(&self, id: &str, on: Option<bool>) -> Result<RelayAck, CoreError> {
        if let Some(gate) = &self.write_gate {
            gate.acquire().await.unwrap().forget();
        }
        self.writes.lock().unwrap().push((id.to_owned(), on));
        let outcome = self.write_outcome.lock().unwrap().clone();
        match outcome {
            WriteOutcome::Ack(state) => Ok(RelayAck {
                success: Some(true),
                state: state.or(on),
                message: None,
            }),
            // What the transport classification makes of an HTTP 500.
            WriteOutcome::Reject => Err(CoreError::Unreachable {
                reason: "Tablet returned HTTP 500: relay fault".into(),
            }),
        }
    }
}

impl DeviceSource for ScriptedSource {
    fn list_devices(&self) -> BoxFuture<'_, Result<Vec<RawDevice>, CoreError>> {
        async move {
            self.calls.lock().unwrap().push(Instant::now());
            self.call_count.send_modify(|c| *c += 1);
            let outcome = self.next_outcome();
            if let Some(gate) = &self.poll_gate {
                gate.acquire().await.unwrap().forget();
            }
            match outcome.into_result() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
        .boxed()
    }

    fn set_device_state<'a>(
        &'a self,
        id: &'a str,
        on: bool,
    ) -> BoxFuture<'a, Result<RelayAck, CoreError>> {
        self.write(id, Some(on)).boxed()
    }

    fn toggle_device<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<RelayAck, CoreError>> {
        self.write(id, None).boxed()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn relay(id: u32, kind: u8, on: bool) -> RawDevice {
    serde_json::from_value(json!({
        "id": id,
        "type": kind,
        "name": format!("Relay {id}"),
        "state": on,
    }))
    .unwrap()
}

/// L1 light on, S1 shutter closed, V1 water valve off.
fn house() -> Vec<RawDevice> {
    vec![relay(1, 1, true), relay(2, 2, false), relay(3, 6, false)]
}

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_secs(30),
        backoff: BackoffConfig {
            initial: Duration::from_secs(30),
            multiplier: 2,
            max: Duration::from_secs(300),
        },
        overlap: OverlapPolicy::Skip,
        refresh_after_command: false,
    }
}

fn coordinator(source: &Arc<ScriptedSource>, config: CoordinatorConfig) -> Coordinator {
    Coordinator::new(Arc::clone(source) as Arc<dyn DeviceSource>, config).unwrap()
}

async fn wait_for_state(c: &Coordinator, pred: impl Fn(&PollState) -> bool) -> PollState {
    let mut stream = c.watch_poll_state();
    loop {
        let state = stream.latest();
        if pred(&state) {
            return state;
        }
        stream.changed().await.unwrap();
    }
}

fn record_states(c: &Coordinator) -> Arc<Mutex<Vec<PollState>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    c.subscribe(move |update| sink.lock().unwrap().push(update.poll_state.clone()));
    log
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_first_poll_runs_immediately() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(house())]));
    let c = coordinator(&source, config());
    let started = Instant::now();

    c.start().await;
    wait_for_state(&c, |s| s.status == ConnectionStatus::Connected).await;

    assert_eq!(source.calls()[0], started);
    assert_eq!(c.device_count(), 3);
    assert!(c.current_snapshot().fetched_at().is_some());
    c.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_polls_on_fixed_interval() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(house())]));
    let c = coordinator(&source, config());

    c.start().await;
    source.wait_for_calls(3).await;
    c.stop().await;

    let calls = source.calls();
    assert_eq!(calls[1] - calls[0], Duration::from_secs(30));
    assert_eq!(calls[2] - calls[1], Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(house())]));
    let c = coordinator(&source, config());

    c.start().await;
    c.start().await;
    source.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(source.calls().len(), 1);
    assert!(c.is_running().await);
    c.stop().await;
    assert!(!c.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(house())]));
    let c = coordinator(&source, config());

    c.start().await;
    source.wait_for_calls(1).await;
    c.stop().await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(source.calls().len(), 1, "no polls while stopped");

    c.start().await;
    source.wait_for_calls(2).await;
    c.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_refresh() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(
        ScriptedSource::new(vec![Outcome::Devices(house())]).with_poll_gate(Arc::clone(&gate)),
    );
    let c = coordinator(&source, config());

    let pending = tokio::spawn({
        let c = c.clone();
        async move { c.refresh_now().await }
    });
    source.wait_for_calls(1).await;

    c.stop().await;
    gate.add_permits(1);

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(CoreError::Stopped)));
    assert!(c.current_snapshot().is_empty());
    assert_eq!(c.connection_status(), ConnectionStatus::Pending);
}

// ── Failure handling ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_after_consecutive_unreachable() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Unreachable]));
    let c = coordinator(&source, config());
    let log = record_states(&c);

    c.start().await;
    wait_for_state(&c, |s| s.consecutive_failures >= 3).await;
    c.stop().await;

    let states = log.lock().unwrap().clone();
    let delays: Vec<u64> = states.iter().map(|s| s.retry_delay.as_secs()).collect();
    assert_eq!(delays, vec![30, 60, 120]);
    assert!(states[2].retry_delay > states[0].retry_delay);
    assert!(states.iter().all(|s| s.status == ConnectionStatus::Unreachable));

    let calls = source.calls();
    assert_eq!(calls[1] - calls[0], Duration::from_secs(30));
    assert_eq!(calls[2] - calls[1], Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped_at_ceiling() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Malformed]));
    let mut cfg = config();
    cfg.backoff.max = Duration::from_secs(100);
    let c = coordinator(&source, cfg);
    let log = record_states(&c);

    c.start().await;
    wait_for_state(&c, |s| s.consecutive_failures >= 4).await;
    c.stop().await;

    let delays: Vec<u64> = log
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.retry_delay.as_secs())
        .collect();
    assert_eq!(delays, vec![30, 60, 100, 100]);
    assert_eq!(c.connection_status(), ConnectionStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_success_restores_normal_interval() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Unreachable,
        Outcome::Unreachable,
        Outcome::Devices(house()),
    ]));
    let c = coordinator(&source, config());

    c.start().await;
    let state = wait_for_state(&c, |s| s.status == ConnectionStatus::Connected).await;
    c.stop().await;

    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.retry_delay, Duration::from_secs(30));
    assert!(state.last_error.is_none());
    assert!(state.last_success.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_retries_at_ceiling_without_growth() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Unauthorized]));
    let c = coordinator(&source, config());
    let log = record_states(&c);

    c.start().await;
    wait_for_state(&c, |s| s.consecutive_failures >= 3).await;
    c.stop().await;

    let states = log.lock().unwrap().clone();
    assert!(states.iter().all(|s| s.status == ConnectionStatus::Unauthorized));
    assert!(states.iter().all(|s| s.retry_delay == Duration::from_secs(300)));

    let calls = source.calls();
    assert_eq!(calls[1] - calls[0], Duration::from_secs(300));
    assert_eq!(calls[2] - calls[1], Duration::from_secs(300));
}

#[tokio::test]
async fn test_failed_poll_keeps_previous_snapshot() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(house()),
        Outcome::Malformed,
    ]));
    let c = coordinator(&source, config());

    c.refresh_now().await.unwrap();
    let before = c.current_snapshot();

    let err = c.refresh_now().await.unwrap_err();
    assert!(matches!(err, CoreError::Malformed { .. }));
    assert!(Arc::ptr_eq(&before, &c.current_snapshot()));

    let state = c.poll_state();
    assert_eq!(state.status, ConnectionStatus::Error);
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.last_error.unwrap().contains("expected an object"));
}

#[tokio::test]
async fn test_listeners_see_failures_with_empty_diff() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(house()),
        Outcome::Unreachable,
    ]));
    let c = coordinator(&source, config());
    let diffs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&diffs);
    c.subscribe(move |u| sink.lock().unwrap().push((u.diff.added.len(), u.poll_state.status)));

    c.refresh_now().await.unwrap();
    let _ = c.refresh_now().await;

    assert_eq!(
        *diffs.lock().unwrap(),
        vec![
            (3, ConnectionStatus::Connected),
            (0, ConnectionStatus::Unreachable)
        ]
    );
}

// ── Snapshot atomicity ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_torn_snapshots() {
    let small = vec![relay(1, 1, true), relay(2, 2, false)];
    let large: Vec<RawDevice> = (1..=5).map(|i| relay(i, 3, i % 2 == 0)).collect();
    let script: Vec<Outcome> = (0..50)
        .map(|i| {
            if i % 2 == 0 {
                Outcome::Devices(small.clone())
            } else {
                Outcome::Devices(large.clone())
            }
        })
        .collect();
    let source = Arc::new(ScriptedSource::new(script));
    let c = coordinator(&source, config());

    let reader = tokio::spawn({
        let c = c.clone();
        async move {
            let mut seen = Vec::new();
            for _ in 0..2_000 {
                let snap = c.current_snapshot();
                let ids: Vec<String> = snap.ids().map(|id| id.to_string()).collect();
                seen.push(ids);
                tokio::task::yield_now().await;
            }
            seen
        }
    });

    for _ in 0..50 {
        c.refresh_now().await.unwrap();
    }

    for ids in reader.await.unwrap() {
        assert!(
            ids.is_empty() || ids == ["1", "2"] || ids == ["1", "2", "3", "4", "5"],
            "torn snapshot: {ids:?}"
        );
    }
}

#[tokio::test]
async fn test_old_snapshot_survives_replacement() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(house()),
        Outcome::Devices(vec![relay(2, 2, true)]),
    ]));
    let c = coordinator(&source, config());

    c.refresh_now().await.unwrap();
    let held = c.current_snapshot();
    let mut stream = c.watch_snapshot();

    let diff = c.refresh_now().await.unwrap();
    assert_eq!(held.len(), 3);
    assert_eq!(stream.changed().await.unwrap().len(), 1);
    assert_eq!(diff.removed.len(), 2);
    assert_eq!(diff.changed, vec![DeviceId::from("2")]);
}

// ── Refresh coalescing and overlap ──────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_refresh_requests_coalesce_during_poll() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(
        ScriptedSource::new(vec![Outcome::Devices(house())]).with_poll_gate(Arc::clone(&gate)),
    );
    let mut cfg = config();
    cfg.poll_interval = Duration::from_secs(3600);
    let c = coordinator(&source, cfg);

    c.start().await;
    source.wait_for_calls(1).await;

    c.request_refresh();
    c.request_refresh();
    gate.add_permits(10);

    source.wait_for_calls(2).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    c.stop().await;

    assert_eq!(source.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_skips_tick_while_poll_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(
        ScriptedSource::new(vec![Outcome::Devices(house())]).with_poll_gate(Arc::clone(&gate)),
    );
    let c = coordinator(&source, config());

    let inline = tokio::spawn({
        let c = c.clone();
        async move { c.refresh_now().await }
    });
    source.wait_for_calls(1).await;

    // The loop's immediate first tick finds the gate held.
    c.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls().len(), 1);

    gate.add_permits(10);
    inline.await.unwrap().unwrap();
    assert_eq!(source.calls().len(), 1);

    source.wait_for_calls(2).await;
    c.stop().await;
    let calls = source.calls();
    assert_eq!(calls[1] - calls[0], Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_previous_replaces_overrunning_poll() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Hang,
        Outcome::Devices(house()),
    ]));
    let mut cfg = config();
    cfg.overlap = OverlapPolicy::CancelPrevious;
    let c = coordinator(&source, cfg);
    let log = record_states(&c);

    c.start().await;
    wait_for_state(&c, |s| s.status == ConnectionStatus::Connected).await;
    c.stop().await;

    // 30s overrun budget, then the first backoff step.
    let calls = source.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1] - calls[0], Duration::from_secs(60));

    let statuses: Vec<_> = log.lock().unwrap().iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![ConnectionStatus::Unreachable, ConnectionStatus::Connected]
    );
}

#[tokio::test(start_paused = true)]
async fn test_repeated_overruns_back_off() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Hang,
        Outcome::Hang,
        Outcome::Hang,
        Outcome::Hang,
        Outcome::Devices(house()),
    ]));
    let mut cfg = config();
    cfg.overlap = OverlapPolicy::CancelPrevious;
    let c = coordinator(&source, cfg);
    let log = record_states(&c);

    c.start().await;
    wait_for_state(&c, |s| s.status == ConnectionStatus::Connected).await;
    c.stop().await;

    let calls = source.calls();
    let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![60, 90, 150, 270]);

    let delays: Vec<u64> = log
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.retry_delay.as_secs())
        .collect();
    assert_eq!(delays, vec![30, 60, 120, 240, 30]);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_requested_during_inline_poll_still_runs() {
    // First poll answers straight away; later ones wait for permits.
    let gate = Arc::new(Semaphore::new(1));
    let source = Arc::new(
        ScriptedSource::new(vec![Outcome::Devices(house())]).with_poll_gate(Arc::clone(&gate)),
    );
    let mut cfg = config();
    cfg.poll_interval = Duration::from_secs(3600);
    let c = coordinator(&source, cfg);

    c.start().await;
    wait_for_state(&c, |s| s.status == ConnectionStatus::Connected).await;

    let inline = tokio::spawn({
        let c = c.clone();
        async move { c.refresh_now().await }
    });
    source.wait_for_calls(2).await;

    c.request_refresh();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls().len(), 2);

    gate.add_permits(10);
    inline.await.unwrap().unwrap();
    source.wait_for_calls(3).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    c.stop().await;

    assert_eq!(source.calls().len(), 3);
}

// ── Entities ────────────────────────────────────────────────────────

fn manager(c: &Coordinator) -> EntityManager {
    EntityManager::attach(c, "entry1", TabletInfo::new("10.0.0.7", 8123))
}

#[tokio::test]
async fn test_scenario_noop_then_device_disappears() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(house()),
        Outcome::Devices(vec![relay(2, 2, false), relay(3, 6, false)]),
    ]));
    let c = coordinator(&source, config());
    c.refresh_now().await.unwrap();
    let m = manager(&c);

    let light = m.get(&DeviceId::from("1")).unwrap();
    assert_eq!(light.unique_id(), "entry1_1");
    assert_eq!(light.state(), RelayState::On);

    light.turn_on().await.unwrap();
    assert!(source.writes().is_empty(), "no-op must not write");
    assert_eq!(light.state(), RelayState::On);

    c.refresh_now().await.unwrap();
    assert_eq!(light.state(), RelayState::Unknown);
    assert!(!light.available());
    assert_eq!(m.device_count_sensor().value(), 2);

    let err = light.turn_off().await.unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
}

#[tokio::test]
async fn test_device_absent_for_several_polls_then_returns() {
    let without_light = vec![relay(2, 2, false), relay(3, 6, false)];
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(house()),
        Outcome::Devices(without_light.clone()),
        Outcome::Devices(without_light.clone()),
        Outcome::Devices(without_light),
        Outcome::Devices(vec![relay(1, 1, false), relay(2, 2, false), relay(3, 6, false)]),
    ]));
    let c = coordinator(&source, config());
    c.refresh_now().await.unwrap();
    let m = manager(&c);
    let light = m.get(&DeviceId::from("1")).unwrap();

    for _ in 0..3 {
        c.refresh_now().await.unwrap();
        assert_eq!(light.state(), RelayState::Unknown);
    }
    assert_eq!(m.entities().last().unwrap().device_id(), &DeviceId::from("1"));

    c.refresh_now().await.unwrap();
    assert_eq!(light.state(), RelayState::Off);
    assert!(light.available());
    assert_eq!(m.len(), 3);
}

#[tokio::test]
async fn test_turn_on_flips_before_write_and_reverts_on_failure() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(
        ScriptedSource::new(vec![Outcome::Devices(vec![relay(7, 1, false)])])
            .with_write_gate(Arc::clone(&gate)),
    );
    source.set_write_outcome(WriteOutcome::Reject);
    let c = coordinator(&source, config());
    c.refresh_now().await.unwrap();
    let m = manager(&c);
    let lamp = m.get(&DeviceId::from("7")).unwrap();

    let mut command = tokio_test::task::spawn(lamp.turn_on());
    assert_pending!(command.poll());
    assert_eq!(lamp.state(), RelayState::PendingOn);
    assert_eq!(lamp.is_on(), Some(true));

    gate.add_permits(1);
    let result = assert_ready!(command.poll());
    match result {
        Err(CoreError::CommandFailed { device_id, .. }) => {
            assert_eq!(device_id, DeviceId::from("7"));
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
    assert_eq!(lamp.state(), RelayState::Off);
    assert_eq!(source.calls().len(), 1, "revert must not need a poll");
}

#[tokio::test]
async fn test_toggle_uses_tablet_reported_state() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(vec![relay(4, 3, false)])]));
    source.set_write_outcome(WriteOutcome::Ack(Some(true)));
    let c = coordinator(&source, config());
    c.refresh_now().await.unwrap();
    let m = manager(&c);
    let plug = m.get(&DeviceId::from("4")).unwrap();

    plug.toggle().await.unwrap();
    assert_eq!(plug.state(), RelayState::On);
    assert_eq!(source.writes(), vec![("4".to_owned(), None)]);
}

#[tokio::test(start_paused = true)]
async fn test_command_requests_follow_up_poll() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(house())]));
    let mut cfg = config();
    cfg.poll_interval = Duration::from_secs(3600);
    cfg.refresh_after_command = true;
    let c = coordinator(&source, cfg);
    let m = manager(&c);

    c.start().await;
    source.wait_for_calls(1).await;
    wait_for_state(&c, |s| s.status == ConnectionStatus::Connected).await;

    m.get(&DeviceId::from("3")).unwrap().turn_on().await.unwrap();
    source.wait_for_calls(2).await;
    c.stop().await;

    assert_eq!(source.writes(), vec![("3".to_owned(), Some(true))]);
}

#[tokio::test]
async fn test_new_devices_get_entities() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(vec![relay(1, 1, true)]),
        Outcome::Devices(vec![relay(1, 1, true), relay(9, 4, false)]),
    ]));
    let c = coordinator(&source, config());
    let m = manager(&c);
    let mut events = m.events();
    assert!(m.is_empty());

    c.refresh_now().await.unwrap();
    c.refresh_now().await.unwrap();

    let mut added = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let multitek_core::EntityEvent::Added(entity) = event {
            added.push(entity.unique_id().to_owned());
        }
    }
    assert_eq!(added, vec!["entry1_1", "entry1_9"]);

    let valve = m.get(&DeviceId::from("9")).unwrap();
    assert_eq!(valve.icon(), "mdi:gas-cylinder");
    assert_eq!(valve.attributes().device_type, "Gas Valve");
}

#[tokio::test]
async fn test_entities_unavailable_while_tablet_unreachable() {
    let source = Arc::new(ScriptedSource::new(vec![
        Outcome::Devices(house()),
        Outcome::Unreachable,
    ]));
    let c = coordinator(&source, config());
    c.refresh_now().await.unwrap();
    let m = manager(&c);
    let shutter = m.get(&DeviceId::from("2")).unwrap();
    assert!(shutter.available());
    assert_eq!(shutter.platform().to_string(), "cover");

    let _ = c.refresh_now().await;
    assert!(!shutter.available());
    assert_eq!(shutter.state(), RelayState::Off, "state survives a failed poll");

    let status = m.connection_status_sensor();
    assert_eq!(status.value().to_string(), "unreachable");
    assert_eq!(status.attributes().consecutive_failures, 1);
    assert!(status.attributes().last_update.is_some());
}

#[tokio::test]
async fn test_device_count_sensor_attributes() {
    let source = Arc::new(ScriptedSource::new(vec![Outcome::Devices(house())]));
    let c = coordinator(&source, config());
    c.refresh_now().await.unwrap();
    let m = manager(&c);

    let sensor = m.device_count_sensor();
    assert_eq!(sensor.unique_id(), "entry1_device_count");
    assert_eq!(sensor.value(), 3);

    let attrs = sensor.attributes();
    assert_eq!(attrs.device_types.get("Light"), Some(&1));
    assert_eq!(attrs.device_types.get("Water Valve"), Some(&1));
    assert_eq!(attrs.tablet_host, "10.0.0.7");
    assert_eq!(attrs.tablet_port, 8123);
}

// ── HTTP end to end ─────────────────────────────────────────────────

#[tokio::test]
async fn test_tablet_coordinator_over_http() {
    use secrecy::SecretString;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("X-HA-Access", "hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                { "id": 1, "type": 1, "name": "Hall light", "room_name": "Hall", "state": true },
                { "id": 2, "type": 2, "name": "Shutter", "state": false, "position": 0 }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/relay/1/state"))
        .and(body_json(json!({ "state": false })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "state": false })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let addr = server.address();
    let mut tablet = multitek_core::TabletConfig::new(addr.ip().to_string());
    tablet.port = addr.port();
    tablet.api_key = Some(SecretString::from("hunter2".to_owned()));

    let c = Coordinator::for_tablet(&tablet, config()).unwrap();
    c.refresh_now().await.unwrap();
    assert_eq!(c.connection_status(), ConnectionStatus::Connected);

    let m = EntityManager::attach(&c, "entry1", TabletInfo::from(&tablet));
    let light = m.get(&DeviceId::from("1")).unwrap();
    assert_eq!(light.attributes().room, "Hall");

    light.turn_off().await.unwrap();
    assert_eq!(light.state(), RelayState::Off);
}

#[tokio::test]
async fn test_tablet_server_error_on_write_is_command_failure() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [{ "id": 1, "type": 1, "name": "Hall light", "state": false }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/relay/1/state"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "relay fault" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let addr = server.address();
    let mut tablet = multitek_core::TabletConfig::new(addr.ip().to_string());
    tablet.port = addr.port();

    let c = Coordinator::for_tablet(&tablet, config()).unwrap();
    c.refresh_now().await.unwrap();
    let m = EntityManager::attach(&c, "entry1", TabletInfo::from(&tablet));
    let light = m.get(&DeviceId::from("1")).unwrap();

    match light.turn_on().await {
        Err(CoreError::CommandFailed { device_id, message }) => {
            assert_eq!(device_id, DeviceId::from("1"));
            assert!(message.contains("relay fault"), "message: {message}");
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
    assert_eq!(light.state(), RelayState::Off);
    assert_eq!(c.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_unreadable_record_does_not_fail_the_poll() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                { "id": 1, "type": 1, "state": true },
                { "id": 2, "type": 2, "position": -1 },
                { "type": 6 }
            ]
        })))
        .mount(&server)
        .await;

    let addr = server.address();
    let mut tablet = multitek_core::TabletConfig::new(addr.ip().to_string());
    tablet.port = addr.port();

    let c = Coordinator::for_tablet(&tablet, config()).unwrap();
    c.refresh_now().await.unwrap();

    assert_eq!(c.connection_status(), ConnectionStatus::Connected);
    assert_eq!(c.device_count(), 2);
    let shutter = c.current_snapshot().get(&DeviceId::from("2")).cloned().unwrap();
    assert_eq!(shutter.state.position, Some(0));
}

#[tokio::test]
async fn test_tablet_rejecting_key_reports_unauthorized() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let addr = server.address();
    let mut tablet = multitek_core::TabletConfig::new(addr.ip().to_string());
    tablet.port = addr.port();

    let c = Coordinator::for_tablet(&tablet, config()).unwrap();
    let err = c.refresh_now().await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized { .. }));
    assert_eq!(c.connection_status(), ConnectionStatus::Unauthorized);
    assert_eq!(c.poll_state().retry_delay, Duration::from_secs(300));
}
