// ── Update coordinator ──
//
// Owns poll timing, failure classification, snapshot replacement, and
// change fan-out for a single tablet. Commands bypass the poll loop and
// go straight to the device source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use multitek_api::RelayAck;

use crate::config::{CoordinatorConfig, OverlapPolicy, TabletConfig};
use crate::convert::device_from_raw;
use crate::error::CoreError;
use crate::model::{ConnectionStatus, DeviceId, PollState, Snapshot, SnapshotDiff};
use crate::source::DeviceSource;
use crate::stream::{PollStateStream, SnapshotStream, StateStream};

// ── Public types ─────────────────────────────────────────────────

/// What listeners receive after every poll outcome.
#[derive(Debug, Clone)]
pub struct CoordinatorUpdate {
    /// The current snapshot (unchanged after a failed poll).
    pub snapshot: Arc<Snapshot>,
    /// Difference introduced by this poll. Empty after a failure.
    pub diff: Arc<SnapshotDiff>,
    pub poll_state: PollState,
}

/// Callback invoked synchronously after each poll outcome.
pub type Listener = Arc<dyn Fn(&CoordinatorUpdate) + Send + Sync>;

/// Token returned by [`Coordinator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

// ── Coordinator ──────────────────────────────────────────────────

/// Polling update coordinator for one tablet.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. The snapshot lives in a
/// `watch` channel, so readers never block and always see a complete
/// snapshot, either the previous one or the new one.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    source: Arc<dyn DeviceSource>,
    snapshot: watch::Sender<Arc<Snapshot>>,
    poll_state: watch::Sender<PollState>,
    listeners: ArcSwap<Vec<(SubscriptionHandle, Listener)>>,
    next_subscription: AtomicU64,
    /// Admits one poll at a time.
    poll_gate: Mutex<()>,
    /// Bumped on every `stop()`; polls that started under an older epoch
    /// never commit.
    epoch: AtomicU64,
    refresh_pending: AtomicBool,
    refresh_notify: Notify,
    cancel: CancellationToken,
    run: Mutex<Option<RunHandle>>,
}

/// The running poll loop. Replaced on every `start()`.
struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Coordinator {
    /// Create a coordinator over any device source. Does NOT start polling;
    /// call [`start()`](Self::start).
    pub fn new(
        source: Arc<dyn DeviceSource>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let (snapshot, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (poll_state, _) = watch::channel(PollState::initial(config.poll_interval));

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                config,
                source,
                snapshot,
                poll_state,
                listeners: ArcSwap::from_pointee(Vec::new()),
                next_subscription: AtomicU64::new(1),
                poll_gate: Mutex::new(()),
                epoch: AtomicU64::new(0),
                refresh_pending: AtomicBool::new(false),
                refresh_notify: Notify::new(),
                cancel: CancellationToken::new(),
                run: Mutex::new(None),
            }),
        })
    }

    /// Create a coordinator that polls a tablet over HTTP.
    pub fn for_tablet(tablet: &TabletConfig, config: CoordinatorConfig) -> Result<Self, CoreError> {
        Self::new(Arc::new(tablet.client()?), config)
    }

    /// Access the coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the poll loop. The first poll runs immediately.
    ///
    /// Calling `start()` while already running is a no-op.
    pub async fn start(&self) {
        let mut run = self.inner.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("coordinator already running");
            return;
        }

        // Fresh child token per run so a stopped coordinator can restart.
        let cancel = self.inner.cancel.child_token();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let task = tokio::spawn(poll_loop(self.clone(), epoch, cancel.clone()));
        *run = Some(RunHandle { cancel, task });

        info!(
            interval_secs = self.inner.config.poll_interval.as_secs(),
            "coordinator started"
        );
    }

    /// Stop polling.
    ///
    /// Cancels the loop (aborting any in-flight request and pending timer)
    /// and waits for it to exit. Results of polls that were still running
    /// are discarded. The coordinator can be started again afterwards.
    pub async fn stop(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);

        let run = self.inner.run.lock().await.take();
        if let Some(run) = run {
            run.cancel.cancel();
            if let Err(e) = run.task.await {
                if e.is_panic() {
                    warn!(error = %e, "poll loop panicked");
                }
            }
            info!("coordinator stopped");
        }
    }

    /// Whether the poll loop is currently running.
    pub async fn is_running(&self) -> bool {
        self.inner
            .run
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Register a listener called after every poll outcome.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&CoordinatorUpdate) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(listener);
        self.inner.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push((handle, Arc::clone(&listener)));
            next
        });
        handle
    }

    /// Remove a listener. Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut removed = false;
        self.inner.listeners.rcu(|current| {
            let next: Vec<_> = current.iter().filter(|(h, _)| *h != handle).cloned().collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    // ── State observation ────────────────────────────────────────

    /// The current snapshot. Never blocks.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> SnapshotStream {
        StateStream::new(self.inner.snapshot.subscribe())
    }

    pub fn poll_state(&self) -> PollState {
        self.inner.poll_state.borrow().clone()
    }

    pub fn watch_poll_state(&self) -> PollStateStream {
        StateStream::new(self.inner.poll_state.subscribe())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.poll_state.borrow().status
    }

    /// Number of devices in the current snapshot.
    pub fn device_count(&self) -> usize {
        self.inner.snapshot.borrow().len()
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Ask the loop for an out-of-band poll.
    ///
    /// Requests coalesce: however many arrive while a poll is pending or in
    /// flight, at most one extra poll runs.
    pub fn request_refresh(&self) {
        if self.inner.refresh_pending.swap(true, Ordering::SeqCst) {
            debug!("refresh already pending, coalescing");
        } else {
            self.inner.refresh_notify.notify_one();
        }
    }

    /// Poll once now and return the resulting diff.
    ///
    /// Waits for any in-flight poll to finish first. Works whether or not
    /// the loop is running. Returns [`CoreError::Stopped`] if `stop()` was
    /// called while this poll was in flight.
    pub async fn refresh_now(&self) -> Result<Arc<SnapshotDiff>, CoreError> {
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let _gate = self.inner.poll_gate.lock().await;
        self.poll_locked(epoch).await
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Drive a relay on or off. One best-effort attempt.
    pub async fn set_device_state(&self, id: &DeviceId, on: bool) -> Result<RelayAck, CoreError> {
        self.ensure_known(id)?;
        debug!(device_id = %id, on, "setting relay state");

        let ack = self
            .inner
            .source
            .set_device_state(id.as_str(), on)
            .await
            .map_err(|e| e.for_command(id))?;
        self.after_command(id, ack)
    }

    /// Flip a relay. One best-effort attempt.
    pub async fn toggle_device(&self, id: &DeviceId) -> Result<RelayAck, CoreError> {
        self.ensure_known(id)?;
        debug!(device_id = %id, "toggling relay");

        let ack = self
            .inner
            .source
            .toggle_device(id.as_str())
            .await
            .map_err(|e| e.for_command(id))?;
        self.after_command(id, ack)
    }

    // ── Private helpers ──────────────────────────────────────────

    /// Once the tablet has been polled, commands for ids it never listed
    /// are refused without a round trip.
    fn ensure_known(&self, id: &DeviceId) -> Result<(), CoreError> {
        let snapshot = self.inner.snapshot.borrow();
        if snapshot.fetched_at().is_some() && !snapshot.contains(id) {
            return Err(CoreError::DeviceNotFound {
                device_id: id.clone(),
            });
        }
        Ok(())
    }

    fn after_command(&self, id: &DeviceId, ack: RelayAck) -> Result<RelayAck, CoreError> {
        if ack.success == Some(false) {
            return Err(CoreError::CommandFailed {
                device_id: id.clone(),
                message: ack
                    .message
                    .unwrap_or_else(|| "tablet reported failure".into()),
            });
        }
        if self.inner.config.refresh_after_command {
            self.request_refresh();
        }
        Ok(ack)
    }

    /// Run one poll. Caller must hold `poll_gate`.
    async fn poll_locked(&self, epoch: u64) -> Result<Arc<SnapshotDiff>, CoreError> {
        let inner = &self.inner;
        // Any refresh requested up to now is satisfied by this poll.
        inner.refresh_pending.store(false, Ordering::SeqCst);

        debug!("polling tablet");
        let result = inner.source.list_devices().await;

        if inner.epoch.load(Ordering::SeqCst) != epoch {
            debug!("discarding result of a poll from a stopped run");
            return Err(CoreError::Stopped);
        }

        match result {
            Ok(raw) => {
                let now = Utc::now();
                let next = Arc::new(Snapshot::from_devices(
                    raw.into_iter().map(|r| device_from_raw(r, now)),
                    now,
                ));
                let previous = inner.snapshot.send_replace(Arc::clone(&next));
                let diff = Arc::new(SnapshotDiff::between(&previous, &next));

                if !diff.is_empty() {
                    debug!(
                        added = diff.added.len(),
                        removed = diff.removed.len(),
                        changed = diff.changed.len(),
                        "snapshot updated"
                    );
                }

                let poll_state = self.record_success(now);
                self.notify(&CoordinatorUpdate {
                    snapshot: next,
                    diff: Arc::clone(&diff),
                    poll_state,
                });
                Ok(diff)
            }
            Err(err) => {
                let poll_state = self.record_failure(&err);
                self.notify(&CoordinatorUpdate {
                    snapshot: self.current_snapshot(),
                    diff: Arc::default(),
                    poll_state,
                });
                Err(err)
            }
        }
    }

    fn record_success(&self, at: DateTime<Utc>) -> PollState {
        let interval = self.inner.config.poll_interval;
        let mut previous = ConnectionStatus::Pending;
        self.inner.poll_state.send_modify(|s| {
            previous = s.status;
            s.status = ConnectionStatus::Connected;
            s.consecutive_failures = 0;
            s.last_success = Some(at);
            s.last_error = None;
            s.retry_delay = interval;
        });

        if previous != ConnectionStatus::Connected {
            info!(from = %previous, "tablet connected");
        }
        self.inner.poll_state.borrow().clone()
    }

    fn record_failure(&self, err: &CoreError) -> PollState {
        let backoff = self.inner.config.backoff;
        let status = match err {
            CoreError::Unauthorized { .. } => ConnectionStatus::Unauthorized,
            CoreError::Unreachable { .. } => ConnectionStatus::Unreachable,
            _ => ConnectionStatus::Error,
        };

        let mut previous = ConnectionStatus::Pending;
        self.inner.poll_state.send_modify(|s| {
            previous = s.status;
            s.status = status;
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.last_error = Some(err.to_string());
            // A bad key will not fix itself; retry slowly without growth.
            s.retry_delay = if status == ConnectionStatus::Unauthorized {
                backoff.max
            } else {
                backoff.delay_for(s.consecutive_failures)
            };
        });

        let state = self.inner.poll_state.borrow().clone();
        warn!(
            error = %err,
            failures = state.consecutive_failures,
            retry_in_secs = state.retry_delay.as_secs(),
            "poll failed"
        );
        if previous != status {
            info!(from = %previous, to = %status, "tablet status changed");
        }
        state
    }

    fn notify(&self, update: &CoordinatorUpdate) {
        let listeners = self.inner.listeners.load();
        for (_, listener) in listeners.iter() {
            listener(update);
        }
    }
}

// ── Background task ──────────────────────────────────────────────

/// Poll on schedule until cancelled.
///
/// Sleeps until the next deadline (derived from the latest retry delay)
/// or until a refresh is requested, whichever comes first.
async fn poll_loop(coordinator: Coordinator, epoch: u64, cancel: CancellationToken) {
    let inner = &coordinator.inner;
    let mut next_at = Instant::now();

    loop {
        let out_of_band = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep_until(next_at) => false,
            () = inner.refresh_notify.notified() => {
                // A poll that ran since the request already satisfied it.
                if !inner.refresh_pending.load(Ordering::SeqCst) {
                    continue;
                }
                debug!("out-of-band refresh");
                true
            }
        };

        coordinator.tick(epoch, &cancel, out_of_band).await;

        if cancel.is_cancelled() {
            break;
        }
        next_at = Instant::now() + inner.poll_state.borrow().retry_delay;
    }

    debug!("poll loop exited");
}

impl Coordinator {
    /// Run one scheduled or requested poll under the overlap policy.
    ///
    /// A scheduled tick under `Skip` gives way to a poll already in
    /// flight. A requested refresh always waits its turn, then runs only
    /// if no poll since the request has satisfied it.
    async fn tick(&self, epoch: u64, cancel: &CancellationToken, out_of_band: bool) {
        let inner = &self.inner;
        let skip = matches!(inner.config.overlap, OverlapPolicy::Skip);

        let _gate = if skip && !out_of_band {
            let Ok(gate) = inner.poll_gate.try_lock() else {
                debug!("poll already in flight, skipping tick");
                return;
            };
            gate
        } else {
            let gate = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                gate = inner.poll_gate.lock() => gate,
            };
            if out_of_band && !inner.refresh_pending.load(Ordering::SeqCst) {
                debug!("refresh satisfied while waiting for the previous poll");
                return;
            }
            gate
        };

        if skip {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                _ = self.poll_locked(epoch) => {}
            }
            return;
        }

        // CancelPrevious: a poll that overruns the interval is abandoned and
        // counts as a failure; the loop schedules the retry with backoff.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {}
            _ = self.poll_locked(epoch) => {}
            () = tokio::time::sleep(inner.config.poll_interval) => {
                let err = CoreError::Unreachable {
                    reason: "poll did not finish within the poll interval".into(),
                };
                let poll_state = self.record_failure(&err);
                self.notify(&CoordinatorUpdate {
                    snapshot: self.current_snapshot(),
                    diff: Arc::default(),
                    poll_state,
                });
            }
        }
    }
}
