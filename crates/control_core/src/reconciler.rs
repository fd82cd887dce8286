//! Single owner of the controller snapshot.
//!
//! `poll()` is the only writer. Concurrent callers share one in-flight fetch,
//! so neither the heartbeat nor confirmation polls can stack requests on a slow
//! network. The fetch runs in its own task and finishes even if every caller
//! is cancelled. While at least one [`Subscription`] is alive, a driver task
//! polls at the fastest period any subscriber asked for.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use shared::{
    domain::Snapshot,
    error::SnapshotError,
    protocol::parse_snapshot,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::PollError,
    lock_policy::{self, Availability},
    transport::{is_malformed_body, ControllerTransport},
};

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);
const MIN_POLL_PERIOD: Duration = Duration::from_millis(10);
const UPDATE_CHANNEL_CAPACITY: usize = 64;

pub type PollResult = Result<Arc<Snapshot>, PollError>;
type InflightPoll = Shared<BoxFuture<'static, PollResult>>;

/// Structural inequality; the only evidence that a command took effect.
pub fn changed(prev: &Snapshot, next: &Snapshot) -> bool {
    prev != next
}

/// Published after every poll once a snapshot exists, whether or not anything
/// changed. A failed poll republishes the retained snapshot with `poll_error`
/// set.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub snapshot: Arc<Snapshot>,
    pub availability: Availability,
    pub changed: bool,
    pub poll_error: Option<PollError>,
}

impl StateUpdate {
    pub fn is_stale(&self) -> bool {
        self.poll_error.is_some()
    }
}

#[derive(Clone)]
pub struct StateReconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    transport: Arc<dyn ControllerTransport>,
    clock: Arc<dyn Clock>,
    current: RwLock<Option<Arc<Snapshot>>>,
    last_error: Mutex<Option<PollError>>,
    inflight: Mutex<Option<InflightPoll>>,
    updates: broadcast::Sender<StateUpdate>,
    driver: Mutex<DriverState>,
}

#[derive(Default)]
struct DriverState {
    next_id: u64,
    periods: HashMap<u64, Duration>,
    period_tx: Option<watch::Sender<Duration>>,
    task: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StateReconciler {
    pub fn new(transport: Arc<dyn ControllerTransport>, clock: Arc<dyn Clock>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ReconcilerInner {
                transport,
                clock,
                current: RwLock::new(None),
                last_error: Mutex::new(None),
                inflight: Mutex::new(None),
                updates,
                driver: Mutex::new(DriverState::default()),
            }),
        }
    }

    pub(crate) fn transport(&self) -> Arc<dyn ControllerTransport> {
        Arc::clone(&self.inner.transport)
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Fetches fresh state, or joins the fetch already in flight.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn poll(&self) -> PollResult {
        let fetch = {
            let mut slot = lock(&self.inner.inflight);
            match slot.as_ref() {
                Some(inflight) => {
                    debug!("poll already in flight; joining it");
                    inflight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move { inner.fetch_and_publish().await });
                    let fetch = async move {
                        task.await.unwrap_or_else(|error| {
                            Err(PollError::Unreachable(format!("poll task failed: {error}")))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gates for the held snapshot, evaluated at the current time.
    pub fn availability(&self) -> Option<Availability> {
        self.current()
            .map(|snapshot| lock_policy::evaluate(&snapshot, self.inner.clock.now()))
    }

    /// Set after a failed poll, cleared by the next successful one.
    pub fn last_poll_error(&self) -> Option<PollError> {
        lock(&self.inner.last_error).clone()
    }

    pub fn is_stale(&self) -> bool {
        lock(&self.inner.last_error).is_some()
    }

    /// Observes updates without asking for periodic polling.
    pub fn listen(&self) -> broadcast::Receiver<StateUpdate> {
        self.inner.updates.subscribe()
    }

    /// Registers a consumer that wants a heartbeat every `period`.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// handle unsubscribes; the last drop stops the heartbeat.
    pub fn subscribe(&self, period: Duration) -> Subscription {
        let receiver = self.inner.updates.subscribe();
        let mut driver = lock(&self.inner.driver);
        let id = driver.next_id;
        driver.next_id += 1;
        driver.periods.insert(id, period.max(MIN_POLL_PERIOD));
        refresh_driver(&self.inner, &mut driver);
        drop(driver);

        Subscription {
            id,
            receiver,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Period the heartbeat currently runs at, if anyone is subscribed.
    pub fn polling_period(&self) -> Option<Duration> {
        lock(&self.inner.driver).periods.values().min().copied()
    }
}

impl ReconcilerInner {
    async fn fetch(&self) -> PollResult {
        let value = self.transport.fetch_state().await.map_err(|error| {
            if is_malformed_body(&error) {
                PollError::Malformed(SnapshotError::Decode(format!("{error:#}")))
            } else {
                PollError::Unreachable(format!("{error:#}"))
            }
        })?;
        Ok(Arc::new(parse_snapshot(value)?))
    }

    async fn fetch_and_publish(&self) -> PollResult {
        let result = self.fetch().await;

        match &result {
            Ok(snapshot) => {
                let previous = self
                    .current
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(Arc::clone(snapshot));
                if lock(&self.last_error).take().is_some() {
                    info!("controller state reachable again");
                }

                let update = StateUpdate {
                    snapshot: Arc::clone(snapshot),
                    availability: lock_policy::evaluate(snapshot, self.clock.now()),
                    changed: previous.map_or(true, |prev| changed(&prev, snapshot)),
                    poll_error: None,
                };
                // No receivers is not an error.
                let _ = self.updates.send(update);
            }
            Err(error) => {
                let was_stale = lock(&self.last_error).replace(error.clone()).is_some();
                if was_stale {
                    debug!(%error, "poll failed again; keeping previous snapshot");
                } else {
                    warn!(%error, "poll failed; keeping previous snapshot");
                }

                let retained = self
                    .current
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(snapshot) = retained {
                    let update = StateUpdate {
                        availability: lock_policy::evaluate(&snapshot, self.clock.now()),
                        snapshot,
                        changed: false,
                        poll_error: Some(error.clone()),
                    };
                    let _ = self.updates.send(update);
                }
            }
        }

        lock(&self.inflight).take();
        result
    }
}

fn refresh_driver(inner: &Arc<ReconcilerInner>, driver: &mut DriverState) {
    let Some(period) = driver.periods.values().min().copied() else {
        if let Some(task) = driver.task.take() {
            task.abort();
            info!("heartbeat stopped; no subscribers left");
        }
        driver.period_tx = None;
        return;
    };

    let running = driver
        .task
        .as_ref()
        .is_some_and(|task| !task.is_finished());
    match &driver.period_tx {
        Some(period_tx) if running => {
            period_tx.send_if_modified(|current| {
                if *current == period {
                    return false;
                }
                *current = period;
                true
            });
        }
        _ => {
            let (period_tx, period_rx) = watch::channel(period);
            let reconciler = StateReconciler {
                inner: Arc::clone(inner),
            };
            driver.task = Some(tokio::spawn(run_heartbeat(reconciler, period_rx)));
            driver.period_tx = Some(period_tx);
            info!(period_ms = period.as_millis() as u64, "heartbeat started");
        }
    }
}

fn heartbeat(period: Duration) -> Interval {
    let mut ticker = interval(period);
    // A tick that lands while a poll is still running is dropped, not queued.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_heartbeat(reconciler: StateReconciler, mut period_rx: watch::Receiver<Duration>) {
    let mut ticker = heartbeat(*period_rx.borrow_and_update());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are recorded on the reconciler and retried next tick.
                let _ = reconciler.poll().await;
            }
            changed = period_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *period_rx.borrow_and_update();
                debug!(period_ms = period.as_millis() as u64, "heartbeat period changed");
                ticker = heartbeat(period);
            }
        }
    }
}

/// Live registration for periodic updates.
pub struct Subscription {
    id: u64,
    receiver: broadcast::Receiver<StateUpdate>,
    inner: Arc<ReconcilerInner>,
}

impl Subscription {
    /// Next published update. Skips ahead if this consumer fell behind.
    pub async fn recv(&mut self) -> Option<StateUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged; skipping to newer updates");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn set_period(&self, period: Duration) {
        let mut driver = lock(&self.inner.driver);
        driver.periods.insert(self.id, period.max(MIN_POLL_PERIOD));
        refresh_driver(&self.inner, &mut driver);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut driver = lock(&self.inner.driver);
        driver.periods.remove(&self.id);
        refresh_driver(&self.inner, &mut driver);
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
