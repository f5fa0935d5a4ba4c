//! Completion barrier for asynchronous layout measurement.
//!
//! The tracker moves through `Idle -> PendingInitial -> PendingDebounce -> Idle`.
//! Tracking ids arms an initial deadline; the first measurement signal swaps
//! it for a debounce timer that restarts on every further signal. Either timer
//! expiring settles the session. An initial-deadline expiry is logged as a
//! warning but still resolves waiters, so nothing awaiting a settle can hang
//! on a view that never reports.

use std::{
    collections::BTreeSet,
    future::IntoFuture,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use diagram_model::StateUpdate;
use futures::future::BoxFuture;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::config::MeasurementConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    PendingInitial,
    PendingDebounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Initial,
    Debounce,
}

struct Timer {
    token: u64,
    task: JoinHandle<()>,
}

impl Timer {
    fn cancel(self) {
        self.task.abort();
    }
}

struct Session {
    tracked: BTreeSet<String>,
    activity: bool,
    debounce: Duration,
    initial_timeout: Duration,
    initial_timer: Option<Timer>,
    debounce_timer: Option<Timer>,
    handle: Option<MeasurementHandle>,
    next_token: u64,
}

impl Session {
    fn new(defaults: &MeasurementConfig) -> Self {
        Self {
            tracked: BTreeSet::new(),
            activity: false,
            debounce: defaults.debounce(),
            initial_timeout: defaults.initial_timeout(),
            initial_timer: None,
            debounce_timer: None,
            handle: None,
            next_token: 0,
        }
    }

    fn timer_token(&self, kind: TimerKind) -> Option<u64> {
        let timer = match kind {
            TimerKind::Initial => &self.initial_timer,
            TimerKind::Debounce => &self.debounce_timer,
        };
        timer.as_ref().map(|timer| timer.token)
    }
}

struct TrackerInner {
    defaults: MeasurementConfig,
    session: Mutex<Session>,
}

#[derive(Clone)]
pub struct MeasurementTracker {
    inner: Arc<TrackerInner>,
}

impl Default for MeasurementTracker {
    fn default() -> Self {
        Self::new(MeasurementConfig::default())
    }
}

impl MeasurementTracker {
    pub fn new(defaults: MeasurementConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                session: Mutex::new(Session::new(&defaults)),
                defaults,
            }),
        }
    }

    /// Tracks every node and edge named in the add/update lists of `update`.
    /// Overrides apply to every timer armed later in the current session.
    pub fn track_state_update(
        &self,
        update: &StateUpdate,
        debounce: Option<Duration>,
        initial_timeout: Option<Duration>,
    ) {
        let ids: Vec<String> = update
            .touched_node_ids()
            .into_iter()
            .map(|id| node_key(&id))
            .chain(update.touched_edge_ids().into_iter().map(|id| edge_key(&id)))
            .collect();
        if ids.is_empty() {
            return;
        }

        let mut session = self.inner.session();
        if let Some(debounce) = debounce {
            session.debounce = debounce;
        }
        if let Some(initial_timeout) = initial_timeout {
            session.initial_timeout = initial_timeout;
        }
        session.tracked.extend(ids);

        let idle_timers = session.initial_timer.is_none() && session.debounce_timer.is_none();
        if idle_timers && !session.activity {
            let after = session.initial_timeout;
            let timer = self.inner.arm(&mut session, TimerKind::Initial, after);
            session.initial_timer = timer;
        }
    }

    pub fn signal_node_measurement(&self, id: &str) {
        self.signal(node_key(id));
    }

    pub fn signal_edge_measurement(&self, id: &str) {
        self.signal(edge_key(id));
    }

    fn signal(&self, key: String) {
        let mut session = self.inner.session();
        if !session.tracked.contains(&key) {
            return;
        }
        if !session.activity {
            session.activity = true;
            if let Some(timer) = session.initial_timer.take() {
                timer.cancel();
            }
        }
        if let Some(timer) = session.debounce_timer.take() {
            timer.cancel();
        }
        let after = session.debounce;
        let timer = self.inner.arm(&mut session, TimerKind::Debounce, after);
        session.debounce_timer = timer;
    }

    pub fn has_pending_measurements(&self) -> bool {
        !self.inner.session().tracked.is_empty()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.inner.session().tracked.iter().cloned().collect()
    }

    pub fn phase(&self) -> TrackerPhase {
        let session = self.inner.session();
        if session.tracked.is_empty() {
            TrackerPhase::Idle
        } else if session.activity {
            TrackerPhase::PendingDebounce
        } else {
            TrackerPhase::PendingInitial
        }
    }

    /// Resolves once the current pending window settles. Every caller in the
    /// same window receives the same handle.
    pub fn wait_for_measurements(&self) -> MeasurementHandle {
        let mut session = self.inner.session();
        if session.tracked.is_empty() {
            return MeasurementHandle::resolved();
        }
        session
            .handle
            .get_or_insert_with(MeasurementHandle::pending)
            .clone()
    }

    /// Cancels both timers, forgets every tracked id and resolves the
    /// outstanding handle, if any.
    pub fn clear(&self) {
        let mut session = self.inner.session();
        self.inner.reset(&mut session);
    }
}

impl TrackerInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(
        self: &Arc<Self>,
        session: &mut Session,
        kind: TimerKind,
        after: Duration,
    ) -> Option<Timer> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(timer = ?kind, "[MeasurementTracker] no async runtime; timer not armed");
            return None;
        };
        session.next_token += 1;
        let token = session.next_token;
        let deadline = Instant::now() + after;
        let tracker = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            expire(tracker, kind, token);
        });
        Some(Timer { token, task })
    }

    fn reset(&self, session: &mut Session) {
        if let Some(timer) = session.initial_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = session.debounce_timer.take() {
            timer.cancel();
        }
        session.tracked.clear();
        session.activity = false;
        session.debounce = self.defaults.debounce();
        session.initial_timeout = self.defaults.initial_timeout();
        if let Some(handle) = session.handle.take() {
            handle.resolve();
        }
    }
}

fn expire(tracker: Weak<TrackerInner>, kind: TimerKind, token: u64) {
    let Some(inner) = tracker.upgrade() else {
        return;
    };
    let mut session = inner.session();
    if session.timer_token(kind) != Some(token) {
        return;
    }
    match kind {
        TimerKind::Initial => {
            warn!(
                pending = ?session.tracked,
                timeout = ?session.initial_timeout,
                "[MeasurementTracker] no measurement activity before timeout; treating as settled"
            );
        }
        TimerKind::Debounce => {
            debug!(settled = session.tracked.len(), "measurements settled");
        }
    }
    inner.reset(&mut session);
}

fn node_key(id: &str) -> String {
    format!("node:{id}")
}

fn edge_key(id: &str) -> String {
    format!("edge:{id}")
}

struct Completion {
    done: watch::Sender<bool>,
}

/// Awaitable completion of one pending measurement window.
#[derive(Clone)]
pub struct MeasurementHandle {
    completion: Arc<Completion>,
}

impl std::fmt::Debug for MeasurementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementHandle")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl MeasurementHandle {
    fn pending() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            completion: Arc::new(Completion { done }),
        }
    }

    fn resolved() -> Self {
        let handle = Self::pending();
        handle.resolve();
        handle
    }

    fn resolve(&self) {
        self.completion.done.send_replace(true);
    }

    pub fn is_resolved(&self) -> bool {
        *self.completion.done.borrow()
    }

    pub fn ptr_eq(&self, other: &MeasurementHandle) -> bool {
        Arc::ptr_eq(&self.completion, &other.completion)
    }

    pub async fn wait(&self) {
        let mut done = self.completion.done.subscribe();
        // The sender lives as long as this handle, so the wait cannot fail.
        let _ = done.wait_for(|resolved| *resolved).await;
    }
}

impl IntoFuture for MeasurementHandle {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

#[cfg(test)]
#[path = "tests/measurement_tests.rs"]
mod tests;
