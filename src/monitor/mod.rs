// ABOUTME: Session monitor that polls the session source, classifies sessions, and fans out snapshots
// ABOUTME: Owns the authoritative session table; readers and subscribers only ever get copies

//! Session monitor.
//!
//! The `Monitor` runs one background task that:
//! - Polls the [`SessionSource`] on a fixed interval (first poll immediately)
//! - Probes every session concurrently and reconciles it against the previous table
//! - Swaps the whole table in one critical section
//! - Publishes the new snapshot to every subscriber as a latest value
//!
//! # Fan-out
//!
//! ```text
//!   poll cycle ──▶ table (RwLock) ──▶ snapshot ──┬──▶ watch slot ──▶ subscriber A
//!                                                ├──▶ watch slot ──▶ subscriber B (slow)
//!                                                └──▶ watch slot ──▶ subscriber C
//! ```
//!
//! Each subscriber owns a single-value slot. Publishing overwrites the slot
//! and never waits, so a subscriber that stops reading holds only the most
//! recent snapshot and never delays the poll loop or its peers.
//!
//! # Usage
//!
//! ```ignore
//! let monitor = Arc::new(Monitor::new(Arc::new(TmuxSource::new()), MonitorConfig::default()));
//! monitor.start()?;
//!
//! let mut sub = monitor.subscribe();
//! while let Some(snapshot) = sub.recv().await {
//!     render(&snapshot);
//! }
//!
//! monitor.stop().await;
//! ```

pub mod reconcile;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::StatusPolicy;
use crate::git::{self, GitError};
use crate::models::{DiffStat, Pane, PrInfo, Session};
use crate::tmux::{NewSession, PaneTypeDetector, SessionSource, SourceError};

pub use reconcile::{reconcile, Observation};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Immutable copy of the full session table at one point in time.
pub type Snapshot = Arc<Vec<Session>>;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor is already running")]
    AlreadyRunning,
    #[error("Monitor has been stopped and cannot be restarted")]
    Stopped,
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Pane {pane} not found in session {session}")]
    PaneNotFound { session: String, pane: usize },
    #[error("Session is not in a git repository: {0}")]
    NotAGitRepo(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Diff failed: {0}")]
    Git(#[from] GitError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub policy: StatusPolicy,
    pub detector: PaneTypeDetector,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            policy: StatusPolicy::default(),
            detector: PaneTypeDetector::default(),
        }
    }
}

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Receiving end of a monitor subscription.
///
/// Holds at most one pending snapshot. Reading after
/// [`Monitor::unsubscribe`] yields `None` once any pending value is drained.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: watch::Receiver<Snapshot>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next published snapshot. `None` means the subscription
    /// was closed and the consumer must stop reading.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }

    /// Take the pending snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        if self.has_pending() {
            Some(Arc::clone(&self.rx.borrow_and_update()))
        } else {
            None
        }
    }

    /// Whether a snapshot has been published since the last read.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

pub struct Monitor {
    source: Arc<dyn SessionSource>,
    config: MonitorConfig,
    sessions: RwLock<Vec<Session>>,
    subscribers: Mutex<HashMap<u64, watch::Sender<Snapshot>>>,
    next_subscriber: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    // Serializes poll cycles between the loop and direct callers
    cycle: tokio::sync::Mutex<()>,
    listing_failed: AtomicBool,
}

impl Monitor {
    pub fn new(source: Arc<dyn SessionSource>, config: MonitorConfig) -> Self {
        Self {
            source,
            config,
            sessions: RwLock::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(1),
            lifecycle: Mutex::new(Lifecycle::Idle),
            cancel: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
            cycle: tokio::sync::Mutex::new(()),
            listing_failed: AtomicBool::new(false),
        }
    }

    // ==================== Lifecycle ====================

    /// Spawn the poll loop. A monitor runs at most once.
    pub fn start(self: &Arc<Self>) -> Result<(), MonitorError> {
        let mut lifecycle = lock(&self.lifecycle);
        match *lifecycle {
            Lifecycle::Running(_) => return Err(MonitorError::AlreadyRunning),
            Lifecycle::Stopped => return Err(MonitorError::Stopped),
            Lifecycle::Idle => {}
        }

        let handle = tokio::spawn(poll_loop(
            Arc::downgrade(self),
            self.cancel.clone(),
            Arc::clone(&self.wake),
            self.config.poll_interval,
        ));
        *lifecycle = Lifecycle::Running(handle);

        info!(
            interval_ms = %self.config.poll_interval.as_millis(),
            "Session monitor started"
        );
        Ok(())
    }

    /// Signal the poll loop to exit and wait for it. Safe to call more than
    /// once, before `start`, or after the loop already exited. A cycle in
    /// progress runs to completion first.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handle = {
            let mut lifecycle = lock(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(handle) => Some(handle),
                Lifecycle::Idle | Lifecycle::Stopped => None,
            }
        };

        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("Session monitor did not stop within {:?}", STOP_TIMEOUT);
            }
            info!("Session monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&*lock(&self.lifecycle), Lifecycle::Running(handle) if !handle.is_finished())
            && !self.cancel.is_cancelled()
    }

    /// Ask the loop to poll now instead of at the next tick. Repeated
    /// requests before the loop wakes collapse into one extra cycle.
    pub fn request_poll(&self) {
        self.wake.notify_one();
    }

    // ==================== Reads ====================

    /// Copy of the current table. Empty before the first poll.
    pub fn snapshot(&self) -> Vec<Session> {
        self.read_table().clone()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Session> {
        self.read_table().iter().find(|s| s.name == name).cloned()
    }

    // ==================== Subscriptions ====================

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        // Held until the sender is registered so no publish slips in between
        let table = self.read_table();
        let (tx, rx) = watch::channel(Arc::new(table.clone()));
        lock(&self.subscribers).insert(id, tx);
        drop(table);
        debug!(subscriber = id, "Subscriber added");
        Subscription { id, rx }
    }

    /// Close a subscription. Its receiver observes closure after draining
    /// any pending snapshot. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        if lock(&self.subscribers).remove(&id).is_some() {
            debug!(subscriber = id, "Subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers)
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    // ==================== Poll cycle ====================

    pub async fn poll_once(&self) {
        self.poll_at(Utc::now()).await;
    }

    /// Run one full poll cycle, classifying against `now`.
    pub async fn poll_at(&self, now: DateTime<Utc>) {
        let _cycle = self.cycle.lock().await;

        let names = match self.source.list_session_names().await {
            Ok(names) => {
                if self.listing_failed.swap(false, Ordering::Relaxed) {
                    info!("Session listing recovered");
                }
                names
            }
            Err(e) => {
                // Only the first failure in a streak is worth a warning
                if self.listing_failed.swap(true, Ordering::Relaxed) {
                    debug!(error = %e, "Session listing still failing");
                } else {
                    warn!(error = %e, "Failed to list sessions, clearing table");
                }
                Vec::new()
            }
        };

        let known: HashSet<String> = self.read_table().iter().map(|s| s.name.clone()).collect();

        let mut seen = HashSet::new();
        let names: Vec<String> = names.into_iter().filter(|n| seen.insert(n.clone())).collect();

        let observations =
            join_all(names.iter().map(|name| self.observe(name, !known.contains(name)))).await;

        let snapshot = {
            let mut table = self.write_table();
            let previous: HashMap<&str, &Session> =
                table.iter().map(|s| (s.name.as_str(), s)).collect();

            let next: Vec<Session> = observations
                .into_iter()
                .map(|obs| {
                    let prev = previous.get(obs.name.as_str()).copied();
                    reconcile(prev, obs, &self.config.policy, now)
                })
                .collect();
            drop(previous);

            *table = next;
            let snapshot = Arc::new(table.clone());
            // Publishing under the write guard keeps every subscriber's
            // latest value in table order
            self.publish(&snapshot);
            snapshot
        };

        debug!(sessions = snapshot.len(), "Poll cycle complete");
    }

    async fn observe(&self, name: &str, is_new: bool) -> Observation {
        let pane_count = self.source.pane_count(name).await.unwrap_or_else(|e| {
            debug!(session = name, error = %e, "Failed to count panes");
            0
        });

        let mut panes = Vec::with_capacity(pane_count);
        let mut primary = None;

        for index in 0..pane_count {
            let process = self
                .source
                .pane_process_name(name, index)
                .await
                .unwrap_or_else(|e| {
                    debug!(session = name, pane = index, error = %e, "Failed to read pane process");
                    String::new()
                });
            let pane_type = self.config.detector.detect(&process);

            let content = if pane_type.is_editor() {
                String::new()
            } else {
                let text = self.capture(name, index).await;
                if primary.is_none() {
                    primary = Some(text.clone());
                }
                text
            };

            panes.push(Pane::new(index, pane_type, process, content));
        }

        let git = if is_new {
            self.source.detect_git_info(name).await.unwrap_or_else(|e| {
                debug!(session = name, error = %e, "Git detection failed");
                None
            })
        } else {
            None
        };

        Observation {
            name: name.to_string(),
            panes,
            primary: primary.unwrap_or_default(),
            git,
        }
    }

    async fn capture(&self, name: &str, index: usize) -> String {
        match self.source.capture_pane_text(name, index).await {
            Ok(text) => text,
            Err(e) if index != 0 => {
                debug!(session = name, pane = index, error = %e, "Capture failed, falling back to pane 0");
                self.source
                    .capture_pane_text(name, 0)
                    .await
                    .unwrap_or_default()
            }
            Err(e) => {
                debug!(session = name, pane = index, error = %e, "Capture failed");
                String::new()
            }
        }
    }

    /// Callers hold the table lock, which orders publishes.
    fn publish(&self, snapshot: &Snapshot) {
        lock(&self.subscribers).retain(|id, tx| {
            if tx.is_closed() {
                debug!(subscriber = id, "Pruning subscriber with dropped receiver");
                return false;
            }
            tx.send_replace(Arc::clone(snapshot));
            true
        });
    }

    // ==================== Control ====================

    /// Type text into a pane. Without an explicit pane the session's agent
    /// pane is used, falling back to its first non-editor pane.
    pub async fn send_text(
        &self,
        name: &str,
        pane: Option<usize>,
        text: &str,
    ) -> Result<usize, MonitorError> {
        let session = self
            .find_by_name(name)
            .ok_or_else(|| MonitorError::SessionNotFound(name.to_string()))?;

        let index = match pane {
            Some(index) if session.pane(index).is_some() => index,
            Some(index) => {
                return Err(MonitorError::PaneNotFound {
                    session: name.to_string(),
                    pane: index,
                })
            }
            None => session.control_pane().map_or(0, |p| p.index),
        };

        self.source.send_text(name, index, text).await?;
        Ok(index)
    }

    pub async fn create_session(&self, spec: &NewSession) -> Result<(), MonitorError> {
        self.source.create_session(spec).await?;
        self.request_poll();
        Ok(())
    }

    pub async fn kill_session(&self, name: &str) -> Result<(), MonitorError> {
        if self.find_by_name(name).is_none() {
            return Err(MonitorError::SessionNotFound(name.to_string()));
        }
        self.source.kill_session(name).await?;
        self.request_poll();
        Ok(())
    }

    /// Compute the working-tree diff for a session and keep it on the
    /// session until it disappears.
    pub async fn refresh_diff(&self, name: &str) -> Result<DiffStat, MonitorError> {
        let session = self
            .find_by_name(name)
            .ok_or_else(|| MonitorError::SessionNotFound(name.to_string()))?;
        if !session.is_git_repo {
            return Err(MonitorError::NotAGitRepo(name.to_string()));
        }

        let path = std::path::PathBuf::from(&session.git_path);
        let stat = tokio::task::spawn_blocking(move || git::diff_stat(&path)).await??;

        self.update_session(name, |s| s.diff = Some(stat))?;
        Ok(stat)
    }

    /// Attach pull request details from an external VCS host integration.
    pub fn annotate_pr(&self, name: &str, pr: PrInfo) -> Result<(), MonitorError> {
        self.update_session(name, |s| s.pr = Some(pr))
    }

    fn update_session(
        &self,
        name: &str,
        apply: impl FnOnce(&mut Session),
    ) -> Result<(), MonitorError> {
        let mut table = self.write_table();
        let session = table
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| MonitorError::SessionNotFound(name.to_string()))?;
        apply(session);
        self.publish(&Arc::new(table.clone()));
        Ok(())
    }

    fn read_table(&self) -> RwLockReadGuard<'_, Vec<Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, Vec<Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        // Signal shutdown on drop
        self.cancel.cancel();
    }
}

async fn poll_loop(
    monitor: Weak<Monitor>,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            () = wake.notified() => ticker.reset(),
        }

        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        monitor.poll_once().await;
    }

    debug!("Session monitor loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
