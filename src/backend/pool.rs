//! Bounded connection pool for one logical target.
//!
//! # Responsibilities
//! - Lease idle connections, open new ones up to `max_size`
//! - Queue acquirers FIFO when exhausted, bounded by the acquire timeout
//! - Take connections back clean or broken, topping up toward `min_size`
//! - Probe, reap, fail over and drain on request of the monitor and
//!   lifecycle layers
//!
//! # Accounting
//! ```text
//! total = idle + leased + opening + probing <= max_size
//! ```
//! Every slot is in exactly one of those buckets. A waiter is granted
//! either a ready connection or the right to open one (`opening` is
//! incremented on its behalf), so a cancelled waiter can always give
//! back what it was handed.
//!
//! # Design Decisions
//! - One `parking_lot::Mutex` per pool, never held across an await
//! - Grants are sent under the lock; the waiter's drop guard removes it
//!   from the queue or returns an undelivered grant under the same lock
//! - Failover bumps a generation; connections from an older generation
//!   are closed when released, never mid-transaction

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::connection::{BackendConnection, ConnectionId, ConnectionState, Response};
use crate::backend::transport::Connector;
use crate::config::{RetryConfig, TargetConfig};
use crate::error::{PoolerError, PoolerResult};
use crate::health::state::TargetHealth;
use crate::observability::metrics;
use crate::protocol::{BoundaryDetector, Frame};
use crate::resilience::backoff::replacement_delay;
use crate::resilience::timeouts::with_timeout;

/// Live-tunable pool parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: usize,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub retry: RetryConfig,
}

impl PoolSettings {
    pub fn from_target(target: &TargetConfig, retry: &RetryConfig) -> Self {
        Self {
            min_size: target.min_size,
            max_size: target.max_size,
            acquire_timeout: target.acquire_timeout(),
            connect_timeout: target.connect_timeout(),
            idle_timeout: target.idle_timeout(),
            retry: retry.clone(),
        }
    }
}

/// How a lease ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The connection is in a known-good state between transactions.
    Clean,
    /// The connection must not be reused.
    Broken,
}

/// Result of one probe pass over the idle set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub probed: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Result of draining a pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub closed_idle: usize,
    pub force_closed: usize,
}

/// Point-in-time view for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub address: String,
    pub primary_address: String,
    pub standby_address: Option<String>,
    pub idle: usize,
    pub leased: usize,
    pub waiting: usize,
    pub opening: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub degraded: bool,
    pub on_standby: bool,
    pub draining: bool,
    pub generation: u64,
    pub opened_total: u64,
    pub closed_total: u64,
    pub acquire_timeouts: u64,
}

enum Grant {
    /// A connection already counted as leased.
    Ready(BackendConnection),
    /// Permission to open a connection; already counted in `opening`.
    Open,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Grant>,
}

struct PoolState {
    idle: VecDeque<BackendConnection>,
    leased: HashSet<ConnectionId>,
    opening: usize,
    probing: usize,
    waiters: VecDeque<Waiter>,
    next_waiter: u64,
    address: String,
    generation: u64,
    on_standby: bool,
    draining: bool,
}

impl PoolState {
    fn total(&self) -> usize {
        self.idle.len() + self.leased.len() + self.opening + self.probing
    }

    fn busy(&self) -> usize {
        self.leased.len() + self.opening + self.probing
    }

    /// Most recently returned first, so the oldest ones age out.
    fn take_idle(&mut self) -> Option<BackendConnection> {
        let mut conn = self.idle.pop_back()?;
        conn.state = ConnectionState::Leased;
        self.leased.insert(conn.id());
        Some(conn)
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    opened: AtomicU64,
    closed: AtomicU64,
    acquire_timeouts: AtomicU64,
}

/// Connection pool for one target.
pub struct BackendPool {
    name: String,
    primary: String,
    settings: ArcSwap<PoolSettings>,
    standby: ArcSwapOption<String>,
    state: Mutex<PoolState>,
    detector: Arc<dyn BoundaryDetector>,
    connector: Arc<dyn Connector>,
    health: TargetHealth,
    released: Notify,
    kill: CancellationToken,
    counters: PoolCounters,
}

impl std::fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPool")
            .field("name", &self.name)
            .field("address", &self.address())
            .field("detector", &self.detector.name())
            .finish()
    }
}

impl BackendPool {
    pub fn new(
        target: &TargetConfig,
        retry: &RetryConfig,
        connector: Arc<dyn Connector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: target.name.clone(),
            primary: target.address.clone(),
            settings: ArcSwap::from_pointee(PoolSettings::from_target(target, retry)),
            standby: ArcSwapOption::from(target.standby_address.clone().map(Arc::new)),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                leased: HashSet::new(),
                opening: 0,
                probing: 0,
                waiters: VecDeque::new(),
                next_waiter: 0,
                address: target.address.clone(),
                generation: 0,
                on_standby: false,
                draining: false,
            }),
            detector: target.detector.build(),
            connector,
            health: TargetHealth::new(),
            released: Notify::new(),
            kill: CancellationToken::new(),
            counters: PoolCounters::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address new connections are opened against.
    pub fn address(&self) -> String {
        self.state.lock().address.clone()
    }

    pub fn detector(&self) -> &Arc<dyn BoundaryDetector> {
        &self.detector
    }

    pub fn health(&self) -> &TargetHealth {
        &self.health
    }

    pub fn settings(&self) -> Arc<PoolSettings> {
        self.settings.load_full()
    }

    pub fn has_standby(&self) -> bool {
        self.standby.load().is_some()
    }

    pub fn on_standby(&self) -> bool {
        self.state.lock().on_standby
    }

    /// Swap sizing, timeouts and the standby address in place.
    pub fn apply_settings(&self, settings: PoolSettings, standby: Option<String>) {
        tracing::info!(
            pool = %self.name,
            min_size = settings.min_size,
            max_size = settings.max_size,
            acquire_timeout_ms = settings.acquire_timeout.as_millis() as u64,
            standby = ?standby,
            "Pool settings updated"
        );
        self.settings.store(Arc::new(settings));
        self.standby.store(standby.map(Arc::new));

        // A raised max_size opens slots for waiters already queued.
        let granted = {
            let mut state = self.state.lock();
            let mut granted = 0;
            while self.hand_off_slot(&mut state) {
                granted += 1;
            }
            granted
        };
        if granted > 0 {
            tracing::debug!(pool = %self.name, granted, "Queued acquirers granted new slots");
        }
        self.released.notify_waiters();
        self.publish();
    }

    /// Lease a connection.
    ///
    /// Reuses an idle connection, opens a new one below `max_size`, or
    /// queues behind earlier acquirers until a connection is released,
    /// `cancel` fires, or the acquire timeout elapses.
    pub async fn acquire(self: &Arc<Self>, cancel: &CancellationToken) -> PoolerResult<Lease> {
        let started = Instant::now();
        let settings = self.settings.load_full();

        let immediate = {
            let mut state = self.state.lock();
            if state.draining {
                return Err(PoolerError::Draining(self.name.clone()));
            }
            // Waiters already queued go first; no overtaking.
            let grant = if !state.waiters.is_empty() {
                None
            } else if let Some(conn) = state.take_idle() {
                Some(Grant::Ready(conn))
            } else if state.total() < settings.max_size {
                state.opening += 1;
                Some(Grant::Open)
            } else {
                None
            };
            grant.ok_or_else(|| {
                let id = state.next_waiter;
                state.next_waiter += 1;
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { id, tx });
                WaitGuard {
                    pool: self.as_ref(),
                    id,
                    rx,
                    done: false,
                }
            })
        };

        let grant = match immediate {
            Ok(grant) => grant,
            Err(guard) => {
                tracing::debug!(pool = %self.name, "Pool exhausted, waiting for a connection");
                self.publish();
                match self.wait(guard, cancel, settings.acquire_timeout).await {
                    Ok(grant) => grant,
                    Err(e) => {
                        metrics::record_acquire(&self.name, e.code(), started.elapsed());
                        return Err(e);
                    }
                }
            }
        };

        let lease = match grant {
            Grant::Ready(conn) => Ok(self.lease(conn)),
            Grant::Open => self.open_for_lease().await,
        };
        match &lease {
            Ok(lease) => {
                tracing::debug!(pool = %self.name, connection_id = %lease.id(), "Connection leased");
                metrics::record_acquire(&self.name, "ok", started.elapsed());
            }
            Err(e) => metrics::record_acquire(&self.name, e.code(), started.elapsed()),
        }
        self.publish();
        lease
    }

    async fn wait(
        &self,
        mut guard: WaitGuard<'_>,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> PoolerResult<Grant> {
        tokio::select! {
            biased;
            granted = &mut guard.rx => match granted {
                Ok(grant) => {
                    guard.done = true;
                    Ok(grant)
                }
                // Sender dropped: the pool started draining.
                Err(_) => Err(PoolerError::Draining(self.name.clone())),
            },
            _ = cancel.cancelled() => Err(PoolerError::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                self.counters.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pool = %self.name, timeout_ms = timeout.as_millis() as u64, "Acquire timed out");
                Err(PoolerError::PoolExhausted {
                    pool: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    fn lease(self: &Arc<Self>, conn: BackendConnection) -> Lease {
        Lease {
            id: conn.id(),
            address: conn.address().to_string(),
            conn: Some(conn),
            pool: Arc::downgrade(self),
            kill: self.kill.clone(),
            detector: Arc::clone(&self.detector),
        }
    }

    /// Open a connection for a slot already counted in `opening`.
    async fn open_for_lease(self: &Arc<Self>) -> PoolerResult<Lease> {
        let mut slot = OpenSlot::new(self);
        let (address, generation) = self.current_target();

        match self.connect(&address, generation).await {
            Ok(mut conn) => {
                let mut state = self.state.lock();
                slot.settle(&mut state);
                conn.state = ConnectionState::Leased;
                state.leased.insert(conn.id());
                drop(state);
                self.health.record_success();
                Ok(self.lease(conn))
            }
            Err(e) => {
                self.health.record_failure();
                tracing::warn!(pool = %self.name, address = %address, error = %e, "Failed to open backend connection");
                // Dropping the slot passes it on to the next waiter.
                Err(e)
            }
        }
    }

    fn current_target(&self) -> (String, u64) {
        let state = self.state.lock();
        (state.address.clone(), state.generation)
    }

    async fn connect(&self, address: &str, generation: u64) -> PoolerResult<BackendConnection> {
        let timeout = self.settings.load().connect_timeout;
        let result = with_timeout(timeout, self.connector.connect(address)).await;
        let reason = match result {
            Ok(Ok(transport)) => {
                let conn = BackendConnection::new(&self.name, address, generation, transport);
                self.counters.opened.fetch_add(1, Ordering::Relaxed);
                metrics::record_connection_opened(&self.name);
                tracing::debug!(pool = %self.name, connection_id = %conn.id(), address = %address, "Backend connection opened");
                return Ok(conn);
            }
            Ok(Err(e)) => e.to_string(),
            Err(elapsed) => elapsed.to_string(),
        };
        Err(PoolerError::Connect {
            address: address.to_string(),
            reason,
        })
    }

    /// Give a connection to the first live waiter, or park it idle.
    fn hand_off(&self, state: &mut PoolState, mut conn: BackendConnection) {
        while let Some(waiter) = state.waiters.pop_front() {
            conn.state = ConnectionState::Leased;
            state.leased.insert(conn.id());
            match waiter.tx.send(Grant::Ready(conn)) {
                Ok(()) => return,
                Err(Grant::Ready(returned)) => {
                    state.leased.remove(&returned.id());
                    conn = returned;
                }
                Err(Grant::Open) => return,
            }
        }
        conn.state = ConnectionState::Idle;
        state.idle.push_back(conn);
    }

    /// Grant an open slot to the first live waiter if there is room.
    fn hand_off_slot(&self, state: &mut PoolState) -> bool {
        let max = self.settings.load().max_size;
        while state.total() < max {
            let Some(waiter) = state.waiters.pop_front() else {
                return false;
            };
            state.opening += 1;
            if waiter.tx.send(Grant::Open).is_ok() {
                return true;
            }
            state.opening -= 1;
        }
        false
    }

    /// Return a leased connection.
    ///
    /// Only a clean connection with no open transaction, opened against
    /// the current target generation, goes back to the idle set.
    pub(crate) fn release(self: &Arc<Self>, conn: BackendConnection, outcome: ReleaseOutcome) {
        let settings = self.settings.load_full();
        let mut replace = false;

        let discarded = {
            let mut state = self.state.lock();
            state.leased.remove(&conn.id());

            let reason = if outcome == ReleaseOutcome::Broken || conn.is_broken() {
                Some("broken")
            } else if conn.state() == ConnectionState::InTransaction {
                Some("released mid-transaction")
            } else if conn.generation() != state.generation {
                Some("target switched")
            } else if state.draining {
                Some("draining")
            } else if state.total() >= settings.max_size {
                Some("pool shrunk")
            } else {
                None
            };

            match reason {
                None => {
                    self.hand_off(&mut state, conn);
                    None
                }
                Some(reason) => {
                    if !self.hand_off_slot(&mut state)
                        && !state.draining
                        && state.total() < settings.min_size
                    {
                        state.opening += 1;
                        replace = true;
                    }
                    Some((conn, reason))
                }
            }
        };

        if let Some((conn, reason)) = discarded {
            self.discard(conn, reason);
        }
        self.released.notify_waiters();
        self.publish();

        if replace {
            let pool = Arc::clone(self);
            let attempts = if settings.retry.enabled {
                settings.retry.replacement_attempts.max(1)
            } else {
                1
            };
            tokio::spawn(async move {
                pool.open_idle(attempts).await;
            });
        }
    }

    fn discard(&self, conn: BackendConnection, reason: &'static str) {
        tracing::debug!(pool = %self.name, connection_id = %conn.id(), reason, "Closing backend connection");
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_closed(&self.name, reason);
        conn.close();
    }

    /// Open one idle connection for a slot already counted in `opening`,
    /// retrying with backoff up to `attempts` times.
    async fn open_idle(&self, attempts: u32) -> bool {
        let mut slot = OpenSlot::new(self);
        let retry = self.settings.load().retry.clone();

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(replacement_delay(&retry, attempt)).await;
            }
            if self.kill.is_cancelled() || self.state.lock().draining {
                break;
            }

            let (address, generation) = self.current_target();
            match self.connect(&address, generation).await {
                Ok(conn) => {
                    let mut state = self.state.lock();
                    slot.settle(&mut state);
                    if state.draining || conn.generation() != state.generation {
                        drop(state);
                        self.discard(conn, "opened for a stale target");
                        return false;
                    }
                    self.hand_off(&mut state, conn);
                    drop(state);
                    self.health.record_success();
                    self.released.notify_waiters();
                    return true;
                }
                Err(e) => {
                    self.health.record_failure();
                    tracing::warn!(pool = %self.name, attempt = attempt + 1, error = %e, "Replacement connection failed");
                }
            }
        }
        false
    }

    /// Open connections until the pool holds at least `min_size`.
    pub async fn top_up(&self) -> usize {
        let needed = {
            let mut state = self.state.lock();
            if state.draining {
                return 0;
            }
            let needed = self.settings.load().min_size.saturating_sub(state.total());
            state.opening += needed;
            needed
        };
        if needed == 0 {
            return 0;
        }

        let opened = futures_util::future::join_all((0..needed).map(|_| self.open_idle(1)))
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        if opened > 0 {
            tracing::debug!(pool = %self.name, opened, "Pool topped up");
        }
        self.publish();
        opened
    }

    /// Probe every idle connection once.
    ///
    /// A connection that fails `unhealthy_threshold` probes in a row, or
    /// whose transport failed, is closed. Every probe result also feeds
    /// the target's health counter.
    pub async fn probe_idle(&self, timeout: Duration, unhealthy_threshold: u32) -> ProbeReport {
        let mut report = ProbeReport::default();
        let candidates: Vec<ConnectionId> = self.state.lock().idle.iter().map(|c| c.id()).collect();

        for id in candidates {
            let Some(mut probe) = ProbeGuard::take(self, id) else {
                continue;
            };
            report.probed += 1;

            let Some(conn) = probe.conn.as_mut() else {
                continue;
            };
            match conn.probe(self.detector.as_ref(), timeout).await {
                Ok(()) => {
                    conn.probe_failures = 0;
                    self.health.record_success();
                }
                Err(e) => {
                    conn.probe_failures += 1;
                    report.failed += 1;
                    let failures = self.health.record_failure();
                    metrics::record_probe_failure(&self.name);
                    tracing::warn!(
                        pool = %self.name,
                        connection_id = %conn.id(),
                        consecutive = conn.probe_failures,
                        target_failures = failures,
                        error = %e,
                        "Health probe failed"
                    );
                    if conn.probe_failures >= unhealthy_threshold || conn.is_broken() {
                        conn.mark_broken();
                        report.removed += 1;
                        tracing::warn!(pool = %self.name, connection_id = %conn.id(), "Connection marked broken after failed probes");
                    }
                }
            }
            probe.finish();
        }
        self.publish();
        report
    }

    /// Close idle connections unused for longer than the idle timeout,
    /// keeping at least `min_size`.
    pub fn reap_idle(&self) -> usize {
        let settings = self.settings.load_full();
        let reaped = {
            let mut state = self.state.lock();
            let mut excess = state.total().saturating_sub(settings.min_size);
            let mut reaped = Vec::new();
            let idle = std::mem::take(&mut state.idle);
            for conn in idle {
                if excess > 0 && conn.idle_for() >= settings.idle_timeout {
                    excess -= 1;
                    reaped.push(conn);
                } else {
                    state.idle.push_back(conn);
                }
            }
            reaped
        };

        let count = reaped.len();
        for conn in reaped {
            self.discard(conn, "idle timeout");
        }
        if count > 0 {
            tracing::debug!(pool = %self.name, reaped = count, "Idle connections reaped");
            self.publish();
        }
        count
    }

    /// Point new leases at the standby address.
    ///
    /// Idle connections to the old address are closed right away; leased
    /// ones finish their work and are closed when released. Returns the
    /// new address, or `None` without a standby or when already switched.
    pub fn fail_over(&self) -> Option<String> {
        let standby = self.standby.load_full()?;
        let (idle, from) = {
            let mut state = self.state.lock();
            if state.on_standby || state.draining {
                return None;
            }
            let from = std::mem::replace(&mut state.address, standby.to_string());
            state.generation += 1;
            state.on_standby = true;
            let idle = std::mem::take(&mut state.idle);
            while self.hand_off_slot(&mut state) {}
            (idle, from)
        };

        for conn in idle {
            self.discard(conn, "target switched");
        }
        self.health.clear_failures();
        metrics::record_failover(&self.name);
        tracing::warn!(pool = %self.name, from = %from, to = %standby, "Failed over to standby");
        self.released.notify_waiters();
        self.publish();
        Some(standby.to_string())
    }

    /// Stop leasing, close idle connections and wait for leased ones.
    ///
    /// Leases still out at the deadline are force-closed: their next or
    /// in-flight exchange fails with `BackendBroken`.
    pub async fn drain(&self, deadline: Duration) -> DrainReport {
        let idle = {
            let mut state = self.state.lock();
            state.draining = true;
            // Dropping the senders wakes every waiter with `Draining`.
            state.waiters.clear();
            std::mem::take(&mut state.idle)
        };
        let mut report = DrainReport {
            closed_idle: idle.len(),
            force_closed: 0,
        };
        for conn in idle {
            self.discard(conn, "draining");
        }
        tracing::info!(pool = %self.name, closed_idle = report.closed_idle, "Pool draining");

        let deadline_at = Instant::now() + deadline;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let busy = self.state.lock().busy();
            if busy == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline_at, notified).await.is_err() {
                report.force_closed = self.state.lock().leased.len();
                self.kill.cancel();
                let err = PoolerError::DrainTimeout {
                    force_closed: report.force_closed,
                };
                tracing::error!(pool = %self.name, error = %err, "Drain deadline expired");
                break;
            }
        }

        self.publish();
        tracing::info!(pool = %self.name, force_closed = report.force_closed, "Pool drained");
        report
    }

    pub fn status(&self) -> PoolStatus {
        let settings = self.settings.load();
        let state = self.state.lock();
        PoolStatus {
            name: self.name.clone(),
            address: state.address.clone(),
            primary_address: self.primary.clone(),
            standby_address: self.standby.load_full().map(|s| s.to_string()),
            idle: state.idle.len(),
            leased: state.leased.len(),
            waiting: state.waiters.len(),
            opening: state.opening,
            min_size: settings.min_size,
            max_size: settings.max_size,
            degraded: self.health.is_degraded(),
            on_standby: state.on_standby,
            draining: state.draining,
            generation: state.generation,
            opened_total: self.counters.opened.load(Ordering::Relaxed),
            closed_total: self.counters.closed.load(Ordering::Relaxed),
            acquire_timeouts: self.counters.acquire_timeouts.load(Ordering::Relaxed),
        }
    }

    fn publish(&self) {
        let (idle, leased, waiting) = {
            let state = self.state.lock();
            (state.idle.len(), state.leased.len(), state.waiters.len())
        };
        metrics::set_pool_gauges(&self.name, idle, leased, waiting);
    }
}

/// Queue position of a suspended acquirer.
///
/// Dropping it before a grant arrives removes the waiter; dropping it
/// after an undelivered grant gives that grant back to the pool.
struct WaitGuard<'a> {
    pool: &'a BackendPool,
    id: u64,
    rx: oneshot::Receiver<Grant>,
    done: bool,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.pool.state.lock();
        if let Some(pos) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(pos);
            return;
        }
        match self.rx.try_recv() {
            Ok(Grant::Ready(conn)) => {
                state.leased.remove(&conn.id());
                self.pool.hand_off(&mut state, conn);
            }
            Ok(Grant::Open) => {
                state.opening -= 1;
                self.pool.hand_off_slot(&mut state);
            }
            Err(_) => {}
        }
        drop(state);
        self.pool.released.notify_waiters();
    }
}

/// A reserved `opening` slot. Unless settled, dropping it frees the
/// slot and offers it to the next waiter.
struct OpenSlot<'a> {
    pool: &'a BackendPool,
    armed: bool,
}

impl<'a> OpenSlot<'a> {
    fn new(pool: &'a BackendPool) -> Self {
        Self { pool, armed: true }
    }

    fn settle(&mut self, state: &mut PoolState) {
        if self.armed {
            self.armed = false;
            state.opening -= 1;
        }
    }
}

impl Drop for OpenSlot<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.pool.state.lock();
        state.opening -= 1;
        self.pool.hand_off_slot(&mut state);
        drop(state);
        self.pool.released.notify_waiters();
    }
}

/// An idle connection taken out for probing, counted in `probing`.
struct ProbeGuard<'a> {
    pool: &'a BackendPool,
    conn: Option<BackendConnection>,
}

impl<'a> ProbeGuard<'a> {
    fn take(pool: &'a BackendPool, id: ConnectionId) -> Option<Self> {
        let mut state = pool.state.lock();
        if state.draining {
            return None;
        }
        let pos = state.idle.iter().position(|c| c.id() == id)?;
        let conn = state.idle.remove(pos)?;
        state.probing += 1;
        Some(Self {
            pool,
            conn: Some(conn),
        })
    }

    /// Put the connection back, or close it if it broke.
    fn finish(mut self) {
        self.put_back();
    }

    fn put_back(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let mut state = self.pool.state.lock();
        state.probing -= 1;
        let reason = if conn.is_broken() {
            Some("failed health probes")
        } else if state.draining || conn.generation() != state.generation {
            Some("target switched")
        } else {
            None
        };
        match reason {
            None => self.pool.hand_off(&mut state, conn),
            Some(reason) => {
                self.pool.hand_off_slot(&mut state);
                drop(state);
                self.pool.discard(conn, reason);
            }
        }
        self.pool.released.notify_waiters();
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        // An interrupted probe leaves the stream in an unknown state.
        if let Some(conn) = self.conn.as_mut() {
            conn.mark_broken();
        }
        self.put_back();
    }
}

/// Exclusive use of one backend connection.
///
/// Dropping a lease without [`Lease::release`] returns the connection
/// as broken.
#[derive(Debug)]
pub struct Lease {
    id: ConnectionId,
    address: String,
    conn: Option<BackendConnection>,
    pool: Weak<BackendPool>,
    kill: CancellationToken,
    detector: Arc<dyn BoundaryDetector>,
}

impl Lease {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address the leased connection was opened against.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.conn
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ConnectionState::Broken)
    }

    pub fn is_broken(&self) -> bool {
        self.state() == ConnectionState::Broken
    }

    /// Forward one request and collect its response.
    pub async fn exchange(&mut self, request: &Frame) -> PoolerResult<Response> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(PoolerError::BackendBroken("lease already released".to_string()));
        };
        let outcome = tokio::select! {
            biased;
            _ = self.kill.cancelled() => None,
            result = conn.exchange(request, self.detector.as_ref()) => Some(result),
        };
        match outcome {
            Some(result) => result,
            None => {
                conn.mark_broken();
                Err(PoolerError::BackendBroken(format!(
                    "{} force-closed by pool drain",
                    conn.id()
                )))
            }
        }
    }

    /// The detector's frame for aborting an open transaction.
    pub fn rollback_frame(&self) -> Frame {
        self.detector.rollback_frame()
    }

    /// Track whether a transaction is open on this connection.
    pub fn set_in_transaction(&mut self, open: bool) {
        if let Some(conn) = self.conn.as_mut() {
            if conn.is_broken() {
                return;
            }
            conn.state = if open {
                ConnectionState::InTransaction
            } else {
                ConnectionState::Leased
            };
        }
    }

    pub fn release(mut self, outcome: ReleaseOutcome) {
        self.give_back(outcome);
    }

    fn give_back(&mut self, outcome: ReleaseOutcome) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(pool) => pool.release(conn, outcome),
            None => conn.close(),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.give_back(ReleaseOutcome::Broken);
    }
}
