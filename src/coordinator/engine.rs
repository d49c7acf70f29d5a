//! Request routing between client sessions and backend pools.
//!
//! # Responsibilities
//! - Open sessions against a named target
//! - Bind, keep and release backend connections per pairing policy
//! - Advance transaction state from detector markers and responses
//! - Roll back open transactions on disconnect
//! - Apply reloaded configuration and drain pools at shutdown

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::backend::pool::{BackendPool, DrainReport, PoolSettings, PoolStatus, ReleaseOutcome};
use crate::backend::transport::Connector;
use crate::config::PoolerConfig;
use crate::coordinator::PairingPolicy;
use crate::error::{PoolerError, PoolerResult};
use crate::observability::metrics;
use crate::protocol::frame::tag;
use crate::protocol::{Frame, RequestMarker};
use crate::resilience::retries::should_retry;
use crate::resilience::timeouts::with_timeout;
use crate::session::{ClientSession, SessionId, SessionSummary, TxnState};

/// Upper bound on the rollback issued for a disconnecting client.
const DISCONNECT_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes requests from every session to the pool of its target.
pub struct Coordinator {
    pools: HashMap<String, Arc<BackendPool>>,
    sessions: DashMap<SessionId, SessionSummary>,
    config: ArcSwap<PoolerConfig>,
}

impl Coordinator {
    /// Build one pool per configured target.
    pub fn new(config: &PoolerConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        let pools = config
            .targets
            .iter()
            .map(|target| {
                let pool = BackendPool::new(target, &config.retries, Arc::clone(&connector));
                tracing::info!(
                    pool = %target.name,
                    address = %target.address,
                    min_size = target.min_size,
                    max_size = target.max_size,
                    pairing = %target.pairing,
                    detector = pool.detector().name(),
                    "Pool configured"
                );
                (target.name.clone(), pool)
            })
            .collect();

        Arc::new(Self {
            pools,
            sessions: DashMap::new(),
            config: ArcSwap::from_pointee(config.clone()),
        })
    }

    pub fn pool(&self, name: &str) -> Option<&Arc<BackendPool>> {
        self.pools.get(name)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<BackendPool>> {
        self.pools.values()
    }

    pub fn config(&self) -> Arc<PoolerConfig> {
        self.config.load_full()
    }

    /// Open every pool's `min_size` connections. Failures are logged and
    /// left to the health monitor.
    pub async fn warm_up(&self) {
        join_all(self.pools.values().map(|pool| async move {
            let opened = pool.top_up().await;
            tracing::info!(pool = %pool.name(), opened, "Pool warmed up");
        }))
        .await;
    }

    /// Start a session from startup parameters.
    ///
    /// `database` names the target; `pairing` optionally overrides the
    /// target's default policy.
    pub fn open_session(
        &self,
        params: &HashMap<String, String>,
        peer: Option<SocketAddr>,
    ) -> PoolerResult<ClientSession> {
        let database = params
            .get("database")
            .ok_or_else(|| PoolerError::Protocol("startup is missing 'database'".to_string()))?;
        if !self.pools.contains_key(database) {
            return Err(PoolerError::UnknownTarget(database.clone()));
        }
        let config = self.config.load();
        let default_policy = config
            .target(database)
            .map(|t| t.pairing)
            .unwrap_or_default();
        let policy = match params.get("pairing") {
            Some(value) => value.parse()?,
            None => default_policy,
        };

        let session = ClientSession::new(database, policy, peer);
        self.sessions.insert(session.id(), session.summary());
        metrics::set_active_sessions(self.sessions.len());
        tracing::info!(
            session_id = %session.id(),
            target = %database,
            policy = %policy,
            peer = ?peer,
            "Session opened"
        );
        Ok(session)
    }

    fn pool_for(&self, session: &ClientSession) -> PoolerResult<&Arc<BackendPool>> {
        self.pools
            .get(session.target())
            .ok_or_else(|| PoolerError::UnknownTarget(session.target().to_string()))
    }

    /// Change a session's pairing policy.
    ///
    /// Switching to statement pairing with a transaction open is a
    /// `PolicyViolation` and leaves the session untouched.
    pub fn set_policy(&self, session: &mut ClientSession, policy: PairingPolicy) -> PoolerResult<()> {
        if policy == PairingPolicy::Statement && session.txn.is_open() {
            metrics::record_policy_violation(session.target());
            return Err(PoolerError::PolicyViolation(format!(
                "cannot switch to statement pairing inside a {:?} transaction",
                session.txn
            )));
        }
        tracing::debug!(session_id = %session.id(), from = %session.policy, to = %policy, "Pairing policy changed");
        session.policy = policy;
        self.settle_binding(session);
        self.sessions.insert(session.id(), session.summary());
        Ok(())
    }

    /// Forward one request and return the frames to send back.
    ///
    /// `cancel` fires when the client goes away; it aborts a pending
    /// acquire but never an exchange already in flight.
    pub async fn handle_request(
        &self,
        session: &mut ClientSession,
        request: &Frame,
        cancel: &CancellationToken,
    ) -> PoolerResult<Vec<Frame>> {
        session.requests += 1;
        let result = self.route(session, request, cancel).await;
        self.sessions.insert(session.id(), session.summary());
        result
    }

    async fn route(
        &self,
        session: &mut ClientSession,
        request: &Frame,
        cancel: &CancellationToken,
    ) -> PoolerResult<Vec<Frame>> {
        let pool = Arc::clone(self.pool_for(session)?);
        let marker = pool.detector().classify_request(request);

        if session.policy == PairingPolicy::Statement && marker == RequestMarker::Begin {
            metrics::record_policy_violation(session.target());
            return Err(PoolerError::PolicyViolation(
                "transactions are not available under statement pairing".to_string(),
            ));
        }

        // The connection that held this transaction is gone.
        if session.txn == TxnState::Failed && session.binding.is_none() {
            return match marker {
                RequestMarker::Rollback | RequestMarker::Commit => {
                    session.txn = TxnState::None;
                    Ok(vec![Frame::new(tag::COMMAND_COMPLETE, "ROLLBACK"), Frame::ready()])
                }
                _ => Err(PoolerError::BackendBroken(
                    "transaction aborted after its backend connection was lost; roll back to continue"
                        .to_string(),
                )),
            };
        }

        let retry = self.config.load().retries.clone();
        let mut attempt = 0;
        loop {
            let in_txn = session.txn.is_open();

            if session.binding.is_none() {
                match pool.acquire(cancel).await {
                    Ok(lease) => {
                        tracing::debug!(session_id = %session.id(), connection_id = %lease.id(), "Session bound");
                        session.binding = Some(lease);
                    }
                    Err(e) if should_retry(&retry, &e, in_txn, attempt) => {
                        attempt += 1;
                        tracing::info!(session_id = %session.id(), error = %e, "Retrying acquire");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            let Some(lease) = session.binding.as_mut() else {
                continue;
            };

            match lease.exchange(request).await {
                Ok(response) => {
                    session.txn = session.txn.after(marker, response.failed);
                    lease.set_in_transaction(session.txn.is_open());
                    self.settle_binding(session);
                    return Ok(response.frames);
                }
                Err(e) => {
                    if let Some(lease) = session.binding.take() {
                        tracing::warn!(
                            session_id = %session.id(),
                            connection_id = %lease.id(),
                            error = %e,
                            "Backend connection lost"
                        );
                        lease.release(ReleaseOutcome::Broken);
                    }
                    if in_txn {
                        session.txn = TxnState::Failed;
                        return Err(e);
                    }
                    if should_retry(&retry, &e, in_txn, attempt) {
                        attempt += 1;
                        tracing::info!(session_id = %session.id(), "Retrying request on a fresh connection");
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Release the binding if the policy no longer needs it.
    fn settle_binding(&self, session: &mut ClientSession) {
        let Some(lease) = session.binding.as_ref() else {
            return;
        };
        let keep = !lease.is_broken()
            && (session.txn.is_open() || session.policy.holds_between_transactions());
        if keep {
            return;
        }
        if let Some(lease) = session.binding.take() {
            let outcome = if lease.is_broken() {
                ReleaseOutcome::Broken
            } else {
                ReleaseOutcome::Clean
            };
            tracing::debug!(session_id = %session.id(), connection_id = %lease.id(), ?outcome, "Session unbound");
            lease.release(outcome);
        }
    }

    /// End a session, rolling back any open transaction first.
    ///
    /// The connection goes back clean only if the rollback succeeded.
    pub async fn close_session(&self, mut session: ClientSession) {
        if let Some(mut lease) = session.binding.take() {
            let outcome = if session.txn.is_open() {
                let rollback = lease.rollback_frame();
                match with_timeout(DISCONNECT_ROLLBACK_TIMEOUT, lease.exchange(&rollback)).await {
                    Ok(Ok(response)) if !response.failed => {
                        lease.set_in_transaction(false);
                        tracing::info!(session_id = %session.id(), connection_id = %lease.id(), "Open transaction rolled back on disconnect");
                        ReleaseOutcome::Clean
                    }
                    Ok(Ok(_)) => {
                        tracing::warn!(session_id = %session.id(), "Rollback on disconnect was rejected; discarding connection");
                        ReleaseOutcome::Broken
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(session_id = %session.id(), error = %e, "Rollback on disconnect failed; discarding connection");
                        ReleaseOutcome::Broken
                    }
                    Err(_) => {
                        tracing::warn!(session_id = %session.id(), "Rollback on disconnect timed out; discarding connection");
                        ReleaseOutcome::Broken
                    }
                }
            } else {
                ReleaseOutcome::Clean
            };
            lease.release(outcome);
        }
        session.txn = TxnState::None;

        self.sessions.remove(&session.id());
        metrics::set_active_sessions(self.sessions.len());
        tracing::info!(session_id = %session.id(), requests = session.requests, "Session closed");
    }

    pub fn session_summaries(&self) -> Vec<SessionSummary> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn pool_statuses(&self) -> Vec<PoolStatus> {
        let mut statuses: Vec<_> = self.pools.values().map(|p| p.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Manually switch a pool to its standby.
    pub fn fail_over(&self, pool: &str) -> PoolerResult<Option<String>> {
        let pool = self
            .pools
            .get(pool)
            .ok_or_else(|| PoolerError::UnknownTarget(pool.to_string()))?;
        Ok(pool.fail_over())
    }

    /// Apply a reloaded configuration to the existing pools.
    ///
    /// Sizing, timeouts, pairing defaults and standby addresses change in
    /// place. Added or removed targets need a restart.
    pub fn apply_config(&self, config: PoolerConfig) {
        for target in &config.targets {
            match self.pools.get(&target.name) {
                Some(pool) => pool.apply_settings(
                    PoolSettings::from_target(target, &config.retries),
                    target.standby_address.clone(),
                ),
                None => tracing::warn!(target = %target.name, "New target ignored until restart"),
            }
        }
        for name in self.pools.keys() {
            if config.target(name).is_none() {
                tracing::warn!(target = %name, "Removed target keeps serving until restart");
            }
        }
        self.config.store(Arc::new(config));
        tracing::info!("Configuration reloaded");
    }

    /// Drain every pool concurrently under the configured deadline.
    pub async fn drain(&self) -> Vec<(String, DrainReport)> {
        let deadline = self.config.load().shutdown.drain_timeout();
        let reports = join_all(self.pools.values().map(|pool| async move {
            (pool.name().to_string(), pool.drain(deadline).await)
        }))
        .await;

        let force_closed: usize = reports.iter().map(|(_, r)| r.force_closed).sum();
        if force_closed > 0 {
            let err = PoolerError::DrainTimeout { force_closed };
            tracing::error!(error = %err, "Shutdown drain incomplete");
        }
        reports
    }
}
