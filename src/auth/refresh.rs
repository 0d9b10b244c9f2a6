//! Single-flight credential refresh
//!
//! The first request to fail with 401 starts one refresh; every 401 observed
//! while that refresh runs joins its queue instead of starting another. Once
//! the refresh settles the queue is drained in arrival order: replayed one at
//! a time with the new credential on success, rejected with `SessionExpired`
//! on failure.
//!
//! The refresh and the replays run as spawned tasks, so a caller that stops
//! waiting does not cancel work the backend may already be acting on.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::refresher::{RefreshError, TokenRefresher};
use super::session::{ExpiryReason, SessionFailureHandler};
use super::store::CredentialStore;
use crate::client::{ApiError, ApiResponse, Exchange, Flow, ResponseLayer};
use crate::security::{Sanitizer, SecretToken};

/// What a failed refresh means for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
    /// Any refresh failure ends the session
    #[default]
    Terminal,
    /// Only a rejected refresh credential ends the session; network and
    /// server failures fail the queued requests and keep the credentials
    Retain,
}

impl RefreshFailurePolicy {
    pub fn is_terminal(self, error: &RefreshError) -> bool {
        match self {
            RefreshFailurePolicy::Terminal => true,
            RefreshFailurePolicy::Retain => error.is_rejection(),
        }
    }
}

/// A request that failed once with 401 and may be replayed once
pub struct PendingRequest {
    pub origin_id: u64,
    /// Access token the failed attempt carried
    pub sent_with: SecretToken,
    /// Deferred re-send; runs with whatever credential is current when polled
    pub replay: BoxFuture<'static, Result<ApiResponse, ApiError>>,
}

impl PendingRequest {
    pub fn new(
        origin_id: u64,
        sent_with: SecretToken,
        replay: BoxFuture<'static, Result<ApiResponse, ApiError>>,
    ) -> Self {
        Self {
            origin_id,
            sent_with,
            replay,
        }
    }
}

struct Queued {
    pending: PendingRequest,
    responder: oneshot::Sender<Result<ApiResponse, ApiError>>,
}

enum RefreshState {
    Idle,
    Refreshing { queue: VecDeque<Queued> },
}

enum Admission {
    /// This request started the refresh
    Lead(SecretToken),
    /// A refresh was already running
    Joined,
    /// The credential rotated after this request was sent
    ReplayNow(Queued),
    /// Nothing left to refresh with
    NoSession(Queued),
}

/// Point-in-time counters, mostly for diagnostics and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshStats {
    pub refresh_calls: u64,
    pub refresh_failures: u64,
    pub replays: u64,
}

/// Owns the refresh state and the queue of pending requests
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    session: Arc<SessionFailureHandler>,
    policy: RefreshFailurePolicy,
    state: Mutex<RefreshState>,
    refresh_calls: AtomicU64,
    refresh_failures: AtomicU64,
    replays: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        session: Arc<SessionFailureHandler>,
        policy: RefreshFailurePolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            refresher,
            session,
            policy,
            state: Mutex::new(RefreshState::Idle),
            refresh_calls: AtomicU64::new(0),
            refresh_failures: AtomicU64::new(0),
            replays: AtomicU64::new(0),
        })
    }

    pub fn session(&self) -> &Arc<SessionFailureHandler> {
        &self.session
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Number of requests waiting on the in-flight refresh
    pub fn queued(&self) -> usize {
        match &*self.lock_state() {
            RefreshState::Refreshing { queue } => queue.len(),
            RefreshState::Idle => 0,
        }
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            refresh_calls: self.refresh_calls.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
        }
    }

    /// Hands a 401'd request to the coordinator and waits for its final outcome
    pub async fn submit(self: &Arc<Self>, pending: PendingRequest) -> Result<ApiResponse, ApiError> {
        let origin_id = pending.origin_id;
        let (responder, answer) = oneshot::channel();
        let queued = Queued { pending, responder };

        match self.admit(queued) {
            Admission::Lead(refresh_token) => {
                tracing::info!(origin_id, "Access credential rejected; refreshing");
                tokio::spawn(self.clone().run_refresh(refresh_token));
            }
            Admission::Joined => {
                tracing::debug!(origin_id, "Refresh in flight; request queued");
            }
            Admission::ReplayNow(queued) => {
                tracing::debug!(origin_id, "Credential already rotated; replaying");
                self.spawn_replay(queued);
            }
            Admission::NoSession(queued) => {
                tracing::warn!(origin_id, "No credentials left to refresh with");
                self.session.on_session_expired(ExpiryReason::NoSession);
                let _ = queued
                    .responder
                    .send(Err(ApiError::SessionExpired(ExpiryReason::NoSession)));
            }
        }

        answer.await.unwrap_or_else(|_| {
            Err(ApiError::Internal(
                "Refresh ended without answering a queued request".into(),
            ))
        })
    }

    fn admit(&self, queued: Queued) -> Admission {
        let mut state = self.lock_state();

        let Some(current) = self.store.get() else {
            return Admission::NoSession(queued);
        };

        if let RefreshState::Refreshing { queue } = &mut *state {
            queue.push_back(queued);
            return Admission::Joined;
        }

        if current.access_token != queued.pending.sent_with {
            return Admission::ReplayNow(queued);
        }

        *state = RefreshState::Refreshing {
            queue: VecDeque::from([queued]),
        };
        Admission::Lead(current.refresh_token)
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: SecretToken) {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            refresh_token = %Sanitizer::sanitize_token(refresh_token.expose()),
            "Calling refresh endpoint"
        );

        let outcome = AssertUnwindSafe(self.refresher.refresh(&refresh_token))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(RefreshError::Internal("refresher panicked".into())));

        match outcome {
            Ok(pair) => {
                // Store first: anything admitted from here on sees the new token
                if let Err(e) = self.store.set(pair) {
                    tracing::warn!("Refreshed credentials could not be persisted: {}", e);
                }
                let queue = self.finish();
                tracing::info!(queued = queue.len(), "Credentials refreshed; replaying queued requests");
                self.spawn_replays(queue);
            }
            Err(error) => {
                self.refresh_failures.fetch_add(1, Ordering::Relaxed);
                let terminal = self.policy.is_terminal(&error);
                let reason = match &error {
                    RefreshError::Rejected { status } => ExpiryReason::RefreshRejected { status: *status },
                    other => ExpiryReason::RefreshFailed(other.to_string()),
                };

                if terminal {
                    self.session.on_session_expired(reason.clone());
                }
                let queue = self.finish();
                tracing::warn!(queued = queue.len(), terminal, "Credential refresh failed: {}", error);

                for queued in queue {
                    let outcome = if terminal {
                        ApiError::SessionExpired(reason.clone())
                    } else {
                        ApiError::RefreshUnavailable(error.to_string())
                    };
                    if queued.responder.send(Err(outcome)).is_err() {
                        tracing::debug!(origin_id = queued.pending.origin_id, "Caller no longer waiting");
                    }
                }
            }
        }
    }

    /// Returns to `Idle`, handing back everything queued during the refresh
    fn finish(&self) -> VecDeque<Queued> {
        match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { queue } => queue,
            RefreshState::Idle => VecDeque::new(),
        }
    }

    /// Replays a drained queue one request at a time, in arrival order
    ///
    /// A single detached task owns the whole queue, so the order in which
    /// replays reach the transport does not depend on the scheduler.
    fn spawn_replays(&self, queue: VecDeque<Queued>) {
        self.replays.fetch_add(queue.len() as u64, Ordering::Relaxed);

        tokio::spawn(async move {
            for Queued { pending, responder } in queue {
                let origin_id = pending.origin_id;
                let outcome = AssertUnwindSafe(pending.replay)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(ApiError::Internal("replay panicked".into())));
                if responder.send(outcome).is_err() {
                    tracing::debug!(origin_id, "Caller abandoned request; replay result discarded");
                }
            }
        });
    }

    fn spawn_replay(&self, queued: Queued) {
        self.replays.fetch_add(1, Ordering::Relaxed);
        let Queued { pending, responder } = queued;
        let origin_id = pending.origin_id;

        tokio::spawn(async move {
            let outcome = pending.replay.await;
            if responder.send(outcome).is_err() {
                tracing::debug!(origin_id, "Caller abandoned request; replay result discarded");
            }
        });
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Response layer routing recoverable 401s through the coordinator
pub struct RefreshOnUnauthorized {
    coordinator: Arc<RefreshCoordinator>,
}

impl RefreshOnUnauthorized {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl ResponseLayer for RefreshOnUnauthorized {
    fn name(&self) -> &'static str {
        "refresh-on-unauthorized"
    }

    async fn on_response(&self, exchange: Exchange<'_>, response: ApiResponse) -> Flow {
        if !response.is_unauthorized() {
            return Flow::Continue(response);
        }

        // Sent without a credential: nothing to refresh, the caller sees the 401
        let Some(sent_with) = exchange.sent_credential else {
            return Flow::Continue(response);
        };

        if exchange.attempt.is_replay() {
            tracing::warn!(origin_id = exchange.origin_id, "Request rejected again after refresh");
            self.coordinator
                .session()
                .on_session_expired(ExpiryReason::ReplayRejected);
            return Flow::Settled(Err(ApiError::SessionExpired(ExpiryReason::ReplayRejected)));
        }

        let replay = exchange.dispatcher.replay(
            exchange.spec.clone(),
            exchange.origin_id,
            exchange.attempt.next(),
        );
        let pending = PendingRequest::new(exchange.origin_id, sent_with.clone(), replay);
        Flow::Settled(self.coordinator.submit(pending).await)
    }
}
