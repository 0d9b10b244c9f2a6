//! Session failure handling
//!
//! Terminal failures end the session: the credential store is cleared and the
//! host application is told, once, to send the user back to the login page.
//! Repeated reports within the same episode are ignored until a new session
//! begins.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::store::{CredentialStore, StoreError};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The refresh endpoint rejected the refresh credential
    RefreshRejected { status: u16 },
    /// The refresh call could not complete (network or server failure)
    RefreshFailed(String),
    /// A request was rejected again after a successful refresh
    ReplayRejected,
    /// No credential pair was available to refresh with
    NoSession,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryReason::RefreshRejected { status } => {
                write!(f, "refresh credential rejected (HTTP {})", status)
            }
            ExpiryReason::RefreshFailed(msg) => write!(f, "refresh failed: {}", msg),
            ExpiryReason::ReplayRejected => write!(f, "request rejected after refresh"),
            ExpiryReason::NoSession => write!(f, "no session credentials available"),
        }
    }
}

/// Signal sent to the host application when the session ends
#[derive(Debug, Clone, PartialEq)]
pub struct SessionExpired {
    pub reason: ExpiryReason,
    /// Where the application should navigate to re-authenticate
    pub redirect_to: String,
    pub at: DateTime<Utc>,
}

/// Session state as observed through [`SessionFailureHandler::subscribe`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Credentials are present
    Active,
    /// The session ended on its own; re-authentication is required
    Expired(SessionExpired),
    /// The user signed out, or no session was ever established
    SignedOut,
}

/// Callback invoked when the session expires
pub type ExpiryCallback = Box<dyn Fn(&SessionExpired) + Send + Sync>;

/// Clears credentials and signals re-authentication, once per episode
pub struct SessionFailureHandler {
    store: Arc<CredentialStore>,
    login_path: String,
    closed: AtomicBool,
    signals: AtomicU64,
    listeners: RwLock<Vec<ExpiryCallback>>,
    events: watch::Sender<SessionEvent>,
}

impl SessionFailureHandler {
    pub fn new(store: Arc<CredentialStore>, login_path: impl Into<String>) -> Self {
        let present = store.is_present();
        let initial = if present {
            SessionEvent::Active
        } else {
            SessionEvent::SignedOut
        };
        let (events, _) = watch::channel(initial);

        Self {
            store,
            login_path: login_path.into(),
            closed: AtomicBool::new(!present),
            signals: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Ends the session
    ///
    /// Returns `true` if this call performed the teardown, `false` if the
    /// episode had already been closed.
    pub fn on_session_expired(&self, reason: ExpiryReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(%reason, "Session already closed; ignoring expiry");
            return false;
        }

        tracing::warn!(%reason, "Session expired; clearing credentials");
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear persisted credentials: {}", e);
        }

        let signal = SessionExpired {
            reason,
            redirect_to: self.login_path.clone(),
            at: Utc::now(),
        };
        self.signals.fetch_add(1, Ordering::Relaxed);
        self.events.send_replace(SessionEvent::Expired(signal.clone()));

        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(&signal);
        }

        true
    }

    /// Opens a new episode after the store received a fresh pair
    pub fn begin_session(&self) {
        self.closed.store(false, Ordering::Release);
        self.events.send_replace(SessionEvent::Active);
        tracing::info!("Session started");
    }

    /// Closes the episode without a redirect signal and clears credentials
    pub fn sign_out(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        self.events.send_replace(SessionEvent::SignedOut);
        tracing::info!("Signed out");
        self.store.clear()
    }

    /// Registers a callback for expiry signals
    pub fn on_expired<F>(&self, callback: F)
    where
        F: Fn(&SessionExpired) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Watches the session state
    pub fn subscribe(&self) -> watch::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Number of expiry signals emitted over the handler's lifetime
    pub fn signals_emitted(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialPair;
    use std::sync::atomic::AtomicU32;

    fn active_handler() -> (Arc<CredentialStore>, SessionFailureHandler) {
        let store = Arc::new(CredentialStore::in_memory());
        store.set(CredentialPair::new("a1", "r1")).unwrap();
        let handler = SessionFailureHandler::new(store.clone(), "/login");
        (store, handler)
    }

    #[test]
    fn test_initial_state_follows_store() {
        let (_, handler) = active_handler();
        assert_eq!(*handler.subscribe().borrow(), SessionEvent::Active);

        let empty = SessionFailureHandler::new(Arc::new(CredentialStore::in_memory()), "/login");
        assert_eq!(*empty.subscribe().borrow(), SessionEvent::SignedOut);
    }

    #[test]
    fn test_expiry_clears_store_and_signals() {
        let (store, handler) = active_handler();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        handler.on_expired(move |signal| {
            assert_eq!(signal.redirect_to, "/login");
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handler.on_session_expired(ExpiryReason::RefreshRejected { status: 401 }));

        assert!(store.get().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.signals_emitted(), 1);
        match &*handler.subscribe().borrow() {
            SessionEvent::Expired(signal) => {
                assert_eq!(signal.reason, ExpiryReason::RefreshRejected { status: 401 })
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_expiry_is_idempotent_within_episode() {
        let (_, handler) = active_handler();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        handler.on_expired(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handler.on_session_expired(ExpiryReason::ReplayRejected));
        assert!(!handler.on_session_expired(ExpiryReason::ReplayRejected));
        assert!(!handler.on_session_expired(ExpiryReason::NoSession));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.signals_emitted(), 1);
    }

    #[test]
    fn test_concurrent_expiry_signals_once() {
        let (_, handler) = active_handler();
        let handler = Arc::new(handler);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handler = handler.clone();
                std::thread::spawn(move || handler.on_session_expired(ExpiryReason::ReplayRejected))
            })
            .collect();
        let winners = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(handler.signals_emitted(), 1);
    }

    #[test]
    fn test_new_session_reopens_episode() {
        let (store, handler) = active_handler();
        handler.on_session_expired(ExpiryReason::ReplayRejected);

        store.set(CredentialPair::new("a2", "r2")).unwrap();
        handler.begin_session();
        assert_eq!(*handler.subscribe().borrow(), SessionEvent::Active);

        assert!(handler.on_session_expired(ExpiryReason::ReplayRejected));
        assert_eq!(handler.signals_emitted(), 2);
    }

    #[test]
    fn test_sign_out_suppresses_signal() {
        let (store, handler) = active_handler();
        handler.sign_out().unwrap();

        assert!(store.get().is_none());
        assert!(!handler.on_session_expired(ExpiryReason::NoSession));
        assert_eq!(handler.signals_emitted(), 0);
        assert_eq!(*handler.subscribe().borrow(), SessionEvent::SignedOut);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            ExpiryReason::RefreshRejected { status: 403 }.to_string(),
            "refresh credential rejected (HTTP 403)"
        );
        assert!(ExpiryReason::RefreshFailed("timeout".into())
            .to_string()
            .contains("timeout"));
    }
}
