//! Auth provider interface.
//!
//! The provider owns the real session lifecycle. The reconciler only asks
//! for the current session and listens to its change stream.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::events::{AuthChange, AuthEvent};
use super::types::Session;

/// Buffered change events per subscriber.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Failure of a session query.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The query was aborted (page teardown, superseded request).
    #[error("session query aborted")]
    Aborted,
    #[error("auth provider error: {0}")]
    Backend(String),
}

/// A live change-event subscription. Dropping it also unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<AuthChange>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<AuthChange>) -> Self {
        Self { rx }
    }

    /// Next change, or `None` once the provider has gone away.
    ///
    /// If this subscriber fell behind, the missed events are logged and
    /// delivery resumes with the oldest retained one.
    pub async fn recv(&mut self) -> Option<AuthChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Auth change subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop delivery.
    pub fn unsubscribe(self) {}
}

/// Source of sessions and session-change events.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current session, if any. May suspend.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribe to session changes.
    fn on_session_change(&self) -> Subscription;
}

/// Provider driven directly by the embedding application.
///
/// Useful when sessions come from somewhere the app already controls
/// (a native login screen, a test harness). Each helper updates the
/// current session and emits the matching event.
pub struct InMemoryAuthProvider {
    session: Mutex<Option<Session>>,
    tx: broadcast::Sender<AuthChange>,
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            session: Mutex::new(None),
            tx,
        }
    }

    pub fn with_session(session: Session) -> Self {
        let provider = Self::new();
        *provider.session.lock() = Some(session);
        provider
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn sign_in(&self, session: Session) {
        *self.session.lock() = Some(session.clone());
        self.emit(AuthChange::signed_in(session));
    }

    pub fn sign_out(&self) {
        *self.session.lock() = None;
        self.emit(AuthChange::signed_out());
    }

    /// Swap the current session's token. No-op when signed out.
    pub fn refresh_token(&self, token: impl Into<String>) {
        let refreshed = {
            let mut guard = self.session.lock();
            match guard.as_mut() {
                Some(session) => {
                    session.access_token = token.into();
                    session.clone()
                }
                None => return,
            }
        };
        self.emit(AuthChange::token_refreshed(refreshed));
    }

    /// Replace the session user and emit `USER_UPDATED`.
    pub fn update_user(&self, session: Session) {
        *self.session.lock() = Some(session.clone());
        self.emit(AuthChange::user_updated(session));
    }

    /// Deliver an arbitrary change without touching the current session.
    pub fn emit(&self, change: AuthChange) {
        if let Err(e) = self.tx.send(change) {
            tracing::debug!(event = %e.0.event, "No auth change subscribers");
        }
    }

    /// Deliver an event by wire name.
    pub fn emit_raw(&self, event: &str, session: Option<Session>) {
        self.emit(AuthChange::new(AuthEvent::from_wire(event), session));
    }
}

impl Default for InMemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.session.lock().clone())
    }

    fn on_session_change(&self) -> Subscription {
        Subscription::new(self.tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str) -> Session {
        Session::new("u1", "ana@example.com", token)
    }

    #[tokio::test]
    async fn sign_in_sets_session_and_emits() {
        let provider = InMemoryAuthProvider::new();
        let mut sub = provider.on_session_change();

        provider.sign_in(session("token-aaaaaaaaaaaaaaaaaaaa"));

        let change = sub.recv().await.unwrap();
        assert_eq!(change.event, AuthEvent::SignedIn);
        let current = provider.current_session().await.unwrap().unwrap();
        assert_eq!(current.user_id(), "u1");
    }

    #[tokio::test]
    async fn refresh_token_updates_current_session() {
        let provider = InMemoryAuthProvider::with_session(session("old"));
        let mut sub = provider.on_session_change();

        provider.refresh_token("new");

        let change = sub.recv().await.unwrap();
        assert_eq!(change.event, AuthEvent::TokenRefreshed);
        assert_eq!(change.session.unwrap().access_token, "new");
    }

    #[tokio::test]
    async fn refresh_token_when_signed_out_is_silent() {
        let provider = InMemoryAuthProvider::new();
        let sub = provider.on_session_change();
        provider.refresh_token("new");
        assert!(sub.rx.is_empty());
    }

    #[tokio::test]
    async fn sign_out_clears_session() {
        let provider = InMemoryAuthProvider::with_session(session("tok"));
        provider.sign_out();
        assert!(provider.current_session().await.unwrap().is_none());
    }

    #[test]
    fn unsubscribe_drops_receiver() {
        let provider = InMemoryAuthProvider::new();
        let sub = provider.on_session_change();
        assert_eq!(provider.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(provider.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn closed_provider_ends_subscription() {
        let provider = InMemoryAuthProvider::new();
        let mut sub = provider.on_session_change();
        drop(provider);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn lagged_subscriber_resumes() {
        let provider = InMemoryAuthProvider::new();
        let mut sub = provider.on_session_change();
        for _ in 0..(CHANGE_CHANNEL_CAPACITY + 5) {
            provider.emit(AuthChange::signed_out());
        }
        provider.emit_raw("INITIAL_SESSION", None);

        let first = sub.recv().await.unwrap();
        assert_eq!(first.event, AuthEvent::SignedOut);
    }
}
