//! Controllable collaborators for reconciler tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use super::profile::{ProfileFetcher, ProfileResponse};
use super::provider::{AuthProvider, InMemoryAuthProvider, ProviderError, Subscription};
use super::types::{Session, UserProfile};

/// A token long enough to pass the default minimum length.
pub(crate) const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.token-one";
pub(crate) const TOKEN_2: &str = "eyJhbGciOiJIUzI1NiJ9.token-two";

pub(crate) fn session(id: &str, token: &str) -> Session {
    Session::new(id, format!("{id}@example.com"), token)
}

/// Profile as the backend would return it (distinct from the fallback).
pub(crate) fn full_profile(id: &str) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        name: format!("Full Name {id}"),
        role: "admin".into(),
        status: "active".into(),
    }
}

/// Let spawned tasks run until they park.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

enum Reply {
    Response(ProfileResponse),
    Error(String),
}

/// Profile fetcher with a scripted reply and an optional gate that holds
/// every call until the test releases it.
pub(crate) struct FakeFetcher {
    reply: Mutex<Reply>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeFetcher {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            gate: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn returning(profile: UserProfile) -> Self {
        Self::with_reply(Reply::Response(ProfileResponse::ok(profile)))
    }

    /// `{ success: false }`
    pub(crate) fn refusing() -> Self {
        Self::with_reply(Reply::Response(ProfileResponse::failed("Unauthorized")))
    }

    /// Transport failure.
    pub(crate) fn failing(message: &str) -> Self {
        Self::with_reply(Reply::Error(message.to_string()))
    }

    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub(crate) fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub(crate) fn respond_with(&self, profile: UserProfile) {
        *self.reply.lock() = Reply::Response(ProfileResponse::ok(profile));
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileFetcher for FakeFetcher {
    async fn fetch_profile(&self, _bearer_token: &str) -> anyhow::Result<ProfileResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        match &*self.reply.lock() {
            Reply::Response(resp) => Ok(resp.clone()),
            Reply::Error(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

/// Provider whose session query blocks until released.
pub(crate) struct GatedProvider {
    inner: InMemoryAuthProvider,
    gate: Semaphore,
    queries: AtomicUsize,
}

impl GatedProvider {
    pub(crate) fn new(session: Option<Session>) -> Self {
        let inner = match session {
            Some(s) => InMemoryAuthProvider::with_session(s),
            None => InMemoryAuthProvider::new(),
        };
        Self {
            inner,
            gate: Semaphore::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn release(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for GatedProvider {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|_| ProviderError::Aborted)?
            .forget();
        self.inner.current_session().await
    }

    fn on_session_change(&self) -> Subscription {
        self.inner.on_session_change()
    }
}
