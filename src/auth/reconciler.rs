//! Session reconciler: keeps the session store in step with the auth
//! provider and the profile endpoint.
//!
//! ## Lifecycle
//!
//! [`Reconciler::attach`] subscribes to provider events and spawns two
//! tasks sharing one [`CancellationToken`]:
//!
//! - **Mount restore**: query the current session once and load its profile.
//! - **Listener**: handle change events one at a time, in arrival order.
//!
//! Dropping or detaching the returned [`Attachment`] cancels the token and
//! the listener drops its subscription right away, even while a handler is
//! still waiting on the network. Pending provider and fetcher calls are left
//! to finish; every resumption point checks the token and discards the
//! result instead of writing.
//!
//! A sign-out bumps the reconciler's sign-out epoch. Work that started
//! before it (typically the mount restore, which runs outside the
//! listener) compares epochs before writing, so a signed-out user is never
//! brought back by a late reply.
//!
//! ## Guarded profile fetch
//!
//! At most one fetch is in flight per reconciler. A fetch is skipped when
//! the store already holds the same user (only the token is refreshed) or
//! when the previous attempt started within the debounce window. A failed
//! fetch never clears existing state.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::events::AuthChange;
use super::guard::{Admission, FetchGuard, SkipReason};
use super::plan::{
    plan_change, plan_restore, Fallback, FetchContext, IgnoreReason, Intent, RestorePlan,
};
use super::profile::ProfileFetcher;
use super::provider::{AuthProvider, ProviderError, Subscription};
use super::store::SessionStore;
use super::types::Session;
use crate::config::ReconcilerConfig;

/// Result of a guarded profile fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Profile written, or the store already held this user.
    Loaded,
    /// A guard fired; no network call was made.
    Skipped,
    /// The call failed or carried no usable profile. State left as is.
    Failed,
    /// The attachment was cancelled, or the user signed out while the call
    /// was pending; any result was discarded.
    Cancelled,
}

impl FetchOutcome {
    /// Whether a session-derived fallback profile may be considered.
    pub fn wants_fallback(self) -> bool {
        matches!(self, Self::Skipped | Self::Failed)
    }
}

/// Clears the in-flight flag when dropped, including on error or when
/// the owning future is dropped mid-call.
struct InFlightPermit<'a> {
    guard: &'a Mutex<FetchGuard>,
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.lock().finish();
    }
}

/// Reconciles auth provider state into a [`SessionStore`].
pub struct Reconciler {
    store: Arc<dyn SessionStore>,
    fetcher: Arc<dyn ProfileFetcher>,
    provider: Arc<dyn AuthProvider>,
    config: ReconcilerConfig,
    guard: Mutex<FetchGuard>,
    attached: AtomicBool,
    /// Incremented on every handled sign-out.
    sign_outs: AtomicU64,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        fetcher: Arc<dyn ProfileFetcher>,
        provider: Arc<dyn AuthProvider>,
        config: ReconcilerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            fetcher,
            provider,
            config,
            guard: Mutex::new(FetchGuard::new()),
            attached: AtomicBool::new(false),
            sign_outs: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.guard.lock().is_in_flight()
    }

    fn epoch(&self) -> u64 {
        self.sign_outs.load(Ordering::Acquire)
    }

    /// Whether a write planned at `epoch` must be dropped.
    fn is_stale(&self, cancel: &CancellationToken, epoch: u64) -> bool {
        cancel.is_cancelled() || self.epoch() != epoch
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Subscribe to the provider and start mount restore.
    ///
    /// Returns `None` when already attached. Must be called from within a
    /// tokio runtime.
    pub fn attach(self: &Arc<Self>) -> Option<Attachment> {
        if self
            .attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Auth listener already attached, skipping");
            return None;
        }

        tracing::info!("Initializing auth state listener");

        let cancel = CancellationToken::new();
        // Subscribe before spawning so events emitted right after attach
        // are not missed.
        let subscription = self.provider.on_session_change();

        let restore = {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { this.restore_session(&cancel).await })
        };

        let listener = {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move { this.listen(subscription, cancel).await })
        };

        tracing::info!("Auth listener active");

        Some(Attachment {
            reconciler: Arc::clone(self),
            cancel,
            tasks: vec![restore, listener],
            released: false,
        })
    }

    async fn listen(&self, mut subscription: Subscription, cancel: CancellationToken) {
        loop {
            let change = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                change = subscription.recv() => match change {
                    Some(change) => change,
                    None => {
                        tracing::debug!("Auth provider closed the change stream");
                        break;
                    }
                },
            };

            let handling = self.handle_change(change, &cancel);
            tokio::pin!(handling);
            let finished = tokio::select! {
                biased;
                () = &mut handling => true,
                () = cancel.cancelled() => false,
            };
            if !finished {
                subscription.unsubscribe();
                tracing::debug!("Auth listener stopped, finishing pending handler");
                // The handler checks the token before writing.
                handling.await;
                return;
            }
        }

        subscription.unsubscribe();
        tracing::debug!("Auth listener stopped");
    }

    // ── Mount restore ───────────────────────────────────────────

    /// Load the provider's current session into the store, once.
    pub async fn restore_session(&self, cancel: &CancellationToken) {
        let context = FetchContext::Mount;
        if cancel.is_cancelled() {
            tracing::debug!(%context, "Cancelled, skipping session restore");
            return;
        }

        let epoch = self.epoch();
        tracing::debug!(%context, "Checking for existing session");
        let result = self.provider.current_session().await;

        if self.is_stale(cancel, epoch) {
            tracing::debug!(%context, "Cancelled or signed out during session query");
            return;
        }

        let current = match result {
            Ok(current) => current,
            Err(ProviderError::Aborted) => return,
            Err(e) => {
                tracing::error!(%context, "Error getting session: {e}");
                return;
            }
        };

        let session = match plan_restore(current.as_ref(), self.config.min_token_len) {
            RestorePlan::NoSession => {
                tracing::info!(%context, "No active session");
                return;
            }
            RestorePlan::InvalidToken => {
                tracing::warn!(%context, "Invalid access token, skipping restore");
                return;
            }
            RestorePlan::Reconcile(session) => session,
        };

        tracing::info!(%context, user_id = session.user_id(), "Valid session found");

        let outcome = self
            .guarded_fetch(&session.access_token, session.user_id(), context, cancel, epoch)
            .await;
        self.apply_fallback(outcome, &session, Fallback::WhenEmpty, context, cancel, epoch);
    }

    // ── Event dispatch ──────────────────────────────────────────

    /// React to one provider event.
    pub async fn handle_change(&self, change: AuthChange, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        tracing::info!(event = %change.event, email = change.email(), "Auth event");

        match plan_change(&change, &self.store.state()) {
            Intent::Reconcile {
                session,
                context,
                fallback,
            } => {
                let epoch = self.epoch();
                let outcome = self
                    .guarded_fetch(&session.access_token, session.user_id(), context, cancel, epoch)
                    .await;
                self.apply_fallback(outcome, &session, fallback, context, cancel, epoch);
            }
            Intent::Clear => {
                tracing::info!("User signed out, clearing state");
                self.sign_outs.fetch_add(1, Ordering::AcqRel);
                self.store.clear();
            }
            Intent::SetToken(token) => {
                self.store.set_token(token);
                tracing::info!("Token updated");
            }
            Intent::Ignore(IgnoreReason::UnknownEvent(name)) => {
                tracing::info!(event = %name, "Unhandled auth event");
            }
            Intent::Ignore(reason) => {
                tracing::debug!(event = %change.event, ?reason, "Nothing to reconcile");
            }
        }
    }

    fn apply_fallback(
        &self,
        outcome: FetchOutcome,
        session: &Session,
        fallback: Fallback,
        context: FetchContext,
        cancel: &CancellationToken,
        epoch: u64,
    ) {
        if !outcome.wants_fallback() || self.is_stale(cancel, epoch) {
            return;
        }
        if fallback.applies(&self.store.state(), session) {
            tracing::info!(%context, user_id = session.user_id(), "Using basic user info from session");
            self.store
                .set_user(session.fallback_profile(), session.access_token.clone());
        }
    }

    // ── Guarded profile fetch ───────────────────────────────────

    /// Fetch the profile for `user_id` unless a guard says otherwise.
    pub async fn fetch_profile(
        &self,
        token: &str,
        user_id: &str,
        context: FetchContext,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        self.guarded_fetch(token, user_id, context, cancel, self.epoch())
            .await
    }

    /// [`Self::fetch_profile`] for work that started at sign-out `epoch`.
    async fn guarded_fetch(
        &self,
        token: &str,
        user_id: &str,
        context: FetchContext,
        cancel: &CancellationToken,
        epoch: u64,
    ) -> FetchOutcome {
        if self.is_stale(cancel, epoch) {
            return FetchOutcome::Cancelled;
        }

        let snapshot = self.store.state();
        let admission =
            self.guard
                .lock()
                .admit(Instant::now(), &snapshot, user_id, self.config.debounce());

        match admission {
            Admission::Skip(SkipReason::InFlight) => {
                tracing::debug!(%context, "Profile fetch already in progress, skipping");
                return FetchOutcome::Skipped;
            }
            Admission::Skip(SkipReason::Debounced) => {
                tracing::debug!(%context, "Profile fetched recently, skipping");
                return FetchOutcome::Skipped;
            }
            Admission::Cached => {
                tracing::debug!(%context, user_id, "User already in store, skipping profile fetch");
                if snapshot.access_token.as_deref() != Some(token) {
                    tracing::debug!(%context, "Updating token");
                    self.store.set_token(token.to_string());
                }
                return FetchOutcome::Loaded;
            }
            Admission::Proceed => {}
        }

        let permit = InFlightPermit { guard: &self.guard };
        tracing::debug!(%context, "Fetching user profile");
        let result = self.fetcher.fetch_profile(token).await;
        drop(permit);

        if cancel.is_cancelled() {
            tracing::debug!(%context, "Cancelled after profile fetch, discarding result");
            return FetchOutcome::Cancelled;
        }
        if self.epoch() != epoch {
            tracing::debug!(%context, "Signed out during profile fetch, discarding result");
            return FetchOutcome::Cancelled;
        }

        match result {
            Ok(resp) => {
                let error = resp.error.clone();
                match resp.into_profile() {
                    Some(profile) if profile.id == user_id => {
                        tracing::info!(%context, email = %profile.email, "User profile loaded");
                        self.store.set_user(profile, token.to_string());
                        FetchOutcome::Loaded
                    }
                    Some(profile) => {
                        tracing::warn!(
                            %context,
                            expected = user_id,
                            got = %profile.id,
                            "Profile does not belong to session user, ignoring"
                        );
                        FetchOutcome::Failed
                    }
                    None => {
                        tracing::warn!(
                            %context,
                            error = error.as_deref().unwrap_or("none"),
                            "Profile fetch returned no user data"
                        );
                        FetchOutcome::Failed
                    }
                }
            }
            Err(e) => {
                // Keep whatever identity the store has; never force a logout.
                tracing::error!(%context, "Failed to load user profile: {e:#}");
                FetchOutcome::Failed
            }
        }
    }
}

/// A live subscription of a [`Reconciler`]. Dropping it detaches.
pub struct Attachment {
    reconciler: Arc<Reconciler>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    released: bool,
}

impl Attachment {
    /// Token cancelled on detach; hand clones to related work.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel pending work and unsubscribe.
    pub fn detach(self) {
        drop(self);
    }

    /// Detach and wait for both tasks to wind down.
    pub async fn detach_and_wait(mut self) {
        self.release();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::warn!("Auth listener task panicked: {e}");
                }
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::info!("Unsubscribing and cancelling pending auth work");
        self.cancel.cancel();
        self.reconciler.attached.store(false, Ordering::Release);
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.release();
    }
}
