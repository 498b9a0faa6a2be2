//! Pure decision logic for auth changes.
//!
//! [`plan_change`] and [`plan_restore`] look only at their inputs and
//! return what should happen; the [`Reconciler`](super::Reconciler)
//! performs the network calls and store writes.

use super::events::{AuthChange, AuthEvent};
use super::types::{Session, StoreSnapshot};

/// Call site of a profile fetch, carried into log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchContext {
    Mount,
    SignIn,
    UserUpdate,
    /// A direct [`Reconciler::fetch_profile`](super::Reconciler::fetch_profile)
    /// call by the embedding application, e.g. after an explicit profile edit.
    Manual,
}

impl FetchContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mount => "Mount",
            Self::SignIn => "SignIn",
            Self::UserUpdate => "UserUpdate",
            Self::Manual => "Manual",
        }
    }
}

impl std::fmt::Display for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a skipped or failed fetch falls back to a session-derived profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Never,
    /// Only if the store holds no user at all.
    WhenEmpty,
    /// If the store holds no user or a different one.
    WhenDifferentUser,
}

impl Fallback {
    pub fn applies(self, snapshot: &StoreSnapshot, session: &Session) -> bool {
        match self {
            Self::Never => false,
            Self::WhenEmpty => snapshot.user.is_none(),
            Self::WhenDifferentUser => !snapshot.holds_user(session.user_id()),
        }
    }
}

/// What to do in response to one auth change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Run the guarded profile fetch, then apply `fallback`.
    Reconcile {
        session: Session,
        context: FetchContext,
        fallback: Fallback,
    },
    /// Reset the store to signed out.
    Clear,
    /// Replace only the stored token.
    SetToken(String),
    /// Nothing to write.
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingSession,
    TokenUnchanged,
    UnknownEvent(String),
}

/// Decide the reaction to `change` given the current store contents.
pub fn plan_change(change: &AuthChange, snapshot: &StoreSnapshot) -> Intent {
    match &change.event {
        AuthEvent::SignedIn => match &change.session {
            Some(session) => Intent::Reconcile {
                session: session.clone(),
                context: FetchContext::SignIn,
                fallback: Fallback::WhenDifferentUser,
            },
            None => Intent::Ignore(IgnoreReason::MissingSession),
        },
        AuthEvent::SignedOut => Intent::Clear,
        AuthEvent::TokenRefreshed => match &change.session {
            Some(session) if session.access_token.is_empty() => {
                Intent::Ignore(IgnoreReason::MissingSession)
            }
            Some(session) if snapshot.access_token.as_deref() == Some(session.access_token.as_str()) => {
                Intent::Ignore(IgnoreReason::TokenUnchanged)
            }
            Some(session) => Intent::SetToken(session.access_token.clone()),
            None => Intent::Ignore(IgnoreReason::MissingSession),
        },
        // Goes through the same cache-guarded path as sign-in, so with an
        // unchanged identity this only refreshes the token.
        AuthEvent::UserUpdated => match &change.session {
            Some(session) => Intent::Reconcile {
                session: session.clone(),
                context: FetchContext::UserUpdate,
                fallback: Fallback::Never,
            },
            None => Intent::Ignore(IgnoreReason::MissingSession),
        },
        AuthEvent::Other(name) => Intent::Ignore(IgnoreReason::UnknownEvent(name.clone())),
    }
}

/// Result of inspecting the session found at mount time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorePlan {
    NoSession,
    /// Token missing or shorter than the minimum; treated as no session.
    InvalidToken,
    Reconcile(Session),
}

pub fn plan_restore(session: Option<&Session>, min_token_len: usize) -> RestorePlan {
    match session {
        None => RestorePlan::NoSession,
        Some(s) if !s.has_usable_token(min_token_len) => RestorePlan::InvalidToken,
        Some(s) => RestorePlan::Reconcile(s.clone()),
    }
}
