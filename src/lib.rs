//! Client-side auth session reconciliation.
//!
//! Keeps a local session store consistent with two asynchronous sources of
//! identity: the hosted auth provider (sessions + change events) and the
//! application backend's "current user" profile endpoint.
//!
//! ```text
//! AuthProvider ──events──▸ Reconciler ──set_user / set_token / clear──▸ SessionStore
//!                              │
//!                              └──bearer token──▸ ProfileFetcher (GET /auth/me)
//! ```
//!
//! The core lives in [`auth`]; [`integrations::backend`] is the HTTP
//! profile fetcher and [`bootstrap`] runs the one-time backend init.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod integrations;
pub mod logging;

pub use auth::{
    AuthChange, AuthEvent, AuthProvider, FetchOutcome, MemorySessionStore, ProfileFetcher,
    Reconciler, Session, SessionStore, UserProfile,
};
pub use config::Config;
