//! Auth session reconciliation.
//!
//! - [`types`]: session, profile and store snapshot shapes
//! - [`events`]: provider change events
//! - [`provider`] / [`profile`] / [`store`]: the three collaborator seams
//! - [`guard`] / [`plan`]: pure fetch admission and event decisions
//! - [`reconciler`]: the task that ties them together

pub mod events;
pub mod guard;
pub mod plan;
pub mod profile;
pub mod provider;
pub mod reconciler;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{AuthChange, AuthEvent};
pub use plan::{FetchContext, Fallback, Intent};
pub use profile::{ProfileFetcher, ProfileResponse};
pub use provider::{AuthProvider, InMemoryAuthProvider, ProviderError, Subscription};
pub use reconciler::{Attachment, FetchOutcome, Reconciler};
pub use store::{MemorySessionStore, SessionStore};
pub use types::{Session, StatePatch, StoreSnapshot, UserProfile};
