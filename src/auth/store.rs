//! Local session store.
//!
//! Holds `{user, access_token, is_authenticated}` for the UI. The
//! reconciler is the only writer; readers take snapshots or watch for
//! changes. `is_authenticated` is re-derived from `user` on every write.

use parking_lot::Mutex;
use tokio::sync::watch;

use super::types::{StatePatch, StoreSnapshot, UserProfile};

/// Store interface the reconciler writes through.
pub trait SessionStore: Send + Sync {
    /// Current snapshot.
    fn state(&self) -> StoreSnapshot;

    /// Apply a partial update.
    fn set_state(&self, patch: StatePatch);

    /// Replace the user and token together.
    fn set_user(&self, profile: UserProfile, token: String) {
        self.set_state(StatePatch::user(profile, token));
    }

    /// Replace only the token.
    fn set_token(&self, token: String) {
        self.set_state(StatePatch::token(token));
    }

    /// Reset to the signed-out snapshot.
    fn clear(&self) {
        self.set_state(StatePatch::clear());
    }
}

struct Inner {
    snapshot: StoreSnapshot,
    mutations: u64,
}

/// In-process store backed by a mutex, with a watch channel for readers.
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
    tx: watch::Sender<StoreSnapshot>,
}

impl MemorySessionStore {
    /// Create an empty (signed-out) store.
    pub fn new() -> Self {
        Self::with_snapshot(StoreSnapshot::signed_out())
    }

    /// Create a store pre-populated with `snapshot` (e.g. rehydrated state).
    pub fn with_snapshot(mut snapshot: StoreSnapshot) -> Self {
        snapshot.is_authenticated = snapshot.user.is_some();
        let (tx, _rx) = watch::channel(snapshot.clone());
        Self {
            inner: Mutex::new(Inner {
                snapshot,
                mutations: 0,
            }),
            tx,
        }
    }

    /// Number of writes applied since creation.
    pub fn mutation_count(&self) -> u64 {
        self.inner.lock().mutations
    }

    /// Receive a fresh snapshot after every write.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn state(&self) -> StoreSnapshot {
        self.inner.lock().snapshot.clone()
    }

    fn set_state(&self, patch: StatePatch) {
        let snapshot = {
            let mut inner = self.inner.lock();
            patch.apply(&mut inner.snapshot);
            inner.mutations += 1;
            inner.snapshot.clone()
        };
        self.tx.send_replace(snapshot);
    }
}
