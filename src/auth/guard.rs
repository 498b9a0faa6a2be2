//! Admission bookkeeping for profile fetches.
//!
//! Guards run in a fixed order and the first one that fires wins:
//! 1. exclusivity (another fetch in flight)
//! 2. identity cache (store already holds this user)
//! 3. debounce (last attempt started less than the window ago)

use std::time::Duration;
use tokio::time::Instant;

use super::types::StoreSnapshot;

/// Why a fetch was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    Debounced,
}

/// Outcome of asking the guard for permission to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Go ahead; the guard is now marked in flight.
    Proceed,
    /// The store already holds this user. No network call.
    Cached,
    Skip(SkipReason),
}

/// Per-reconciler fetch state.
#[derive(Debug, Default)]
pub struct FetchGuard {
    in_flight: bool,
    last_attempt: Option<Instant>,
}

impl FetchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Evaluate the guards for `user_id` against `snapshot` at `now`.
    /// On [`Admission::Proceed`] the attempt is recorded.
    pub fn admit(
        &mut self,
        now: Instant,
        snapshot: &StoreSnapshot,
        user_id: &str,
        debounce: Duration,
    ) -> Admission {
        if self.in_flight {
            return Admission::Skip(SkipReason::InFlight);
        }

        if snapshot.holds_user(user_id) {
            return Admission::Cached;
        }

        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < debounce {
                return Admission::Skip(SkipReason::Debounced);
            }
        }

        self.in_flight = true;
        self.last_attempt = Some(now);
        Admission::Proceed
    }

    /// Mark the running fetch as done.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }
}
