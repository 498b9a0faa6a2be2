//! One-time backend initialization.
//!
//! Safe to call from many places at startup: the first caller starts the
//! attempt, concurrent callers wait on the same attempt, and a success is
//! remembered. A failed attempt is forgotten so the next call retries.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reply from the backend init endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Backend side of initialization (schema, seed data).
#[async_trait]
pub trait InitBackend: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<InitResponse>;
}

type Attempt = Shared<BoxFuture<'static, bool>>;

pub struct AppInitializer {
    backend: Arc<dyn InitBackend>,
    initialized: Arc<AtomicBool>,
    pending: Mutex<Option<Attempt>>,
}

impl AppInitializer {
    pub fn new(backend: Arc<dyn InitBackend>) -> Self {
        Self {
            backend,
            initialized: Arc::new(AtomicBool::new(false)),
            pending: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Forget a previous success and any attempt in progress.
    pub fn reset(&self) {
        self.initialized.store(false, Ordering::Release);
        *self.pending.lock() = None;
    }

    /// Run backend initialization once. Never fails; errors are logged
    /// and reported as `false`.
    pub async fn initialize(&self) -> bool {
        if self.is_initialized() {
            tracing::debug!("App already initialized");
            return true;
        }

        let attempt = {
            let mut pending = self.pending.lock();
            if let Some(attempt) = pending.clone() {
                tracing::info!("Initialization already in progress, waiting");
                attempt
            } else {
                tracing::info!("Starting app initialization");
                let attempt = run_attempt(Arc::clone(&self.backend), Arc::clone(&self.initialized))
                    .boxed()
                    .shared();
                *pending = Some(attempt.clone());
                attempt
            }
        };

        let ok = attempt.clone().await;

        let mut pending = self.pending.lock();
        if pending.as_ref().is_some_and(|p| p.ptr_eq(&attempt)) {
            *pending = None;
        }
        ok
    }
}

async fn run_attempt(backend: Arc<dyn InitBackend>, initialized: Arc<AtomicBool>) -> bool {
    match backend.initialize().await {
        Ok(resp) if resp.success => {
            tracing::info!("App initialization complete");
            initialized.store(true, Ordering::Release);
            true
        }
        Ok(resp) => {
            tracing::error!(
                error = resp.error.as_deref().unwrap_or("unknown"),
                "Initialization failed"
            );
            false
        }
        Err(e) => {
            tracing::error!("Initialization error: {e:#}");
            false
        }
    }
}
