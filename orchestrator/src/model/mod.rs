//! Model Lifecycle Manager
//!
//! Owns the GPU-resident vision model. A [`ModelHandle`] is a generation
//! token: every successful allocation bumps the generation, so a handle taken
//! before a recovery is recognisably stale afterwards. All inference runs
//! inside [`ModelLifecycleManager::with_exclusive_access`], which holds a
//! single async gate for the duration of the call. Recovery holds the same
//! gate across unload, backoff and reload so no inference can slip in between.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RecoveryPolicy;
use crate::error::ModelError;
use crate::traits::VisionBackend;

/// Ownership token for the loaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle {
    generation: u64,
}

impl ModelHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<u64>,
    last_generation: u64,
}

impl Slot {
    fn install(&mut self) -> ModelHandle {
        self.last_generation += 1;
        self.current = Some(self.last_generation);
        ModelHandle {
            generation: self.last_generation,
        }
    }
}

pub struct ModelLifecycleManager<B: VisionBackend> {
    backend: Arc<B>,
    gate: Mutex<Slot>,
    recovery: RecoveryPolicy,
    gate_wait_warning: Duration,
    recoveries: AtomicU64,
}

impl<B: VisionBackend> ModelLifecycleManager<B> {
    pub fn new(backend: Arc<B>, recovery: RecoveryPolicy, gate_wait_warning: Duration) -> Self {
        Self {
            backend,
            gate: Mutex::new(Slot::default()),
            recovery,
            gate_wait_warning,
            recoveries: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Completed unload/backoff/reload cycles since construction
    pub fn recovery_count(&self) -> u64 {
        self.recoveries.load(Ordering::SeqCst)
    }

    pub async fn current_handle(&self) -> Option<ModelHandle> {
        let slot = self.acquire("inspect").await;
        slot.current.map(|generation| ModelHandle { generation })
    }

    /// Allocate the model, or return the handle of the already-loaded one
    pub async fn load(&self) -> Result<ModelHandle, ModelError> {
        let mut slot = self.acquire("load").await;
        if let Some(generation) = slot.current {
            debug!(component = "model", generation, "Model already loaded");
            return Ok(ModelHandle { generation });
        }

        self.backend.allocate().await?;
        let handle = slot.install();
        info!(
            component = "model",
            generation = handle.generation,
            "✅ Vision model loaded"
        );
        Ok(handle)
    }

    /// Release GPU memory. Unloading a stale or already released handle is a no-op.
    pub async fn unload(&self, handle: &ModelHandle) -> Result<(), ModelError> {
        let mut slot = self.acquire("unload").await;
        if slot.current != Some(handle.generation) {
            debug!(
                component = "model",
                generation = handle.generation,
                "Handle already released"
            );
            return Ok(());
        }

        self.backend.release().await?;
        slot.current = None;
        info!(
            component = "model",
            generation = handle.generation,
            "🧹 Vision model unloaded"
        );
        Ok(())
    }

    /// Run `f` against the model while holding the exclusive gate.
    ///
    /// Fails without running `f` when `handle` is not the current one.
    pub async fn with_exclusive_access<F, Fut, T>(
        &self,
        handle: &ModelHandle,
        f: F,
    ) -> Result<T, ModelError>
    where
        F: FnOnce(Arc<B>) -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = self.acquire("inference").await;
        match slot.current {
            None => return Err(ModelError::NotLoaded),
            Some(current) if current != handle.generation => {
                return Err(ModelError::StaleHandle {
                    held: handle.generation,
                    current: Some(current),
                })
            }
            Some(_) => {}
        }

        let output = f(Arc::clone(&self.backend)).await;
        drop(slot);
        Ok(output)
    }

    /// Bounded recovery: unload, wait the backoff window, reload.
    ///
    /// If another caller already recovered since `handle` was issued, the
    /// current handle is returned without another cycle.
    pub async fn recover(&self, handle: &ModelHandle) -> Result<ModelHandle, ModelError> {
        let mut slot = self.acquire("recovery").await;
        if let Some(current) = slot.current {
            if current != handle.generation {
                info!(
                    component = "model",
                    held = handle.generation,
                    current,
                    "Model already recovered by another caller"
                );
                return Ok(ModelHandle { generation: current });
            }
        }

        let max_attempts = self.recovery.max_attempts.max(1);
        let mut last_failure = String::from("no reload attempted");
        for attempt in 1..=max_attempts {
            warn!(
                component = "model",
                attempt,
                max_attempts,
                backoff_ms = self.recovery.backoff.as_millis() as u64,
                "♻️ Recovering vision model: unload, backoff, reload"
            );

            if slot.current.is_some() {
                if let Err(e) = self.backend.release().await {
                    warn!(component = "model", error = %e, "Release during recovery failed");
                }
                slot.current = None;
            }

            tokio::time::sleep(self.recovery.backoff).await;

            match self.backend.allocate().await {
                Ok(()) => {
                    let fresh = slot.install();
                    self.recoveries.fetch_add(1, Ordering::SeqCst);
                    info!(
                        component = "model",
                        generation = fresh.generation,
                        attempt,
                        "✅ Vision model recovered"
                    );
                    return Ok(fresh);
                }
                Err(e) => {
                    error!(component = "model", attempt, error = %e, "Reload failed");
                    last_failure = e.to_string();
                }
            }
        }

        Err(ModelError::RecoveryFailed {
            attempts: max_attempts,
            reason: last_failure,
        })
    }

    async fn acquire(&self, purpose: &'static str) -> MutexGuard<'_, Slot> {
        let started = Instant::now();
        let lock = self.gate.lock();
        tokio::pin!(lock);

        let guard = tokio::select! {
            biased;
            guard = &mut lock => guard,
            _ = tokio::time::sleep(self.gate_wait_warning) => {
                warn!(
                    component = "model",
                    purpose,
                    threshold_ms = self.gate_wait_warning.as_millis() as u64,
                    "⏳ Still waiting for the exclusive model gate"
                );
                lock.await
            }
        };

        debug!(
            component = "model",
            purpose,
            waited_ms = started.elapsed().as_millis() as u64,
            "Exclusive model gate acquired"
        );
        guard
    }
}
