//! Bounded signing queue with a fixed worker pool.
//!
//! Writes enqueue the id of a durable entry and return immediately. Each
//! worker re-fetches the entry from storage, signs exactly what is
//! committed and writes the signature back. Jobs are independent; there is
//! no ordering between entries.
//!
//! Shutdown contract:
//! - cancellation of the shared token: each worker finishes the job in hand
//!   and exits; queued ids are abandoned and their entries stay unsigned.
//! - [`SigningQueue::shutdown`] with [`ShutdownMode::Drain`]: the queue is
//!   closed and workers sign everything already queued before exiting.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use cyper_core::Clock;
use cyper_metrics::{SharedMetricsRegistry, SignOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::canonical::SignableRecord;
use crate::entry::AuditEntryId;
use crate::error::{AuditError, AuditResult};
use crate::signer::AuditSigner;
use crate::storage::AuditStore;

/// What happens to queued signing jobs at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Sign everything already queued, then stop.
    #[default]
    Drain,
    /// Finish in-flight jobs only; queued entries stay unsigned.
    Abandon,
}

/// Sizing for the signing pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningOptions {
    /// Number of worker tasks.
    pub workers: usize,
    /// Queue slots. A full queue leaves new entries unsigned.
    pub queue_capacity: usize,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Shared state every worker needs.
#[derive(Clone)]
struct SigningContext {
    store: Arc<dyn AuditStore>,
    signer: Arc<AuditSigner>,
    clock: Arc<dyn Clock>,
    metrics: Option<SharedMetricsRegistry>,
}

impl SigningContext {
    fn record(&self, outcome: SignOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.metrics().signature_recorded(outcome);
        }
    }
}

/// Sign one stored entry and persist the signature.
async fn sign_entry(ctx: &SigningContext, id: AuditEntryId) -> AuditResult<()> {
    let entry = ctx
        .store
        .get(id)
        .await?
        .ok_or(AuditError::EntryNotFound { id })?;
    let signature = ctx.signer.sign(&SignableRecord::project(&entry))?;
    ctx.store
        .set_signature(id, signature, ctx.signer.public_key(), ctx.clock.now())
        .await
}

async fn run_worker(
    worker: usize,
    ctx: SigningContext,
    rx: Arc<Mutex<mpsc::Receiver<AuditEntryId>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                id = rx.recv() => id,
            }
        };
        let Some(id) = next else {
            break;
        };

        match sign_entry(&ctx, id).await {
            Ok(()) => {
                ctx.record(SignOutcome::Signed);
                debug!(entry_id = %id, worker, "Audit entry signed");
            },
            Err(e) => {
                ctx.record(SignOutcome::Failed);
                error!(entry_id = %id, worker, error = %e, "Failed to sign audit entry");
            },
        }
    }
    debug!(worker, "Signing worker stopped");
}

/// Bounded queue of entries awaiting signatures.
pub struct SigningQueue {
    tx: StdMutex<Option<mpsc::Sender<AuditEntryId>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    metrics: Option<SharedMetricsRegistry>,
}

impl std::fmt::Debug for SigningQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningQueue")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SigningQueue {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    ///
    /// Workers stop when `cancel` (or a parent of it) is cancelled. With
    /// `metrics`, every attempt is counted by outcome, including entries
    /// that never reach a worker.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn AuditStore>,
        signer: Arc<AuditSigner>,
        clock: Arc<dyn Clock>,
        options: SigningOptions,
        metrics: Option<SharedMetricsRegistry>,
        cancel: &CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = cancel.child_token();
        let ctx = SigningContext {
            store,
            signer,
            clock,
            metrics: metrics.clone(),
        };

        let workers = (0..options.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    ctx.clone(),
                    Arc::clone(&rx),
                    cancel.clone(),
                ))
            })
            .collect();

        Self {
            tx: StdMutex::new(Some(tx)),
            workers: StdMutex::new(workers),
            cancel,
            metrics,
        }
    }

    /// Queue an entry for signing without waiting.
    ///
    /// Returns `false` when the entry was not queued (queue full or shut
    /// down); the entry then stays unsigned until a backfill pass.
    pub fn enqueue(&self, id: AuditEntryId) -> bool {
        let queued = self.try_enqueue(id);
        if !queued && let Some(metrics) = &self.metrics {
            metrics.metrics().signature_recorded(SignOutcome::Skipped);
        }
        queued
    }

    fn try_enqueue(&self, id: AuditEntryId) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            warn!(entry_id = %id, "Signing queue is shut down; entry left unsigned");
            return false;
        };
        match tx.try_send(id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(entry_id = %id, "Signing queue full; entry left unsigned");
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(entry_id = %id, "Signing workers stopped; entry left unsigned");
                false
            },
        }
    }

    /// Stop accepting jobs and wait for the workers.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if mode == ShutdownMode::Abandon {
            self.cancel.cancel();
        }

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Signing worker panicked");
            }
        }
    }
}
