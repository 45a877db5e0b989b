//! # Side-Effect Queue
//!
//! Audit records and operational events are persisted off the write path by
//! a single worker task reading a bounded `tokio::sync::mpsc` channel. The
//! worker handles items strictly in order and persists each one on its own;
//! a failure is logged and counted, and the next item proceeds.
//!
//! Delivery is best-effort and at most once. An item is dropped, with a
//! warning and a metric, when the channel is full or already shut down,
//! and items still queued when the process dies are lost. The business
//! write has already committed by the time its side effects are enqueued,
//! so none of this ever reaches the caller.

use parking_lot::Mutex;
use tally_core::EntityKind;
use tally_store::{SharedStore, Store, StoreResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::audit::AuditRecord;
use crate::events::OperationalEvent;
use crate::metrics;

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Audit(AuditRecord),
    Event(OperationalEvent),
}

impl SideEffect {
    fn kind(&self) -> &'static str {
        match self {
            Self::Audit(_) => "audit",
            Self::Event(_) => "event",
        }
    }

    async fn persist(&self, store: &dyn Store) -> StoreResult<()> {
        match self {
            Self::Audit(record) => {
                store.create(EntityKind::AuditLog, &record.to_payload()).await?;
            }
            Self::Event(event) => {
                event.persist(store).await?;
            }
        }
        Ok(())
    }
}

enum Message {
    Effect(SideEffect),
    Flush(oneshot::Sender<()>),
}

pub struct SideEffectQueue {
    sender: Mutex<Option<mpsc::Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SideEffectQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectQueue")
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

impl SideEffectQueue {
    /// Spawn the worker on the current Tokio runtime.
    pub fn start(store: SharedStore, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(store, rx));
        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a side effect without waiting. Returns `false` if it was dropped.
    pub fn enqueue(&self, effect: SideEffect) -> bool {
        let kind = effect.kind();
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::warn!(kind, "side-effect queue is shut down; dropping");
            metrics::record_dropped(kind);
            return false;
        };
        match tx.try_send(Message::Effect(effect)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(kind, capacity = tx.max_capacity(), "side-effect queue full; dropping");
                metrics::record_dropped(kind);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(kind, "side-effect worker has stopped; dropping");
                metrics::record_dropped(kind);
                false
            }
        }
    }

    /// Wait until everything enqueued before this call has been handled.
    pub async fn flush(&self) {
        let Some(tx) = self.sender.lock().clone() else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Message::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Close the channel, let the worker drain what is queued, and join it.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "side-effect worker panicked");
            }
        }
    }
}

async fn run_worker(store: SharedStore, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Effect(effect) => {
                if let Err(e) = effect.persist(store.as_ref()).await {
                    let kind = effect.kind();
                    match &effect {
                        SideEffect::Audit(r) => tracing::error!(
                            kind,
                            entity = %r.entity,
                            entity_id = %r.entity_id,
                            error = %e,
                            "failed to persist audit record"
                        ),
                        SideEffect::Event(ev) => tracing::error!(
                            kind,
                            event_type = %ev.event_type,
                            source_id = %ev.source_id,
                            error = %e,
                            "failed to persist operational event"
                        ),
                    }
                    metrics::record_persist_failure(kind);
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("side-effect worker stopped");
}
