//! Transfer queue: bounded-concurrency dispatch over the registry.
//!
//! The queue is the single writer of item state. Every mutation takes the
//! one internal lock, applies the transition, refills free concurrency slots
//! from the FIFO pending queue, and recomputes the derived stats before the
//! lock is released. Slot computation and promotion are one atomic step, so
//! concurrent completion callbacks can never push the active count past the
//! cap.
//!
//! Executor work runs on spawned tasks; the queue never waits on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::Result;

use super::executor::{ProgressSink, TransferExecutor, TransferRequest};
use super::registry::{CancelAction, QueueState};
use super::types::{
    QueueBatchOperation, QueueCounts, QueueEvent, QueueStats, TransferId, TransferItem,
    TransferRemoved, TransferSpec, TransferStatus, TransferStatusChanged,
};

/// Buffered UI notifications per subscriber; a slow observer misses old
/// events and re-reads the snapshot instead.
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Dispatched {
    request: TransferRequest,
    token: CancellationToken,
}

struct Shared {
    config: QueueConfig,
    executor: Arc<dyn TransferExecutor>,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    next_id: AtomicU64,
}

/// Handle to the transfer queue. Cheap to clone; all clones share state.
///
/// Must live inside a Tokio runtime: dispatch spawns one task per promoted
/// item.
#[derive(Clone)]
pub struct TransferQueue {
    shared: Arc<Shared>,
}

impl TransferQueue {
    pub fn new(config: QueueConfig, executor: Arc<dyn TransferExecutor>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                executor,
                state: Mutex::new(QueueState::new()),
                events,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Add items in pending state and fill any free slots. Enqueueing
    /// nothing is a no-op.
    pub fn enqueue(&self, specs: Vec<TransferSpec>) -> Vec<TransferId> {
        if specs.is_empty() {
            return Vec::new();
        }
        let now = Utc::now().timestamp();
        let mut ids = Vec::with_capacity(specs.len());
        let (dispatched, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            for spec in specs {
                let id = TransferId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
                debug!("enqueue transfer {} ({})", id, spec.direction);
                state.insert(id, spec, now);
                ids.push(id);
            }
            (self.fill_slots(&mut state, now), state.stats())
        };
        self.finish_mutation(dispatched, stats);
        ids
    }

    /// Convenience for single-item ingestion paths.
    pub fn enqueue_one(&self, spec: TransferSpec) -> TransferId {
        self.enqueue(vec![spec])[0]
    }

    /// Progress callback target, bound per item via [`ProgressSink`].
    /// Reports for non-active items are dropped by the registry.
    pub fn report_progress(&self, id: TransferId, transferred: u64, total: u64) {
        let progress = {
            let mut state = self.shared.state.lock().unwrap();
            state.apply_progress(id, transferred, total)
        };
        if let Some(progress) = progress {
            self.emit(QueueEvent::Progress(progress));
        }
    }

    /// Outcome callback target. Honored at most once per dispatch; the freed
    /// slot is refilled in the same step.
    pub fn report_outcome(&self, id: TransferId, result: Result<()>) {
        let now = Utc::now().timestamp();
        let (changed, dispatched, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            let changed = state.apply_outcome(id, result, now);
            (changed, self.fill_slots(&mut state, now), state.stats())
        };
        if let Some(changed) = changed {
            match changed.error.as_ref() {
                Some(err) => warn!("transfer {} -> {} error={}", id, changed.status, err),
                None => info!("transfer {} -> {}", id, changed.status),
            }
            self.emit(QueueEvent::StatusChanged(changed));
        }
        self.finish_mutation(dispatched, stats);
    }

    /// Cancel one item. Pending items flip immediately; active items flip
    /// immediately and the executor is signalled to abort; the registry
    /// does not wait for the abort to land. Idempotent.
    pub fn cancel(&self, id: TransferId) {
        let now = Utc::now().timestamp();
        let (action, dispatched, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            let action = state.cancel(id, now);
            (action, self.fill_slots(&mut state, now), state.stats())
        };
        let cancelled = match action {
            CancelAction::Noop => {
                debug!("cancel for transfer {} ignored", id);
                false
            }
            CancelAction::WasPending => true,
            CancelAction::WasActive(token) => {
                token.cancel();
                true
            }
        };
        if cancelled {
            info!("transfer {} -> cancelled", id);
            self.emit(QueueEvent::StatusChanged(TransferStatusChanged {
                id,
                status: TransferStatus::Cancelled,
                error: None,
            }));
        }
        self.finish_mutation(dispatched, stats);
    }

    /// Re-enqueue a failed or cancelled item at the back of the queue.
    /// Anything else is a logged no-op.
    pub fn retry(&self, id: TransferId) {
        let now = Utc::now().timestamp();
        let (retried, dispatched, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            let retried = state.retry(id);
            (retried, self.fill_slots(&mut state, now), state.stats())
        };
        if retried {
            info!("transfer {} -> pending (retry)", id);
            self.emit(QueueEvent::StatusChanged(TransferStatusChanged {
                id,
                status: TransferStatus::Pending,
                error: None,
            }));
        }
        self.finish_mutation(dispatched, stats);
    }

    /// Remove one item from the registry. An active item is cancelled first
    /// so the executor stops and no stale callback resurrects the id.
    pub fn remove(&self, id: TransferId) {
        let now = Utc::now().timestamp();
        let (removed, dispatched, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            let removed = state.remove(id);
            (removed, self.fill_slots(&mut state, now), state.stats())
        };
        match removed {
            None => debug!("remove for unknown transfer {} ignored", id),
            Some(token) => {
                if let Some(token) = token {
                    token.cancel();
                }
                info!("transfer {} removed", id);
                self.emit(QueueEvent::Removed(TransferRemoved { id }));
            }
        }
        self.finish_mutation(dispatched, stats);
    }

    /// Drop all completed items.
    pub fn clear_completed(&self) {
        let (removed, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            (state.clear_completed(), state.stats())
        };
        info!("cleared {} completed transfers", removed);
        self.emit(QueueEvent::Batch(QueueBatchOperation {
            operation: "clear_completed".to_string(),
            removed,
        }));
        self.emit(QueueEvent::Stats(stats));
    }

    /// Drop everything, cancelling in-flight work first.
    pub fn clear_all(&self) {
        let (removed, tokens, stats) = {
            let mut state = self.shared.state.lock().unwrap();
            let (removed, tokens) = state.clear_all();
            (removed, tokens, state.stats())
        };
        for token in tokens {
            token.cancel();
        }
        info!("cleared all {} transfers", removed);
        self.emit(QueueEvent::Batch(QueueBatchOperation {
            operation: "clear_all".to_string(),
            removed,
        }));
        self.emit(QueueEvent::Stats(stats));
    }

    /// Counts by status, consistent with the snapshot at all times.
    pub fn counts(&self) -> QueueCounts {
        self.shared.state.lock().unwrap().stats().counts
    }

    /// Overall byte progress across items with a known total, 0 when none.
    pub fn aggregate_progress(&self) -> u32 {
        self.shared.state.lock().unwrap().stats().aggregate_percent
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.state.lock().unwrap().stats()
    }

    /// Full item list in enqueue order, cloned for read-only observers.
    pub fn snapshot(&self) -> Vec<TransferItem> {
        self.shared.state.lock().unwrap().snapshot()
    }

    pub fn item(&self, id: TransferId) -> Option<TransferItem> {
        self.shared.state.lock().unwrap().get(id).cloned()
    }

    /// Subscribe to queue notifications for rendering a toast or queue
    /// panel. Observers re-read `snapshot`/`counts` on each event.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Promote pending items into free slots. Runs under the state lock so
    /// the free-slot computation and the promotions are one atomic step.
    fn fill_slots(&self, state: &mut QueueState, now: i64) -> Vec<Dispatched> {
        let mut dispatched = Vec::new();
        let mut free = self
            .shared
            .config
            .max_concurrent
            .saturating_sub(state.active_count());
        while free > 0 {
            let Some(id) = state.pop_next_pending() else {
                break;
            };
            let token = CancellationToken::new();
            if let Some(request) = state.mark_active(id, now, token.clone()) {
                dispatched.push(Dispatched { request, token });
                free -= 1;
            }
        }
        dispatched
    }

    /// Emit per-item activation events and stats, then hand the promoted
    /// items to the executor on their own tasks.
    fn finish_mutation(&self, dispatched: Vec<Dispatched>, stats: QueueStats) {
        for d in &dispatched {
            info!("transfer {} -> active", d.request.id);
            self.emit(QueueEvent::StatusChanged(TransferStatusChanged {
                id: d.request.id,
                status: TransferStatus::Active,
                error: None,
            }));
        }
        self.emit(QueueEvent::Stats(stats));
        for d in dispatched {
            let queue = self.clone();
            let executor = Arc::clone(&self.shared.executor);
            let id = d.request.id;
            let token = d.token;
            let request = d.request;
            tokio::spawn(async move {
                let sink = ProgressSink::new(queue.clone(), id);
                let result = executor.execute(request, sink, token).await;
                queue.report_outcome(id, result);
            });
        }
    }

    fn emit(&self, event: QueueEvent) {
        // Send only fails when nobody is subscribed.
        let _ = self.shared.events.send(event);
    }
}
