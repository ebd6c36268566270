//! Authoritative collection of transfer items with derived aggregates.
//!
//! All methods here run under the queue's single lock; none of them block or
//! perform I/O. Every mutation ends by recomputing the cached stats, so the
//! item list and its aggregates always change as one unit.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use log::warn;
use tokio_util::sync::CancellationToken;

use super::executor::TransferRequest;
use super::types::{
    percent, QueueCounts, QueueStats, TransferId, TransferItem, TransferProgress, TransferSpec,
    TransferStatus, TransferStatusChanged,
};
use crate::error::TransferError;

/// Result of a cancel request, telling the scheduler what to do next.
pub(crate) enum CancelAction {
    /// Item left the pending queue; nothing was running.
    WasPending,
    /// Item was running; the scheduler fires this token to stop the executor.
    WasActive(CancellationToken),
    /// Already terminal or unknown id; cancel is idempotent.
    Noop,
}

pub(crate) struct QueueState {
    items: HashMap<TransferId, TransferItem>,
    /// Enqueue order, for stable snapshots.
    order: Vec<TransferId>,
    /// FIFO dispatch queue of pending ids.
    pending: VecDeque<TransferId>,
    /// Cancellation tokens for active items only.
    tokens: HashMap<TransferId, CancellationToken>,
    /// Dispatch instants for active items, for speed computation.
    active_since: HashMap<TransferId, Instant>,
    stats: QueueStats,
}

impl QueueState {
    pub(crate) fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
            pending: VecDeque::new(),
            tokens: HashMap::new(),
            active_since: HashMap::new(),
            stats: QueueStats::default(),
        }
    }

    pub(crate) fn insert(&mut self, id: TransferId, spec: TransferSpec, now: i64) {
        let item = TransferItem {
            id,
            direction: spec.direction,
            source: spec.source,
            destination: spec.destination,
            status: TransferStatus::Pending,
            transferred_bytes: 0,
            total_bytes: spec.size_hint,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        self.items.insert(id, item);
        self.order.push(id);
        self.pending.push_back(id);
        self.recompute_stats();
    }

    pub(crate) fn snapshot(&self) -> Vec<TransferItem> {
        self.order
            .iter()
            .filter_map(|id| self.items.get(id))
            .cloned()
            .collect()
    }

    pub(crate) fn get(&self, id: TransferId) -> Option<&TransferItem> {
        self.items.get(&id)
    }

    pub(crate) fn stats(&self) -> QueueStats {
        self.stats
    }

    pub(crate) fn active_count(&self) -> usize {
        self.stats.counts.active
    }

    /// Next pending id in FIFO order, skipping any stale entry defensively.
    pub(crate) fn pop_next_pending(&mut self) -> Option<TransferId> {
        while let Some(id) = self.pending.pop_front() {
            if self
                .items
                .get(&id)
                .is_some_and(|item| item.status == TransferStatus::Pending)
            {
                return Some(id);
            }
        }
        None
    }

    /// Promote a pending item to active and build the executor request.
    pub(crate) fn mark_active(
        &mut self,
        id: TransferId,
        now: i64,
        token: CancellationToken,
    ) -> Option<TransferRequest> {
        let item = self.items.get_mut(&id)?;
        if item.status != TransferStatus::Pending {
            return None;
        }
        item.status = TransferStatus::Active;
        item.started_at = Some(now);
        self.tokens.insert(id, token);
        self.active_since.insert(id, Instant::now());
        let item = &self.items[&id];
        let request = TransferRequest {
            id,
            direction: item.direction,
            source: item.source.clone(),
            destination: item.destination.clone(),
            size_hint: item.total_bytes,
        };
        self.recompute_stats();
        Some(request)
    }

    /// Update byte counters for an active item. Stale callbacks (wrong id,
    /// already cancelled or finished) are dropped here.
    pub(crate) fn apply_progress(
        &mut self,
        id: TransferId,
        transferred: u64,
        total: u64,
    ) -> Option<TransferProgress> {
        let Some(item) = self.items.get_mut(&id) else {
            warn!("progress for unknown transfer {} ignored", id);
            return None;
        };
        if item.status != TransferStatus::Active {
            warn!(
                "stale progress for transfer {} ({}) ignored",
                id, item.status
            );
            return None;
        }
        item.total_bytes = total;
        item.transferred_bytes = if total > 0 {
            transferred.min(total)
        } else {
            transferred
        };

        let elapsed = self
            .active_since
            .get(&id)
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let speed = if elapsed > 0.0 {
            self.items[&id].transferred_bytes as f64 / elapsed
        } else {
            0.0
        };

        let item = &self.items[&id];
        let progress = TransferProgress {
            id,
            percent: item.progress_percent(),
            transferred_bytes: item.transferred_bytes,
            total_bytes: item.total_bytes,
            speed,
        };
        self.recompute_stats();
        Some(progress)
    }

    /// Apply the executor's final result. Honored at most once: anything
    /// arriving for a non-active item is a stale callback and is dropped.
    pub(crate) fn apply_outcome(
        &mut self,
        id: TransferId,
        result: Result<(), TransferError>,
        now: i64,
    ) -> Option<TransferStatusChanged> {
        let Some(item) = self.items.get_mut(&id) else {
            warn!("outcome for unknown transfer {} ignored", id);
            return None;
        };
        if item.status != TransferStatus::Active {
            warn!("stale outcome for transfer {} ({}) ignored", id, item.status);
            return None;
        }
        match result {
            Ok(()) => {
                item.status = TransferStatus::Completed;
                // Normalize counters so a completed item always shows
                // transferred == total, even if the executor skipped the
                // final progress report.
                if item.total_bytes == 0 {
                    item.total_bytes = item.transferred_bytes;
                }
                item.transferred_bytes = item.total_bytes;
            }
            Err(err) => {
                item.status = TransferStatus::Failed;
                item.error = Some(err.to_string());
            }
        }
        item.completed_at = Some(now);
        let changed = TransferStatusChanged {
            id,
            status: item.status,
            error: item.error.clone(),
        };
        self.tokens.remove(&id);
        self.active_since.remove(&id);
        self.recompute_stats();
        Some(changed)
    }

    /// Cancel a pending or active item. Terminal from the registry's point
    /// of view immediately; the executor's abort may still be in flight.
    pub(crate) fn cancel(&mut self, id: TransferId, now: i64) -> CancelAction {
        let Some(item) = self.items.get_mut(&id) else {
            return CancelAction::Noop;
        };
        match item.status {
            TransferStatus::Pending => {
                item.status = TransferStatus::Cancelled;
                item.completed_at = Some(now);
                self.pending.retain(|queued| *queued != id);
                self.recompute_stats();
                CancelAction::WasPending
            }
            TransferStatus::Active => {
                item.status = TransferStatus::Cancelled;
                item.completed_at = Some(now);
                let token = self.tokens.remove(&id);
                self.active_since.remove(&id);
                self.recompute_stats();
                match token {
                    Some(token) => CancelAction::WasActive(token),
                    None => CancelAction::WasPending,
                }
            }
            _ => CancelAction::Noop,
        }
    }

    /// Return a failed/cancelled item to the back of the pending queue.
    pub(crate) fn retry(&mut self, id: TransferId) -> bool {
        let Some(item) = self.items.get_mut(&id) else {
            warn!("retry for unknown transfer {} ignored", id);
            return false;
        };
        if !item.status.can_retry() {
            warn!("retry for transfer {} ({}) ignored", id, item.status);
            return false;
        }
        item.status = TransferStatus::Pending;
        item.transferred_bytes = 0;
        // total_bytes stays as last known; the next progress report corrects it.
        item.error = None;
        item.started_at = None;
        item.completed_at = None;
        self.pending.push_back(id);
        self.recompute_stats();
        true
    }

    /// Remove one item. Active items hand back their token so the scheduler
    /// can stop the executor first.
    pub(crate) fn remove(&mut self, id: TransferId) -> Option<Option<CancellationToken>> {
        if !self.items.contains_key(&id) {
            return None;
        }
        let token = self.tokens.remove(&id);
        self.active_since.remove(&id);
        self.pending.retain(|queued| *queued != id);
        self.items.remove(&id);
        self.order.retain(|kept| *kept != id);
        self.recompute_stats();
        Some(token)
    }

    pub(crate) fn clear_completed(&mut self) -> usize {
        let removed: Vec<TransferId> = self
            .items
            .values()
            .filter(|item| item.status == TransferStatus::Completed)
            .map(|item| item.id)
            .collect();
        for id in &removed {
            self.items.remove(id);
        }
        let items = &self.items;
        self.order.retain(|id| items.contains_key(id));
        self.recompute_stats();
        removed.len()
    }

    /// Drop everything. Pending and active items are cancelled first so the
    /// executor stops work and no stale callback can resurrect a removed id.
    pub(crate) fn clear_all(&mut self) -> (usize, Vec<CancellationToken>) {
        let removed = self.items.len();
        let tokens = self.tokens.drain().map(|(_, token)| token).collect();
        self.items.clear();
        self.order.clear();
        self.pending.clear();
        self.active_since.clear();
        self.recompute_stats();
        (removed, tokens)
    }

    fn recompute_stats(&mut self) {
        let mut counts = QueueCounts::default();
        let mut transferred_sum = 0u64;
        let mut total_sum = 0u64;
        for item in self.items.values() {
            counts.total += 1;
            match item.status {
                TransferStatus::Pending => counts.pending += 1,
                TransferStatus::Active => counts.active += 1,
                TransferStatus::Completed => counts.completed += 1,
                TransferStatus::Failed => counts.failed += 1,
                TransferStatus::Cancelled => counts.cancelled += 1,
            }
            if item.total_bytes > 0 {
                transferred_sum += item.transferred_bytes.min(item.total_bytes);
                total_sum += item.total_bytes;
            }
        }
        self.stats = QueueStats {
            counts,
            transferred_bytes: transferred_sum,
            total_bytes: total_sum,
            aggregate_percent: percent(transferred_sum, total_sum),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::types::{TransferDestination, TransferDirection, TransferSource};

    fn spec(size: u64) -> TransferSpec {
        TransferSpec {
            direction: TransferDirection::Download,
            source: TransferSource::RemoteKey {
                key: "photos/cat.jpg".into(),
            },
            destination: TransferDestination::LocalPath {
                path: "/tmp/cat.jpg".into(),
            },
            size_hint: size,
        }
    }

    fn seeded(sizes: &[u64]) -> (QueueState, Vec<TransferId>) {
        let mut state = QueueState::new();
        let ids: Vec<TransferId> = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let id = TransferId(i as u64 + 1);
                state.insert(id, spec(*size), 0);
                id
            })
            .collect();
        (state, ids)
    }

    #[test]
    fn counts_partition_all_items() {
        let (mut state, ids) = seeded(&[10, 10, 10]);
        state.mark_active(ids[0], 1, CancellationToken::new());
        state.apply_outcome(ids[0], Ok(()), 2);
        state.cancel(ids[1], 2);

        let counts = state.stats().counts;
        assert_eq!(counts.total, 3);
        assert_eq!(
            counts.pending + counts.active + counts.completed + counts.failed + counts.cancelled,
            counts.total
        );
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.pending, 1);
    }

    #[test]
    fn aggregate_ignores_unknown_totals() {
        let (mut state, ids) = seeded(&[100, 0]);
        state.mark_active(ids[0], 1, CancellationToken::new());
        state.apply_progress(ids[0], 50, 100);
        // The zero-total item contributes nothing until a report sizes it.
        assert_eq!(state.stats().aggregate_percent, 50);
        assert_eq!(state.stats().total_bytes, 100);
    }

    #[test]
    fn progress_on_pending_item_is_dropped() {
        let (mut state, ids) = seeded(&[100]);
        assert!(state.apply_progress(ids[0], 10, 100).is_none());
        assert_eq!(state.get(ids[0]).unwrap().transferred_bytes, 0);
    }

    #[test]
    fn second_outcome_is_dropped() {
        let (mut state, ids) = seeded(&[100]);
        state.mark_active(ids[0], 1, CancellationToken::new());
        assert!(state.apply_outcome(ids[0], Ok(()), 2).is_some());
        assert!(state
            .apply_outcome(ids[0], Err(TransferError::Remote("late".into())), 3)
            .is_none());
        assert_eq!(state.get(ids[0]).unwrap().status, TransferStatus::Completed);
    }

    #[test]
    fn success_normalizes_counters() {
        let (mut state, ids) = seeded(&[0]);
        state.mark_active(ids[0], 1, CancellationToken::new());
        state.apply_progress(ids[0], 70, 0);
        state.apply_outcome(ids[0], Ok(()), 2);
        let item = state.get(ids[0]).unwrap();
        assert_eq!(item.total_bytes, 70);
        assert_eq!(item.transferred_bytes, 70);
        assert_eq!(item.progress_percent(), 100);
    }

    #[test]
    fn retry_resets_counters_and_requeues() {
        let (mut state, ids) = seeded(&[100]);
        state.mark_active(ids[0], 1, CancellationToken::new());
        state.apply_progress(ids[0], 40, 100);
        state.apply_outcome(ids[0], Err(TransferError::Remote("boom".into())), 2);

        assert!(state.retry(ids[0]));
        let item = state.get(ids[0]).unwrap();
        assert_eq!(item.status, TransferStatus::Pending);
        assert_eq!(item.transferred_bytes, 0);
        assert_eq!(item.total_bytes, 100);
        assert!(item.error.is_none());
        assert!(item.started_at.is_none());
        assert_eq!(state.pop_next_pending(), Some(ids[0]));
    }

    #[test]
    fn retry_on_non_terminal_item_is_noop() {
        let (mut state, ids) = seeded(&[100]);
        assert!(!state.retry(ids[0]));
        state.mark_active(ids[0], 1, CancellationToken::new());
        assert!(!state.retry(ids[0]));
    }

    #[test]
    fn clear_all_hands_back_active_tokens() {
        let (mut state, ids) = seeded(&[10, 10, 10]);
        let token = CancellationToken::new();
        state.mark_active(ids[0], 1, token.clone());
        let (removed, tokens) = state.clear_all();
        assert_eq!(removed, 3);
        assert_eq!(tokens.len(), 1);
        assert_eq!(state.stats().counts.total, 0);
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn remove_keeps_snapshot_order() {
        let (mut state, ids) = seeded(&[1, 2, 3]);
        state.remove(ids[1]);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, ids[0]);
        assert_eq!(snapshot[1].id, ids[2]);
    }
}
