//! Transfer item model, status state machine, and event payloads.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque identifier for one tracked transfer. Assigned at enqueue time,
/// never reused for the queue's lifetime, even after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(pub(crate) u64);

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    /// Terminal states never transition again, except `Failed`/`Cancelled`
    /// re-entering the queue through retry.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    pub fn can_retry(self) -> bool {
        matches!(self, TransferStatus::Failed | TransferStatus::Cancelled)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Active => write!(f, "active"),
            TransferStatus::Completed => write!(f, "completed"),
            TransferStatus::Failed => write!(f, "failed"),
            TransferStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Where the bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferSource {
    /// Upload of a single flattened leaf file. `relative_prefix` is the
    /// ancestor-directory chain from a directory drop, empty for top-level
    /// files.
    LocalFile {
        path: PathBuf,
        relative_prefix: String,
    },
    /// Upload of a native-drop path that may itself be a directory; the
    /// executor walks it, since only it has filesystem access at transfer
    /// time.
    LocalPath { path: PathBuf },
    /// Download of a single remote object.
    RemoteKey { key: String },
    /// Download of a remote prefix, archived by the executor as one unit.
    RemotePrefix { prefix: String },
}

/// Where the bytes go. Resolved at enqueue time, immutable afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferDestination {
    RemoteKey { key: String },
    LocalPath { path: PathBuf },
}

/// Input to `enqueue`: everything about a transfer except its identity and
/// bookkeeping, which the queue assigns.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub direction: TransferDirection,
    pub source: TransferSource,
    pub destination: TransferDestination,
    /// Known size in bytes, 0 when unknown. Corrected by the first progress
    /// report.
    pub size_hint: u64,
}

/// One tracked unit of upload or download work.
#[derive(Debug, Clone, Serialize)]
pub struct TransferItem {
    pub id: TransferId,
    pub direction: TransferDirection,
    pub source: TransferSource,
    pub destination: TransferDestination,
    pub status: TransferStatus,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    pub error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl TransferItem {
    /// Percent complete, rounded; 0 while the total is unknown.
    pub fn progress_percent(&self) -> u32 {
        percent(self.transferred_bytes, self.total_bytes)
    }
}

pub(crate) fn percent(transferred: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    std::cmp::min(
        ((transferred as f64 / total as f64) * 100.0).round() as u32,
        100,
    )
}

/// Counts by status. An exact partition of all non-removed items:
/// `pending + active + completed + failed + cancelled == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Derived aggregates, recomputed under the registry lock on every mutation
/// so observers never see them out of step with the item list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub counts: QueueCounts,
    /// Sums over items with a known total.
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    /// `round(transferred / total * 100)`, 0 while no totals are known.
    pub aggregate_percent: u32,
}

/// Progress event payload.
#[derive(Debug, Clone, Serialize)]
pub struct TransferProgress {
    pub id: TransferId,
    pub percent: u32,
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    pub speed: f64, // bytes per second
}

/// Status change event payload.
#[derive(Debug, Clone, Serialize)]
pub struct TransferStatusChanged {
    pub id: TransferId,
    pub status: TransferStatus,
    pub error: Option<String>,
}

/// Item removed event payload.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRemoved {
    pub id: TransferId,
}

/// Batch operation event payload (clear completed / clear all).
#[derive(Debug, Clone, Serialize)]
pub struct QueueBatchOperation {
    pub operation: String, // "clear_completed" | "clear_all"
    pub removed: usize,
}

/// Notifications published to UI observers. Observers re-read the snapshot
/// after each notification rather than patching local state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    Progress(TransferProgress),
    StatusChanged(TransferStatusChanged),
    Removed(TransferRemoved),
    Batch(QueueBatchOperation),
    Stats(QueueStats),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_expected_strings() {
        assert_eq!(TransferStatus::Pending.to_string(), "pending");
        assert_eq!(TransferStatus::Active.to_string(), "active");
        assert_eq!(TransferStatus::Completed.to_string(), "completed");
        assert_eq!(TransferStatus::Failed.to_string(), "failed");
        assert_eq!(TransferStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn only_failed_and_cancelled_can_retry() {
        assert!(TransferStatus::Failed.can_retry());
        assert!(TransferStatus::Cancelled.can_retry());
        assert!(!TransferStatus::Pending.can_retry());
        assert!(!TransferStatus::Active.can_retry());
        assert!(!TransferStatus::Completed.can_retry());
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(50, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(10, 10), 100);
        // Defensive clamp for an over-reporting executor.
        assert_eq!(percent(11, 10), 100);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Active).expect("serialize"),
            "\"active\""
        );
    }
}
