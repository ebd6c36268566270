//! Contract between the queue and the transfer executor collaborator.
//!
//! The executor owns the actual bytes-on-the-wire work: authentication,
//! multipart mechanics, HTTP-level retries, walking native-drop directories.
//! The queue only dispatches requests, feeds progress back into the
//! registry, and honors a single outcome per item.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

use super::scheduler::TransferQueue;
use super::types::{TransferDestination, TransferDirection, TransferId, TransferSource};

/// Everything an executor needs to move one item's bytes.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub id: TransferId,
    pub direction: TransferDirection,
    pub source: TransferSource,
    pub destination: TransferDestination,
    /// Size known at enqueue time, 0 when unknown.
    pub size_hint: u64,
}

/// Progress callback bound to one item. Reports after cancellation are
/// ignored by the registry, so a racing executor cannot resurrect a
/// cancelled item.
#[derive(Clone)]
pub struct ProgressSink {
    queue: TransferQueue,
    id: TransferId,
}

impl ProgressSink {
    pub(crate) fn new(queue: TransferQueue, id: TransferId) -> Self {
        Self { queue, id }
    }

    /// Report cumulative bytes moved and the total size once known.
    /// `transferred` must be non-decreasing across calls.
    pub fn report(&self, transferred: u64, total: u64) {
        self.queue.report_progress(self.id, transferred, total);
    }
}

/// External collaborator performing the actual file I/O for one item.
///
/// The returned `Result` is the single outcome callback: `Ok` completes the
/// item, `Err` fails it. Implementations must watch `cancel` and stop as
/// soon as practical once it fires; returning `TransferError::Cancelled`
/// after that is not treated as a failure.
#[async_trait]
pub trait TransferExecutor: Send + Sync + 'static {
    async fn execute(
        &self,
        request: TransferRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<()>;
}
