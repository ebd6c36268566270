//! Client-side transfer engine for the Stowage desktop object-storage
//! browser.
//!
//! The crate owns the transfer queue: ingestion of files and directory
//! trees, FIFO scheduling under a concurrency cap, byte-level progress,
//! retry, and cooperative cancellation. The actual bytes-on-the-wire work
//! is delegated to a [`TransferExecutor`] collaborator; the surrounding
//! application wires the queue to its UI through [`TransferQueue::subscribe`]
//! and read-only snapshots.

pub mod config;
pub mod error;
pub mod flatten;
pub mod ingest;
pub mod transfer;

pub use config::QueueConfig;
pub use error::{Result, TransferError};
pub use flatten::{FileSystemEntry, FlatFile};
pub use ingest::{DragRouter, DropEventSystem, DropOutcome, DropPayload, DropRoute};
pub use transfer::{
    ProgressSink, QueueCounts, QueueEvent, QueueStats, TransferDestination, TransferDirection,
    TransferExecutor, TransferId, TransferItem, TransferQueue, TransferRequest, TransferSource,
    TransferSpec, TransferStatus,
};
