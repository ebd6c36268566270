//! Ingestion front door: turns picker selections, drops, and download
//! requests into transfer items and feeds the queue.

pub mod drag;

use std::path::{Path, PathBuf};

use log::warn;

use crate::flatten::{self, FileSystemEntry, FlatFile};
use crate::transfer::{
    TransferDestination, TransferDirection, TransferId, TransferQueue, TransferSource,
    TransferSpec,
};

pub use drag::{DragRouter, DropEventSystem, DropRoute};

/// File-picker result: a resolved local file with its name and size.
#[derive(Debug, Clone)]
pub struct PickedFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

/// Remote object selected for download.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
}

/// Payload of one drop event, shaped by the system that delivered it.
#[derive(Debug, Clone)]
pub enum DropPayload {
    /// Native drops carry absolute paths; directory expansion is delegated
    /// to the executor, which walks them at transfer time.
    Native { paths: Vec<PathBuf> },
    /// Webview drops carry materialized entry trees, flattened here.
    Webview { entries: Vec<FileSystemEntry> },
}

/// What the front door did with a drop.
#[derive(Debug)]
pub enum DropOutcome {
    /// External import: one transfer item per leaf.
    Enqueued(Vec<TransferId>),
    /// The drag originated inside the application; the caller performs the
    /// remote move/copy instead.
    InternalMove,
    /// Duplicate or non-authoritative delivery.
    Ignored,
}

/// Join key segments with single slashes, skipping empty parts.
pub fn remote_key(base_prefix: &str, relative_prefix: &str, name: &str) -> String {
    let mut key = String::new();
    for segment in [base_prefix, relative_prefix, name] {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(segment);
    }
    key
}

fn upload_specs(leaves: Vec<FlatFile>, base_prefix: &str) -> Vec<TransferSpec> {
    leaves
        .into_iter()
        .map(|leaf| TransferSpec {
            direction: TransferDirection::Upload,
            destination: TransferDestination::RemoteKey {
                key: remote_key(base_prefix, &leaf.relative_prefix, &leaf.name),
            },
            source: TransferSource::LocalFile {
                path: leaf.path,
                relative_prefix: leaf.relative_prefix,
            },
            size_hint: leaf.size,
        })
        .collect()
}

/// Enqueue uploads for explicit file-picker selections.
pub fn enqueue_file_uploads(
    queue: &TransferQueue,
    files: Vec<PickedFile>,
    base_prefix: &str,
) -> Vec<TransferId> {
    let specs = files
        .into_iter()
        .map(|file| TransferSpec {
            direction: TransferDirection::Upload,
            destination: TransferDestination::RemoteKey {
                key: remote_key(base_prefix, "", &file.name),
            },
            source: TransferSource::LocalFile {
                path: file.path,
                relative_prefix: String::new(),
            },
            size_hint: file.size,
        })
        .collect();
    queue.enqueue(specs)
}

/// Enqueue uploads for a folder-picker selection: the root is walked and
/// every leaf becomes one item, keyed under the root directory's name.
pub async fn enqueue_folder_upload(
    queue: &TransferQueue,
    root: &Path,
    base_prefix: &str,
) -> Vec<TransferId> {
    let leaves = flatten::flatten_local(&[root.to_path_buf()]).await;
    queue.enqueue(upload_specs(leaves, base_prefix))
}

/// Enqueue downloads for selected remote objects, one item per key.
pub fn enqueue_downloads(
    queue: &TransferQueue,
    objects: Vec<RemoteObject>,
    dest_dir: &Path,
) -> Vec<TransferId> {
    let specs = objects
        .into_iter()
        .map(|object| {
            let file_name = object
                .key
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("download")
                .to_string();
            TransferSpec {
                direction: TransferDirection::Download,
                destination: TransferDestination::LocalPath {
                    path: dest_dir.join(file_name),
                },
                source: TransferSource::RemoteKey { key: object.key },
                size_hint: object.size,
            }
        })
        .collect();
    queue.enqueue(specs)
}

/// Enqueue a whole-prefix download. The executor archives the prefix and
/// reports it as a single unit, so this is one item regardless of how many
/// objects live under the prefix.
pub fn enqueue_prefix_download(
    queue: &TransferQueue,
    prefix: &str,
    dest_dir: &Path,
) -> TransferId {
    let name = prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string();
    queue.enqueue_one(TransferSpec {
        direction: TransferDirection::Download,
        destination: TransferDestination::LocalPath {
            path: dest_dir.join(name),
        },
        source: TransferSource::RemotePrefix {
            prefix: prefix.to_string(),
        },
        size_hint: 0,
    })
}

/// Route one drop event and, for external imports, enqueue its contents.
pub fn handle_drop(
    queue: &TransferQueue,
    router: &DragRouter,
    system: DropEventSystem,
    payload: DropPayload,
    base_prefix: &str,
) -> DropOutcome {
    match router.route_drop(system) {
        DropRoute::Internal => DropOutcome::InternalMove,
        DropRoute::Ignored => DropOutcome::Ignored,
        DropRoute::External => {
            let specs = match payload {
                DropPayload::Native { paths } => paths
                    .into_iter()
                    .filter_map(|path| {
                        let Some(name) = path.file_name() else {
                            warn!("skipping unnamed drop path {}", path.display());
                            return None;
                        };
                        let name = name.to_string_lossy().into_owned();
                        Some(TransferSpec {
                            direction: TransferDirection::Upload,
                            destination: TransferDestination::RemoteKey {
                                key: remote_key(base_prefix, "", &name),
                            },
                            source: TransferSource::LocalPath { path },
                            size_hint: 0,
                        })
                    })
                    .collect(),
                DropPayload::Webview { entries } => {
                    upload_specs(flatten::flatten(&entries), base_prefix)
                }
            };
            DropOutcome::Enqueued(queue.enqueue(specs))
        }
    }
}
