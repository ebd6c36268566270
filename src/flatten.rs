//! Directory flattener: expands a mixed set of files and directory trees
//! into a flat list of leaf files, each carrying the relative-path prefix
//! used to rebuild the directory structure as remote key prefixes.
//!
//! Traversal is depth-first and fully materialized per ingestion batch;
//! sibling order is whatever the underlying listing yields. A branch whose
//! listing fails is skipped, keeping everything collected so far.

use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

/// Entry tree as delivered by the webview drop payload, already materialized
/// by the shell before it crosses into the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileSystemEntry {
    File {
        name: String,
        size: u64,
        path: PathBuf,
    },
    Directory {
        name: String,
        entries: Vec<FileSystemEntry>,
    },
}

/// One leaf file ready to become a transfer item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
    /// '/'-joined ancestor directory names; empty for top-level files. For a
    /// dropped directory the directory's own name is the first segment.
    pub relative_prefix: String,
}

/// Flatten in-memory entry trees (webview drops).
pub fn flatten(entries: &[FileSystemEntry]) -> Vec<FlatFile> {
    let mut leaves = Vec::new();
    for entry in entries {
        match entry {
            FileSystemEntry::File { name, size, path } => leaves.push(FlatFile {
                name: name.clone(),
                size: *size,
                path: path.clone(),
                relative_prefix: String::new(),
            }),
            FileSystemEntry::Directory { name, entries } => {
                walk_entries(entries, name, &mut leaves);
            }
        }
    }
    leaves
}

fn walk_entries(entries: &[FileSystemEntry], prefix: &str, out: &mut Vec<FlatFile>) {
    for entry in entries {
        match entry {
            FileSystemEntry::File { name, size, path } => out.push(FlatFile {
                name: name.clone(),
                size: *size,
                path: path.clone(),
                relative_prefix: prefix.to_string(),
            }),
            FileSystemEntry::Directory { name, entries } => {
                walk_entries(entries, &format!("{prefix}/{name}"), out);
            }
        }
    }
}

/// Flatten local paths (folder picker). Roots that are plain files come back
/// with no prefix; directory roots are walked depth-first.
pub async fn flatten_local(roots: &[PathBuf]) -> Vec<FlatFile> {
    let mut leaves = Vec::new();
    for root in roots {
        let meta = match tokio::fs::metadata(root).await {
            Ok(meta) => meta,
            Err(err) => {
                warn!("skipping {}: {}", root.display(), err);
                continue;
            }
        };
        let Some(name) = entry_name(root) else {
            warn!("skipping unnamed path {}", root.display());
            continue;
        };
        if meta.is_dir() {
            walk_directory(root.clone(), name, &mut leaves).await;
        } else {
            leaves.push(FlatFile {
                name,
                size: meta.len(),
                path: root.clone(),
                relative_prefix: String::new(),
            });
        }
    }
    leaves
}

async fn walk_directory(root: PathBuf, root_name: String, out: &mut Vec<FlatFile>) {
    let mut stack = vec![(root, root_name)];
    while let Some((dir, prefix)) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                // Branch-level partial failure: skip it, keep the rest.
                warn!("skipping directory {}: {}", dir.display(), err);
                continue;
            }
        };
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    let Some(name) = entry_name(&path) else {
                        continue;
                    };
                    let meta = match entry.metadata().await {
                        Ok(meta) => meta,
                        Err(err) => {
                            warn!("skipping {}: {}", path.display(), err);
                            continue;
                        }
                    };
                    if meta.is_dir() {
                        stack.push((path, format!("{prefix}/{name}")));
                    } else {
                        out.push(FlatFile {
                            name,
                            size: meta.len(),
                            path,
                            relative_prefix: prefix.clone(),
                        });
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("listing error in {}: {}", dir.display(), err);
                    break;
                }
            }
        }
    }
}

fn entry_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
