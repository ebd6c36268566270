//! Reconciliation between the two drag-and-drop event systems.
//!
//! The host environment can deliver the same physical drag gesture twice:
//! once through the native OS event stream and once through the in-page
//! webview stream. Exactly one of them is authoritative for external
//! imports, and a drag that starts inside the application must never be
//! misread as an import. The router decides, per drop, who handles it.

use std::sync::atomic::{AtomicBool, Ordering};

/// Which event stream delivered a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEventSystem {
    Native,
    Webview,
}

/// Routing decision for one drop event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropRoute {
    /// Both source and target are inside the application: a remote
    /// move/copy, not a transfer.
    Internal,
    /// External import, to be flattened and enqueued.
    External,
    /// Duplicate or non-authoritative delivery; do nothing.
    Ignored,
}

#[derive(Debug)]
pub struct DragRouter {
    /// The event system confirmed active for this environment.
    authoritative: DropEventSystem,
    /// Set while a drag that originated inside the application is in
    /// progress. While set, every drop is internal no matter which system
    /// delivered it.
    internal_drag: AtomicBool,
    /// Set once a drop has been routed for the current gesture, so the
    /// other system's echo of the same drop is suppressed. Reset when the
    /// next drag session starts.
    consumed: AtomicBool,
}

impl DragRouter {
    pub fn new(authoritative: DropEventSystem) -> Self {
        Self {
            authoritative,
            internal_drag: AtomicBool::new(false),
            consumed: AtomicBool::new(false),
        }
    }

    /// A new drag session entered the window (either system, any origin).
    pub fn drag_started(&self) {
        self.consumed.store(false, Ordering::SeqCst);
    }

    /// An in-application drag source started a gesture.
    pub fn begin_internal_drag(&self) {
        self.internal_drag.store(true, Ordering::SeqCst);
        self.consumed.store(false, Ordering::SeqCst);
    }

    pub fn internal_drag_in_progress(&self) -> bool {
        self.internal_drag.load(Ordering::SeqCst)
    }

    /// The gesture ended without a drop. Clears the internal flag
    /// unconditionally so a stale flag cannot block later imports.
    pub fn drag_cancelled(&self) {
        self.internal_drag.store(false, Ordering::SeqCst);
    }

    /// Decide who handles a drop. Clears the internal flag unconditionally
    /// on the first delivery of the gesture.
    pub fn route_drop(&self, system: DropEventSystem) -> DropRoute {
        if self.consumed.load(Ordering::SeqCst) {
            return DropRoute::Ignored;
        }
        if self.internal_drag.swap(false, Ordering::SeqCst) {
            self.consumed.store(true, Ordering::SeqCst);
            return DropRoute::Internal;
        }
        if system == self.authoritative {
            self.consumed.store(true, Ordering::SeqCst);
            DropRoute::External
        } else {
            DropRoute::Ignored
        }
    }
}
