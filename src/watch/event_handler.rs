// src/watch/event_handler.rs

//! Event processing logic for file system changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{RuntimeEvent, TriggerReason};
use crate::fs::FileSystem;
use crate::watch::hash::ContentHashes;
use crate::watch::path_utils::relative_str;
use crate::watch::rules::RuleSet;

/// Which of an event's paths carry new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
    /// Every path of the event.
    All,
    /// Only the last path: the destination of a rename.
    RenameTarget,
    /// Paths that still exist. Renames of unknown direction name both
    /// sides; the side that was moved away is gone.
    Existing,
}

/// Decide whether an event kind means "content changed".
///
/// Creations, data writes and renames into a path count. Deletions,
/// accesses, metadata-only changes and the source side of a rename do not.
pub fn classify(kind: &EventKind) -> Option<ContentChange> {
    match kind {
        EventKind::Create(_) => Some(ContentChange::All),
        EventKind::Modify(modify) => match modify {
            ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other => Some(ContentChange::All),
            ModifyKind::Name(RenameMode::To) => Some(ContentChange::All),
            ModifyKind::Name(RenameMode::Any) => Some(ContentChange::Existing),
            ModifyKind::Name(RenameMode::Both) => Some(ContentChange::RenameTarget),
            ModifyKind::Name(_) | ModifyKind::Metadata(_) => None,
        },
        EventKind::Any => Some(ContentChange::All),
        EventKind::Remove(_) | EventKind::Access(_) | EventKind::Other => None,
    }
}

/// Paths of `event` that carry new content.
pub fn changed_paths(event: &Event) -> Vec<PathBuf> {
    match classify(&event.kind) {
        Some(ContentChange::All) => event.paths.clone(),
        Some(ContentChange::RenameTarget) => event.paths.last().cloned().into_iter().collect(),
        Some(ContentChange::Existing) => {
            event.paths.iter().filter(|p| p.exists()).cloned().collect()
        }
        None => Vec::new(),
    }
}

/// Shared state of the async event loop.
pub struct EventContext {
    pub root: PathBuf,
    pub rules: Arc<RuleSet>,
    /// Present when `use_hash` is enabled.
    pub hashes: Option<ContentHashes>,
    pub fs: Arc<dyn FileSystem>,
    pub runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl EventContext {
    /// Route one notify event to task triggers.
    ///
    /// Returns `false` once the runtime channel is closed.
    pub async fn handle_event(&mut self, event: Event) -> bool {
        let paths = changed_paths(&event);
        if paths.is_empty() {
            debug!(kind = ?event.kind, "ignoring event kind");
            return true;
        }

        for path in paths {
            if !self.process_file_change(&path).await {
                return false;
            }
        }
        true
    }

    async fn process_file_change(&mut self, path: &Path) -> bool {
        let Some(rel_str) = relative_str(&self.root, path) else {
            warn!(
                "could not relativize path {:?} against root {:?}",
                path, self.root
            );
            return true;
        };

        if self.rules.is_ignored(&rel_str) {
            debug!(rel = %rel_str, "ignoring change under a destination directory");
            return true;
        }

        let tasks = self.rules.tasks_for(&rel_str);
        if tasks.is_empty() {
            return true;
        }

        if let Some(hashes) = self.hashes.as_mut() {
            if !hashes.changed(self.fs.as_ref(), path) {
                debug!(rel = %rel_str, "content unchanged; skipping trigger");
                return true;
            }
        }

        for task in tasks {
            debug!(task = %task, path = %rel_str, "watch match -> triggering task");
            if let Err(err) = self
                .runtime_tx
                .send(RuntimeEvent::TaskTriggered {
                    task,
                    reason: TriggerReason::FileWatch,
                })
                .await
            {
                warn!("failed to send RuntimeEvent::TaskTriggered: {err}");
                return false;
            }
        }
        true
    }
}
