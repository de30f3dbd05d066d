// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File Watcher (§4.D): at most one project "active" at a time, watched
//! recursively for changes under `.chief/prds/*/`.
//!
//! Grounded on the notify-to-tokio bridge in `indexing::watcher::FileWatcher`
//! (callback thread feeds an unbounded channel an async task drains), with
//! the gitignore/filter machinery dropped since only PRD-directory changes
//! matter here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chief_core::ProjectFinder;
use chief_wire::{MessageSink, Response};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::WorkspaceError;
use crate::scan::Scanner;

struct ActiveWatch {
    project: String,
    // Held only to keep the OS watch alive; dropping it cancels the watch.
    _watcher: RecommendedWatcher,
    reader: JoinHandle<()>,
}

pub struct FileWatcher {
    scanner: Arc<Scanner>,
    sink: Arc<dyn MessageSink>,
    active: Mutex<Option<ActiveWatch>>,
}

impl FileWatcher {
    pub fn new(scanner: Arc<Scanner>, sink: Arc<dyn MessageSink>) -> Arc<Self> {
        Arc::new(FileWatcher { scanner, sink, active: Mutex::new(None) })
    }

    pub fn active_project(&self) -> Option<String> {
        self.active.lock().as_ref().map(|w| w.project.clone())
    }

    /// Replaces the current watch (if any) with a recursive watch rooted at
    /// `name`'s project directory. Idempotent: re-activating the already
    /// active project still restarts the watch, since the caller may be
    /// recovering from a dropped subprocess.
    pub fn activate(self: &Arc<Self>, name: &str) -> Result<(), WorkspaceError> {
        let project = self
            .scanner
            .find_project(name)
            .ok_or_else(|| WorkspaceError::ProjectNotFound { name: name.to_string() })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(&project.path, RecursiveMode::Recursive)?;

        let reader = {
            let watcher = self.clone();
            let project_name = project.name.clone();
            let project_root = project.path.clone();
            tokio::spawn(async move { watcher.drain(project_name, project_root, rx).await })
        };

        let previous =
            self.active.lock().replace(ActiveWatch { project: project.name, _watcher: watcher, reader });
        if let Some(previous) = previous {
            previous.reader.abort();
        }
        Ok(())
    }

    /// Detaches the current watch, if any. Safe to call with no active watch.
    pub fn close(&self) {
        if let Some(previous) = self.active.lock().take() {
            previous.reader.abort();
        }
    }

    async fn drain(
        &self,
        project: String,
        project_root: PathBuf,
        mut rx: mpsc::UnboundedReceiver<Event>,
    ) {
        while let Some(event) = rx.recv().await {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                continue;
            }
            for path in &event.paths {
                if let Some(prd_id) = prd_id_for_path(path, &project_root) {
                    self.handle_prd_change(&project, &prd_id).await;
                }
            }
        }
        debug!(project = %project, "file watcher channel closed");
    }

    async fn handle_prd_change(&self, project: &str, prd_id: &str) {
        let previous = self
            .scanner
            .find_project(project)
            .and_then(|p| p.prds.into_iter().find(|s| s.id == prd_id));

        let updated = self.scanner.rescan_one(project).await;
        let current = updated.and_then(|p| p.prds.into_iter().find(|s| s.id == prd_id));

        if current == previous {
            return;
        }

        let Some(project_summary) = self.scanner.find_project(project) else { return };
        let prd_dir = project_summary.path.join(".chief").join("prds").join(prd_id);
        let Ok(Some(prd)) = chief_artifacts::read_json(prd_dir.join("prd.json")).await else { return };
        let markdown = tokio::fs::read_to_string(prd_dir.join("prd.md")).await.unwrap_or_default();

        let _ = self
            .sink
            .send(Response::PrdContent {
                project: project.to_string(),
                prd_id: prd_id.to_string(),
                markdown,
                prd,
            })
            .await;
    }
}

/// Returns the PRD id a changed path belongs to, or `None` if the path is
/// outside `.chief/prds/*/` (§4.D: "Non-PRD file changes are ignored").
fn prd_id_for_path(path: &Path, project_root: &Path) -> Option<String> {
    let rel = path.strip_prefix(project_root).ok()?;
    let mut components = rel.components();
    if components.next()?.as_os_str() != ".chief" {
        return None;
    }
    if components.next()?.as_os_str() != "prds" {
        return None;
    }
    components.next()?.as_os_str().to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_prd_id_from_nested_path() {
        let root = Path::new("/work/demo");
        let path = root.join(".chief/prds/prd-1/prd.json");
        assert_eq!(prd_id_for_path(&path, root).as_deref(), Some("prd-1"));
    }

    #[test]
    fn ignores_paths_outside_prd_directories() {
        let root = Path::new("/work/demo");
        assert_eq!(prd_id_for_path(&root.join("src/main.rs"), root), None);
        assert_eq!(prd_id_for_path(&root.join(".git/HEAD"), root), None);
    }
}
