// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace Scanner (§4.C): an in-memory `name -> ProjectSummary` table,
//! refreshed on an interval and by the File Watcher's targeted rescans.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chief_core::{Prd, PrdSummary, ProjectFinder, ProjectSummary};
use chief_wire::{MessageSink, Response};
use parking_lot::Mutex;
use tracing::warn;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);

pub struct Scanner {
    workspace_root: PathBuf,
    table: Mutex<HashMap<String, ProjectSummary>>,
    sink: Arc<dyn MessageSink>,
}

impl Scanner {
    pub fn new(workspace_root: PathBuf, sink: Arc<dyn MessageSink>) -> Arc<Self> {
        Arc::new(Scanner { workspace_root, table: Mutex::new(HashMap::new()), sink })
    }

    /// `Scanner.initial_scan` (§4.H start ordering): populate the table once
    /// before the rest of the daemon comes up, without caring whether it
    /// "changed" relative to the (empty) prior snapshot.
    pub async fn initial_scan(&self) {
        self.scan_and_update().await;
    }

    /// Runs `scan_and_update` every `interval` for the lifetime of the task.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) {
        let scanner = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scanner.scan_and_update().await;
            }
        });
    }

    /// Re-enumerate every project, publish a new snapshot if it differs from
    /// the previous one, and emit `project_list` on change (§4.C). Returns
    /// whether the table changed.
    pub async fn scan_and_update(&self) -> bool {
        let projects = self.enumerate_projects().await;
        let new_table: HashMap<String, ProjectSummary> =
            projects.into_iter().map(|p| (p.name.clone(), p)).collect();

        let changed = {
            let mut table = self.table.lock();
            if *table == new_table {
                false
            } else {
                *table = new_table;
                true
            }
        };

        if changed {
            let snapshot: Vec<ProjectSummary> = self.table.lock().values().cloned().collect();
            let _ = self.sink.send(Response::ProjectList { projects: snapshot }).await;
        }
        changed
    }

    /// Recompute a single project's summary (File Watcher §4.D targeted
    /// rescan) and update the table entry. Returns the new summary if the
    /// project is still a valid git-backed directory.
    pub async fn rescan_one(&self, name: &str) -> Option<ProjectSummary> {
        let path = self.workspace_root.join(name);
        let summary = project_summary(&path, name).await?;
        self.table.lock().insert(name.to_string(), summary.clone());
        Some(summary)
    }

    async fn enumerate_projects(&self) -> Vec<ProjectSummary> {
        let mut entries = match tokio::fs::read_dir(&self.workspace_root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, root = %self.workspace_root.display(), "failed to read workspace root");
                return Vec::new();
            }
        };

        let mut projects = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read workspace directory entry");
                    break;
                }
            };
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(summary) = project_summary(&entry.path(), &name).await {
                projects.push(summary);
            }
        }
        projects
    }
}

impl ProjectFinder for Scanner {
    fn find_project(&self, name: &str) -> Option<ProjectSummary> {
        self.table.lock().get(name).cloned()
    }

    fn list_projects(&self) -> Vec<ProjectSummary> {
        self.table.lock().values().cloned().collect()
    }
}

/// Builds a `ProjectSummary` for `path`, or `None` if it isn't a git-backed
/// project directory (§4.C: "accepting each that contains a `.git` entry").
async fn project_summary(path: &Path, name: &str) -> Option<ProjectSummary> {
    if !tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false) {
        return None;
    }

    let prds = prd_summaries(path).await;
    Some(ProjectSummary { name: name.to_string(), path: path.to_path_buf(), has_git: true, prds })
}

async fn prd_summaries(project_dir: &Path) -> Vec<PrdSummary> {
    let prds_dir = project_dir.join(".chief").join("prds");
    let mut entries = match tokio::fs::read_dir(&prds_dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut summaries = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(_) => break,
        };
        let Ok(file_type) = entry.file_type().await else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let prd_id = entry.file_name().to_string_lossy().into_owned();
        let prd_path = entry.path().join("prd.json");
        if let Ok(Some(prd)) = chief_artifacts::read_json::<Prd>(prd_path).await {
            summaries.push(PrdSummary::from_prd(&prd_id, &prd));
        }
    }
    summaries
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chief_core::Story;

    use super::*;

    struct RecordingSink {
        sent: Mutex<Vec<Response>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink { sent: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, response: Response) -> Result<(), chief_wire::sink::SinkClosed> {
            self.sent.lock().push(response);
            Ok(())
        }
    }

    async fn make_project(root: &Path, name: &str, prd_id: Option<&str>) {
        let dir = root.join(name);
        tokio::fs::create_dir_all(dir.join(".git")).await.unwrap();
        if let Some(prd_id) = prd_id {
            let prd_dir = dir.join(".chief").join("prds").join(prd_id);
            tokio::fs::create_dir_all(&prd_dir).await.unwrap();
            let prd = Prd {
                project: name.to_string(),
                user_stories: vec![Story {
                    id: "US-001".into(),
                    title: "t".into(),
                    passes: false,
                    in_progress: None,
                    extra: HashMap::new(),
                }],
                extra: HashMap::new(),
            };
            chief_artifacts::write_json_atomic(prd_dir.join("prd.json"), prd).await.unwrap();
        }
    }

    #[tokio::test]
    async fn scan_accepts_only_git_backed_directories() {
        let root = tempfile::tempdir().unwrap();
        make_project(root.path(), "has-git", Some("prd-1")).await;
        tokio::fs::create_dir_all(root.path().join("no-git")).await.unwrap();

        let sink = RecordingSink::new();
        let scanner = Scanner::new(root.path().to_path_buf(), sink);
        scanner.initial_scan().await;

        let projects = scanner.list_projects();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "has-git");
        assert_eq!(projects[0].prds.len(), 1);
        assert_eq!(projects[0].prds[0].id, "prd-1");
    }

    #[tokio::test]
    async fn unchanged_scan_emits_nothing_twice() {
        let root = tempfile::tempdir().unwrap();
        make_project(root.path(), "demo", None).await;

        let sink = RecordingSink::new();
        let scanner = Scanner::new(root.path().to_path_buf(), sink.clone());

        assert!(scanner.scan_and_update().await);
        assert!(!scanner.scan_and_update().await);
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn rescan_one_updates_a_single_entry() {
        let root = tempfile::tempdir().unwrap();
        make_project(root.path(), "demo", None).await;

        let sink = RecordingSink::new();
        let scanner = Scanner::new(root.path().to_path_buf(), sink);
        scanner.initial_scan().await;
        assert!(scanner.find_project("demo").unwrap().prds.is_empty());

        make_project(root.path(), "demo", Some("prd-1")).await;
        let updated = scanner.rescan_one("demo").await.unwrap();
        assert_eq!(updated.prds.len(), 1);
        assert_eq!(scanner.find_project("demo").unwrap().prds.len(), 1);
    }
}
