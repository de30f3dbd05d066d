// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run Manager (§4.F): multi-iteration automated runs.
//!
//! At most one run per `(project, prd_id)`. Each run owns one tokio task
//! running the iteration loop and a shared handle to the in-flight child
//! so `stop_run` and shutdown reconciliation can reach in and kill it from
//! outside that task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chief_wire::response::RunSnapshot;
use chief_wire::{MessageSink, Response};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::RunError;
use crate::marker::parse_status_marker;
use crate::prd_io::{load_prd, save_prd};
use crate::spawner::IterationSpawner;

/// Sentinel substring the iterator subprocess emits when the upstream
/// agent has exhausted its quota (§4.F "Quota detection").
pub const QUOTA_SENTINEL: &str = "QUOTA_EXCEEDED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Control {
    Run,
    Pause,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RunKey {
    project: String,
    prd_id: String,
}

struct RunHandle {
    control: watch::Sender<Control>,
    current_story_id: Arc<Mutex<Option<String>>>,
    iteration: Arc<Mutex<u32>>,
    child: Arc<Mutex<Option<Child>>>,
    project_dir: PathBuf,
}

impl Control {
    fn as_state_str(self) -> &'static str {
        match self {
            Control::Run => "running",
            Control::Pause => "paused",
            Control::Stop => "stopped",
        }
    }
}

pub struct RunManager {
    runs: Mutex<HashMap<RunKey, RunHandle>>,
    sink: Arc<dyn MessageSink>,
    spawner: Arc<dyn IterationSpawner>,
}

impl RunManager {
    pub fn new(sink: Arc<dyn MessageSink>, spawner: Arc<dyn IterationSpawner>) -> Arc<Self> {
        Arc::new(RunManager { runs: Mutex::new(HashMap::new()), sink, spawner })
    }

    pub fn is_running(&self, project: &str, prd_id: &str) -> bool {
        let key = RunKey { project: project.to_string(), prd_id: prd_id.to_string() };
        self.runs.lock().contains_key(&key)
    }

    /// Derived projection of every active run (§3, §4.A reconnect
    /// snapshot).
    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.runs
            .lock()
            .iter()
            .map(|(key, handle)| RunSnapshot {
                project: key.project.clone(),
                prd_id: key.prd_id.clone(),
                state: (*handle.control.borrow()).as_state_str().to_string(),
                iteration: *handle.iteration.lock(),
                current_story_id: handle.current_story_id.lock().clone(),
            })
            .collect()
    }

    /// Start a run if one isn't already active for this `(project, prd_id)`
    /// (§4.F "at most one active run").
    pub async fn start_run(
        self: &Arc<Self>,
        project_dir: PathBuf,
        project: String,
        prd_id: String,
        max_iterations: u32,
    ) -> Result<(), RunError> {
        let key = RunKey { project: project.clone(), prd_id: prd_id.clone() };
        if self.runs.lock().contains_key(&key) {
            return Ok(());
        }

        // Fail fast if the PRD doesn't exist; the loop re-reads it per iteration.
        load_prd(&project_dir, &project, &prd_id).await?;

        let (control_tx, control_rx) = watch::channel(Control::Run);
        let handle = RunHandle {
            control: control_tx,
            current_story_id: Arc::new(Mutex::new(None)),
            iteration: Arc::new(Mutex::new(1)),
            child: Arc::new(Mutex::new(None)),
            project_dir: project_dir.clone(),
        };
        let current_story_id = handle.current_story_id.clone();
        let iteration = handle.iteration.clone();
        let child_slot = handle.child.clone();
        self.runs.lock().insert(key.clone(), handle);

        let _ = self.sink.send(Response::RunStarted { project: project.clone(), prd_id: prd_id.clone() }).await;

        let manager = self.clone();
        tokio::spawn(async move {
            let manager_cleanup = manager.clone();
            manager
                .run_loop(key.clone(), project_dir, max_iterations, control_rx, current_story_id, iteration, child_slot)
                .await;
            manager_cleanup.runs.lock().remove(&key);
        });

        Ok(())
    }

    /// No-op (not an error) if the run doesn't exist or is already paused
    /// (§4.F).
    pub fn pause_run(&self, project: &str, prd_id: &str) {
        self.set_control(project, prd_id, Control::Pause);
    }

    pub fn resume_run(&self, project: &str, prd_id: &str) {
        self.set_control(project, prd_id, Control::Run);
    }

    /// Cancels the in-flight subprocess and discards the run record
    /// immediately (§4.F).
    pub async fn stop_run(&self, project: &str, prd_id: &str) {
        let key = RunKey { project: project.to_string(), prd_id: prd_id.to_string() };
        let Some(handle) = self.runs.lock().remove(&key) else { return };
        let _ = handle.control.send(Control::Stop);
        let taken = handle.child.lock().take();
        if let Some(mut child) = taken {
            let _ = child.start_kill();
        }
    }

    fn set_control(&self, project: &str, prd_id: &str, control: Control) {
        let key = RunKey { project: project.to_string(), prd_id: prd_id.to_string() };
        if let Some(handle) = self.runs.lock().get(&key) {
            let _ = handle.control.send(control);
        }
    }

    /// Stop every active run with status `quota_exceeded` (§4.F "Quota
    /// detection": "stops all active runs").
    async fn stop_all_for_quota(&self) {
        let keys: Vec<RunKey> = self.runs.lock().keys().cloned().collect();
        for key in keys {
            self.stop_run(&key.project, &key.prd_id).await;
            let _ = self
                .sink
                .send(Response::RunProgress {
                    project: key.project,
                    prd_id: key.prd_id,
                    status: "quota_exceeded".to_string(),
                    story_id: None,
                })
                .await;
        }
    }

    /// Reconcile every active run's in-progress story into `prd.json` and
    /// kill its subprocess (§4.H shutdown, §8 scenario 4 "shutdown
    /// reconciliation").
    pub async fn shutdown(&self) {
        let handles: Vec<(RunKey, PathBuf, Option<String>, Arc<Mutex<Option<Child>>>)> = {
            let runs = self.runs.lock();
            runs.iter()
                .map(|(k, h)| {
                    (k.clone(), h.project_dir.clone(), h.current_story_id.lock().clone(), h.child.clone())
                })
                .collect()
        };
        for (key, project_dir, story_id, child_slot) in handles {
            if let Some(story_id) = story_id {
                if let Err(e) = mark_in_progress(&project_dir, &key.project, &key.prd_id, &story_id).await {
                    warn!(error = %e, prd_id = %key.prd_id, "failed to reconcile in-progress story on shutdown");
                }
            }
            if let Some(mut child) = child_slot.lock().take() {
                let _ = child.start_kill();
            }
        }
        self.runs.lock().clear();
    }

    async fn run_loop(
        self: Arc<Self>,
        key: RunKey,
        project_dir: PathBuf,
        max_iterations: u32,
        mut control_rx: watch::Receiver<Control>,
        current_story_id: Arc<Mutex<Option<String>>>,
        iteration_slot: Arc<Mutex<u32>>,
        child_slot: Arc<Mutex<Option<Child>>>,
    ) {
        loop {
            // Pausing stops the *next* iteration from starting; the
            // current one (we aren't in one yet at this point) already
            // completed.
            while *control_rx.borrow() == Control::Pause {
                if control_rx.changed().await.is_err() {
                    return;
                }
            }
            if *control_rx.borrow() == Control::Stop {
                return;
            }

            let prd = match load_prd(&project_dir, &key.project, &key.prd_id).await {
                Ok(prd) => prd,
                Err(e) => {
                    warn!(error = %e, "failed to reload prd.json mid-run");
                    return;
                }
            };
            let Some(story) = prd.next_failing_story() else {
                let _ = self
                    .sink
                    .send(Response::RunProgress {
                        project: key.project.clone(),
                        prd_id: key.prd_id.clone(),
                        status: "completed".to_string(),
                        story_id: None,
                    })
                    .await;
                return;
            };
            let story_id = story.id.clone();

            if let Err(e) = self
                .run_one_iteration(&key, &project_dir, &story_id, &current_story_id, &child_slot)
                .await
            {
                warn!(error = %e, "iteration subprocess failed");
                return;
            }

            if *control_rx.borrow() == Control::Stop {
                return;
            }

            let prd = match load_prd(&project_dir, &key.project, &key.prd_id).await {
                Ok(prd) => prd,
                Err(e) => {
                    warn!(error = %e, "failed to reload prd.json after iteration");
                    return;
                }
            };
            if prd.all_passing() {
                let _ = self
                    .sink
                    .send(Response::RunProgress {
                        project: key.project.clone(),
                        prd_id: key.prd_id.clone(),
                        status: "completed".to_string(),
                        story_id: None,
                    })
                    .await;
                return;
            }

            let iteration = {
                let mut guard = iteration_slot.lock();
                *guard += 1;
                *guard
            };
            if iteration > max_iterations {
                let _ = self
                    .sink
                    .send(Response::RunProgress {
                        project: key.project.clone(),
                        prd_id: key.prd_id.clone(),
                        status: "max_iterations_reached".to_string(),
                        story_id: None,
                    })
                    .await;
                return;
            }
        }
    }

    async fn run_one_iteration(
        &self,
        key: &RunKey,
        project_dir: &PathBuf,
        story_id: &str,
        current_story_id: &Arc<Mutex<Option<String>>>,
        child_slot: &Arc<Mutex<Option<Child>>>,
    ) -> Result<(), RunError> {
        let mut child = self.spawner.spawn(project_dir, story_id).await?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *child_slot.lock() = Some(child);

        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                self.handle_output_line(key, &line, current_story_id).await;
            }
        }
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                self.handle_output_line(key, &line, current_story_id).await;
            }
        }

        // Taken out of its own `let` statement (rather than matched directly
        // off the lock expression) so the mutex guard drops before the
        // `.await` below instead of blocking `stop_run`'s concurrent kill.
        let child = child_slot.lock().take();
        if let Some(mut child) = child {
            let _ = child.wait().await;
        }
        Ok(())
    }

    async fn handle_output_line(
        &self,
        key: &RunKey,
        line: &str,
        current_story_id: &Arc<Mutex<Option<String>>>,
    ) {
        if line.contains(QUOTA_SENTINEL) {
            info!(prd_id = %key.prd_id, "quota sentinel observed, stopping all runs");
            self.stop_all_for_quota().await;
            return;
        }
        if let Some(story_id) = parse_status_marker(line) {
            *current_story_id.lock() = Some(story_id.to_string());
            let _ = self
                .sink
                .send(Response::RunProgress {
                    project: key.project.clone(),
                    prd_id: key.prd_id.clone(),
                    status: "story_started".to_string(),
                    story_id: Some(story_id.to_string()),
                })
                .await;
            return;
        }
        let _ = self
            .sink
            .send(Response::RunOutput {
                project: key.project.clone(),
                prd_id: key.prd_id.clone(),
                text: line.to_string(),
            })
            .await;
    }
}

async fn mark_in_progress(
    project_dir: &PathBuf,
    project: &str,
    prd_id: &str,
    story_id: &str,
) -> Result<(), RunError> {
    let mut prd = load_prd(project_dir, project, prd_id).await?;
    if let Some(story) = prd.story_mut(story_id) {
        if !story.passes {
            story.in_progress = Some(true);
        }
    }
    save_prd(project_dir, prd_id, &prd).await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use chief_core::{Prd, Story};
    use parking_lot::Mutex as PlMutex;

    use super::*;

    struct RecordingSink {
        sent: PlMutex<Vec<Response>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink { sent: PlMutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, response: Response) -> Result<(), chief_wire::sink::SinkClosed> {
            self.sent.lock().push(response);
            Ok(())
        }
    }

    /// Spawns `/bin/sh -c` scripts so a test controls exactly what the
    /// "iterator" prints without depending on a real agent binary.
    struct ScriptSpawner {
        script: String,
    }

    #[async_trait]
    impl IterationSpawner for ScriptSpawner {
        async fn spawn(&self, project_dir: &std::path::Path, _story_id: &str) -> std::io::Result<Child> {
            tokio::process::Command::new("/bin/sh")
                .arg("-c")
                .arg(&self.script)
                .current_dir(project_dir)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true)
                .spawn()
        }
    }

    fn story(id: &str, passes: bool) -> Story {
        Story { id: id.into(), title: id.into(), passes, in_progress: None, extra: HashMap::new() }
    }

    async fn write_prd(dir: &std::path::Path, prd_id: &str, prd: &Prd) {
        tokio::fs::create_dir_all(dir.join(".chief").join("prds").join(prd_id)).await.unwrap();
        save_prd(dir, prd_id, prd).await.unwrap();
    }

    #[tokio::test]
    async fn start_run_reaches_max_iterations_when_story_never_passes() {
        let dir = tempfile::tempdir().unwrap();
        let prd = Prd {
            project: "demo".into(),
            user_stories: vec![story("US-001", false)],
            extra: HashMap::new(),
        };
        write_prd(dir.path(), "prd-1", &prd).await;

        let sink = RecordingSink::new();
        // The script never flips `passes`, so the loop should exhaust
        // `max_iterations` and report that status rather than looping forever.
        let spawner: Arc<dyn IterationSpawner> = Arc::new(ScriptSpawner {
            script: "echo '<ralph-status>US-001</ralph-status>'".to_string(),
        });
        let manager = RunManager::new(sink.clone(), spawner);

        manager
            .start_run(dir.path().to_path_buf(), "demo".to_string(), "prd-1".to_string(), 2)
            .await
            .unwrap();

        for _ in 0..300 {
            if !manager.is_running("demo", "prd-1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!manager.is_running("demo", "prd-1"));

        let sent = sink.sent.lock();
        assert!(sent.iter().any(|r| matches!(r, Response::RunStarted { .. })));
        assert!(sent.iter().any(
            |r| matches!(r, Response::RunProgress { status, .. } if status == "max_iterations_reached")
        ));
        assert!(sent.iter().any(
            |r| matches!(r, Response::RunProgress { status, story_id: Some(s), .. }
                if status == "story_started" && s == "US-001")
        ));
    }

    #[tokio::test]
    async fn start_run_is_idempotent_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let prd = Prd {
            project: "demo".into(),
            user_stories: vec![story("US-001", false)],
            extra: HashMap::new(),
        };
        write_prd(dir.path(), "prd-1", &prd).await;

        let sink = RecordingSink::new();
        let spawner: Arc<dyn IterationSpawner> =
            Arc::new(ScriptSpawner { script: "sleep 30".to_string() });
        let manager = RunManager::new(sink, spawner);

        manager
            .start_run(dir.path().to_path_buf(), "demo".to_string(), "prd-1".to_string(), 5)
            .await
            .unwrap();
        assert!(manager.is_running("demo", "prd-1"));

        // Second call against the same key is a silent no-op.
        manager
            .start_run(dir.path().to_path_buf(), "demo".to_string(), "prd-1".to_string(), 5)
            .await
            .unwrap();

        manager.stop_run("demo", "prd-1").await;
        assert!(!manager.is_running("demo", "prd-1"));
    }

    #[tokio::test]
    async fn start_run_fails_fast_on_missing_prd() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let spawner: Arc<dyn IterationSpawner> =
            Arc::new(ScriptSpawner { script: "true".to_string() });
        let manager = RunManager::new(sink, spawner);

        let result = manager
            .start_run(dir.path().to_path_buf(), "demo".to_string(), "missing".to_string(), 5)
            .await;
        assert!(matches!(result, Err(RunError::PrdNotFound { .. })));
    }

    #[tokio::test]
    async fn pause_and_resume_are_noops_without_an_active_run() {
        let sink = RecordingSink::new();
        let spawner: Arc<dyn IterationSpawner> =
            Arc::new(ScriptSpawner { script: "true".to_string() });
        let manager = RunManager::new(sink, spawner);
        manager.pause_run("demo", "prd-1");
        manager.resume_run("demo", "prd-1");
    }

    #[tokio::test]
    async fn mark_in_progress_leaves_a_passing_story_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let prd = Prd {
            project: "demo".into(),
            user_stories: vec![story("US-001", true), story("US-002", false)],
            extra: HashMap::new(),
        };
        write_prd(dir.path(), "prd-1", &prd).await;

        mark_in_progress(&dir.path().to_path_buf(), "demo", "prd-1", "US-001").await.unwrap();
        mark_in_progress(&dir.path().to_path_buf(), "demo", "prd-1", "US-002").await.unwrap();

        let mut reloaded = load_prd(dir.path(), "demo", "prd-1").await.unwrap();
        assert_eq!(reloaded.story_mut("US-001").unwrap().in_progress, None);
        assert_eq!(reloaded.story_mut("US-002").unwrap().in_progress, Some(true));
    }
}
