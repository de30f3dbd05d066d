// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Manager (§4.E): interactive subprocess sessions keyed by a
//! caller-supplied `session_id`.
//!
//! Each session splits into three concurrent tasks sharing one
//! `Arc<Mutex<Option<Child>>>` for the subprocess handle — a stdout
//! reader, a stderr reader, and a "reaper" that awaits the child's exit
//! and finalizes the session if nothing else has already done so. Exactly
//! one of `close_session` (caller-driven), the reaper (natural exit), or
//! the inactivity sweeper (timeout) removes a given session from the map
//! and sends its terminal envelope; the map entry's presence is the lock
//! that arbitrates between them.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chief_core::Clock;
use chief_wire::response::SessionSnapshot;
use chief_wire::{MessageSink, Response};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::SessionError;
use crate::quota::is_quota_exceeded;
use crate::spawner::{SessionMode, SessionSpawner};

/// `close_prd_session{save:true}` hard deadline before escalating to kill (§4.E).
const SAVE_DEADLINE: Duration = Duration::from_secs(120);
/// `close_prd_session{save:false}` deadline before force-kill (§4.E).
const DISCARD_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub timeout: Duration,
    pub check_interval: Duration,
    /// Elapsed-inactivity thresholds (ascending) at which a one-time
    /// `session_timeout_warning` fires. `minutes_remaining` in the emitted
    /// envelope is `timeout - threshold`.
    pub warning_thresholds: Vec<Duration>,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        SessionManagerConfig {
            timeout: Duration::from_secs(15 * 60),
            check_interval: Duration::from_secs(30),
            warning_thresholds: vec![Duration::from_secs(10 * 60)],
        }
    }
}

struct SessionHandle {
    project: String,
    started_at: chrono::DateTime<chrono::Utc>,
    stdin: Arc<AsyncMutex<Option<ChildStdin>>>,
    child: Arc<AsyncMutex<Option<Child>>>,
    last_active: Arc<Mutex<Instant>>,
    warned: Arc<Mutex<HashSet<usize>>>,
}

pub struct SessionManager<C: Clock> {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    sink: Arc<dyn MessageSink>,
    spawner: Arc<dyn SessionSpawner>,
    clock: C,
    config: SessionManagerConfig,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        spawner: Arc<dyn SessionSpawner>,
        clock: C,
        config: SessionManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(SessionManager { sessions: Mutex::new(HashMap::new()), sink, spawner, clock, config });
        let sweeper = manager.clone();
        tokio::spawn(async move { sweeper.sweep_loop().await });
        manager
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Derived projection of every live session (§3, §4.A reconnect
    /// snapshot).
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .lock()
            .iter()
            .map(|(session_id, handle)| SessionSnapshot {
                session_id: session_id.clone(),
                project: handle.project.clone(),
                started_at: handle.started_at,
            })
            .collect()
    }

    /// `new_prd` / `refine_prd` (§4.B, §4.E). `cwd` is the project directory
    /// for "new" mode and the PRD subdirectory for "edit" mode — the caller
    /// resolves that distinction before calling in.
    pub async fn spawn_session(
        self: &Arc<Self>,
        session_id: String,
        project: String,
        cwd: PathBuf,
        mode: SessionMode,
        opening_message: String,
    ) -> Result<(), SessionError> {
        if self.sessions.lock().contains_key(&session_id) {
            return Err(SessionError::Duplicate { session_id });
        }

        let mut child = self.spawner.spawn(&cwd, mode).await?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdin = Arc::new(AsyncMutex::new(stdin));
        let child = Arc::new(AsyncMutex::new(Some(child)));
        let last_active = Arc::new(Mutex::new(self.clock.now()));
        let warned = Arc::new(Mutex::new(HashSet::new()));

        let handle = SessionHandle {
            project: project.clone(),
            started_at: self.clock.utc_now(),
            stdin: stdin.clone(),
            child: child.clone(),
            last_active: last_active.clone(),
            warned,
        };
        self.sessions.lock().insert(session_id.clone(), handle);

        write_line(&stdin, &opening_message).await;

        if let Some(stdout) = stdout {
            let manager = self.clone();
            let session_id = session_id.clone();
            let project = project.clone();
            let last_active = last_active.clone();
            tokio::spawn(async move {
                manager.read_stdout(session_id, project, stdout, last_active).await;
            });
        }
        if let Some(stderr) = stderr {
            let manager = self.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                manager.read_stderr(session_id, stderr).await;
            });
        }

        let manager = self.clone();
        tokio::spawn(async move {
            manager.reap_on_exit(session_id, child).await;
        });

        Ok(())
    }

    /// `prd_message` (§4.B): write one line to the session's stdin.
    pub async fn send_message(&self, session_id: &str, message: &str) -> Result<(), SessionError> {
        let (stdin, last_active) = {
            let sessions = self.sessions.lock();
            let handle =
                sessions.get(session_id).ok_or_else(|| SessionError::NotFound { session_id: session_id.to_string() })?;
            (handle.stdin.clone(), handle.last_active.clone())
        };
        write_line(&stdin, message).await;
        *last_active.lock() = self.clock.now();
        Ok(())
    }

    /// `close_prd_session` (§4.E close semantics).
    pub async fn close_session(&self, session_id: &str, save: bool) -> Result<(), SessionError> {
        let handle = self
            .sessions
            .lock()
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound { session_id: session_id.to_string() })?;

        if save {
            handle.stdin.lock().await.take();
            wait_with_deadline(&handle.child, SAVE_DEADLINE).await;
        } else {
            kill_and_wait(&handle.child, DISCARD_DEADLINE).await;
        }

        let _ = self.sink.send(Response::PrdResponseComplete { session_id: session_id.to_string() }).await;
        Ok(())
    }

    /// Orchestrator shutdown (§4.H): kill every live session's subprocess
    /// without waiting for a graceful exit.
    pub async fn kill_all(&self) {
        let ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        for id in ids {
            // Extracted into its own binding (rather than an `if let` over
            // the lock expression directly) so the guard drops before the
            // `.await` below instead of being held across it.
            let handle = self.sessions.lock().remove(&id);
            if let Some(handle) = handle {
                kill_and_wait(&handle.child, DISCARD_DEADLINE).await;
            }
        }
    }

    async fn read_stdout(
        &self,
        session_id: String,
        project: String,
        stdout: tokio::process::ChildStdout,
        last_active: Arc<Mutex<Instant>>,
    ) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            *last_active.lock() = self.clock.now();
            let warned = self.sessions.lock().get(&session_id).map(|h| h.warned.clone());
            if let Some(warned) = warned {
                warned.lock().clear();
            }
            let _ = self
                .sink
                .send(Response::PrdOutput { session_id: session_id.clone(), project: project.clone(), text: line })
                .await;
        }
    }

    async fn read_stderr(&self, session_id: String, stderr: tokio::process::ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_quota_exceeded(&line) {
                let _ = self
                    .sink
                    .send(Response::error(chief_core::ErrorCode::QuotaExceeded, line, None))
                    .await;
                let _ = self.close_session(&session_id, false).await;
                return;
            }
            tracing::debug!(session_id = %session_id, stderr = %line, "session stderr");
        }
    }

    /// Detects subprocess exit that wasn't driven by `close_prd_session`
    /// (§4.E "Subprocess exit before close_prd_session ends the stream
    /// with prd_response_complete and removes the session").
    async fn reap_on_exit(&self, session_id: String, child: Arc<AsyncMutex<Option<Child>>>) {
        {
            let mut guard = child.lock().await;
            if let Some(child) = guard.as_mut() {
                let _ = child.wait().await;
            }
            *guard = None;
        }
        let removed = self.sessions.lock().remove(&session_id).is_some();
        if removed {
            let _ = self.sink.send(Response::PrdResponseComplete { session_id }).await;
        }
    }

    async fn sweep_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(&self) {
        let snapshot: Vec<(String, Duration, Vec<(usize, Duration)>)> = {
            let sessions = self.sessions.lock();
            let now = self.clock.now();
            sessions
                .iter()
                .map(|(id, handle)| {
                    let inactive = now.saturating_duration_since(*handle.last_active.lock());
                    let pending = self
                        .config
                        .warning_thresholds
                        .iter()
                        .enumerate()
                        .filter(|(idx, threshold)| inactive >= **threshold && !handle.warned.lock().contains(idx))
                        .map(|(idx, threshold)| (idx, *threshold))
                        .collect();
                    (id.clone(), inactive, pending)
                })
                .collect()
        };

        for (session_id, inactive, pending_warnings) in snapshot {
            if inactive >= self.config.timeout {
                let handle = self.sessions.lock().remove(&session_id);
                if let Some(handle) = handle {
                    kill_and_wait(&handle.child, DISCARD_DEADLINE).await;
                    let _ = self.sink.send(Response::SessionExpired { session_id }).await;
                }
                continue;
            }
            for (idx, threshold) in pending_warnings {
                let warned = match self.sessions.lock().get(&session_id) {
                    Some(handle) => handle.warned.clone(),
                    None => break,
                };
                if !warned.lock().insert(idx) {
                    continue;
                }
                let minutes_remaining = self.config.timeout.saturating_sub(threshold).as_secs() / 60;
                let _ = self
                    .sink
                    .send(Response::SessionTimeoutWarning { session_id: session_id.clone(), minutes_remaining })
                    .await;
            }
        }
    }
}

async fn write_line(stdin: &Arc<AsyncMutex<Option<ChildStdin>>>, line: &str) {
    let mut guard = stdin.lock().await;
    if let Some(stdin) = guard.as_mut() {
        if stdin.write_all(line.as_bytes()).await.is_ok() {
            let _ = stdin.write_all(b"\n").await;
            let _ = stdin.flush().await;
        }
    }
}

async fn wait_with_deadline(child: &Arc<AsyncMutex<Option<Child>>>, deadline: Duration) {
    let mut guard = child.lock().await;
    if let Some(c) = guard.as_mut() {
        if tokio::time::timeout(deadline, c.wait()).await.is_err() {
            let _ = c.start_kill();
            let _ = c.wait().await;
        }
    }
    *guard = None;
}

async fn kill_and_wait(child: &Arc<AsyncMutex<Option<Child>>>, deadline: Duration) {
    let mut guard = child.lock().await;
    if let Some(c) = guard.as_mut() {
        let _ = c.start_kill();
        if tokio::time::timeout(deadline, c.wait()).await.is_err() {
            warn!("session subprocess did not exit within the discard deadline");
        }
    }
    *guard = None;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chief_core::FakeClock;

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

    struct ScriptSpawner {
        script: String,
    }

    #[async_trait]
    impl SessionSpawner for ScriptSpawner {
        async fn spawn(&self, cwd: &std::path::Path, _mode: SessionMode) -> std::io::Result<Child> {
            tokio::process::Command::new("/bin/sh")
                .arg("-c")
                .arg(&self.script)
                .current_dir(cwd)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true)
                .spawn()
        }
    }

    fn manager_with(
        script: &str,
        config: SessionManagerConfig,
    ) -> (Arc<SessionManager<FakeClock>>, Arc<RecordingSink>, FakeClock) {
        let sink = RecordingSink::new();
        let spawner: Arc<dyn SessionSpawner> = Arc::new(ScriptSpawner { script: script.to_string() });
        let clock = FakeClock::new();
        let manager = SessionManager::new(sink.clone(), spawner, clock.clone(), config);
        (manager, sink, clock)
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..300 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn streams_stdout_as_prd_output() {
        let (manager, sink, _clock) = manager_with("cat", SessionManagerConfig::default());
        let dir = tempfile::tempdir().unwrap();
        manager
            .spawn_session(
                "s1".into(),
                "demo".into(),
                dir.path().to_path_buf(),
                SessionMode::New,
                "hello".into(),
            )
            .await
            .unwrap();

        wait_until(|| sink.sent.lock().iter().any(|r| matches!(r, Response::PrdOutput { .. }))).await;

        manager.send_message("s1", "world").await.unwrap();
        manager.close_session("s1", false).await.unwrap();
        assert!(!manager.is_active("s1"));

        let sent = sink.sent.lock();
        assert!(sent.iter().any(|r| matches!(r, Response::PrdOutput { text, .. } if text == "hello")));
        assert!(sent.iter().any(|r| matches!(r, Response::PrdResponseComplete { .. })));
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let (manager, _sink, _clock) = manager_with("sleep 30", SessionManagerConfig::default());
        let dir = tempfile::tempdir().unwrap();
        manager
            .spawn_session("dup".into(), "demo".into(), dir.path().to_path_buf(), SessionMode::New, "hi".into())
            .await
            .unwrap();

        let result = manager
            .spawn_session("dup".into(), "demo".into(), dir.path().to_path_buf(), SessionMode::New, "hi".into())
            .await;
        assert!(matches!(result, Err(SessionError::Duplicate { .. })));

        manager.close_session("dup", false).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_session_id_is_not_found() {
        let (manager, _sink, _clock) = manager_with("true", SessionManagerConfig::default());
        assert!(matches!(
            manager.send_message("ghost", "hi").await,
            Err(SessionError::NotFound { .. })
        ));
        assert!(matches!(
            manager.close_session("ghost", true).await,
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn quota_pattern_on_stderr_closes_the_session() {
        let (manager, sink, _clock) =
            manager_with("echo QUOTA_EXCEEDED 1>&2; sleep 30", SessionManagerConfig::default());
        let dir = tempfile::tempdir().unwrap();
        manager
            .spawn_session("s1".into(), "demo".into(), dir.path().to_path_buf(), SessionMode::New, "hi".into())
            .await
            .unwrap();

        wait_until(|| !manager.is_active("s1")).await;
        assert!(!manager.is_active("s1"));

        let sent = sink.sent.lock();
        assert!(sent.iter().any(|r| matches!(
            r,
            Response::Error { code: chief_core::ErrorCode::QuotaExceeded, .. }
        )));
        assert!(sent.iter().any(|r| matches!(r, Response::PrdResponseComplete { .. })));
    }

    #[tokio::test]
    async fn sweep_expires_inactive_sessions_and_warns_once() {
        let config = SessionManagerConfig {
            timeout: Duration::from_secs(900),
            check_interval: Duration::from_secs(30),
            warning_thresholds: vec![Duration::from_secs(600)],
        };
        let (manager, sink, clock) = manager_with("sleep 30", config);
        let dir = tempfile::tempdir().unwrap();
        manager
            .spawn_session("s1".into(), "demo".into(), dir.path().to_path_buf(), SessionMode::New, "hi".into())
            .await
            .unwrap();

        clock.advance(Duration::from_secs(650));
        manager.sweep_once().await;
        {
            let sent = sink.sent.lock();
            assert_eq!(
                sent.iter().filter(|r| matches!(r, Response::SessionTimeoutWarning { .. })).count(),
                1
            );
        }

        // A second sweep at the same elapsed time must not re-warn.
        manager.sweep_once().await;
        {
            let sent = sink.sent.lock();
            assert_eq!(
                sent.iter().filter(|r| matches!(r, Response::SessionTimeoutWarning { .. })).count(),
                1
            );
        }

        clock.advance(Duration::from_secs(300));
        manager.sweep_once().await;
        assert!(!manager.is_active("s1"));
        let sent = sink.sent.lock();
        assert!(sent.iter().any(|r| matches!(r, Response::SessionExpired { .. })));
    }
}
