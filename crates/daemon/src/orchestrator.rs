// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator (§4.H): wires A-G, owns process lifetime, performs startup
//! and shutdown in the prescribed order under a global 10s shutdown cap.

use std::sync::Arc;
use std::time::Duration;

use chief_core::{Clock, CredentialsProvider, ProjectFinder};
use chief_runs::RunManager;
use chief_sessions::{ExternalCommandSpawner as SessionSpawnerImpl, SessionManager, SessionManagerConfig};
use chief_transport::{OnReconnect, Transport};
use chief_wire::{Inbound, Response};
use chief_workspace::{FileWatcher, Scanner, DEFAULT_SCAN_INTERVAL};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::router::Router;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Bridges `Transport`'s `OnReconnect` hook back to the Orchestrator
/// without exposing Transport to the managers it re-announces state from
/// (§9 Design Notes: "cyclic references"). `orchestrator` starts `None`
/// because the hook is wired in before the `Arc<Orchestrator>` it closes
/// over exists; `Orchestrator::new` fills it in once construction
/// completes.
struct SnapshotPublisher<C: Clock> {
    orchestrator: Arc<Mutex<Option<Arc<Orchestrator<C>>>>>,
}

#[async_trait::async_trait]
impl<C: Clock> OnReconnect for SnapshotPublisher<C> {
    async fn on_subscribed(&self) {
        let orchestrator = self.orchestrator.lock().clone();
        if let Some(orchestrator) = orchestrator {
            orchestrator.publish_state_snapshot().await;
        }
    }
}

pub struct Orchestrator<C: Clock> {
    config: Config,
    scanner: Arc<Scanner>,
    watcher: Arc<FileWatcher>,
    sessions: Arc<SessionManager<C>>,
    runs: Arc<RunManager>,
    transport: Arc<Transport<C>>,
    cancel: CancellationToken,
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(config: Config, credentials: Arc<dyn CredentialsProvider>, clock: C) -> Arc<Self> {
        let cancel = CancellationToken::new();

        // Transport constructed first so its `sink()` is available to wire
        // into the Scanner/Session/Run managers, but `run()` (the actual
        // connect) is not started until `serve()` (§4.H start ordering).
        let reconnect_state: Arc<Mutex<Option<Arc<Self>>>> = Arc::new(Mutex::new(None));
        let reconnect_hook: Arc<dyn OnReconnect> =
            Arc::new(SnapshotPublisher { orchestrator: reconnect_state.clone() });

        let transport = Arc::new(Transport::new(
            config.server_url.clone(),
            credentials,
            clock.clone(),
            config.chief_version.clone(),
            config.device_name.clone(),
            reconnect_hook,
        ));
        let sink = transport.sink();

        let scanner = Scanner::new(config.workspace.clone(), sink.clone());
        let watcher = FileWatcher::new(scanner.clone(), sink.clone());
        let sessions = SessionManager::new(
            sink.clone(),
            Arc::new(SessionSpawnerImpl { command: crate::config::session_command() }),
            clock.clone(),
            SessionManagerConfig::default(),
        );
        let runs = RunManager::new(sink.clone(), Arc::new(chief_runs::ExternalCommandSpawner {
            command: crate::config::run_command(),
        }));

        let orchestrator = Arc::new(Orchestrator { config, scanner, watcher, sessions, runs, transport, cancel });
        *reconnect_state.lock() = Some(orchestrator.clone());
        orchestrator
    }

    async fn publish_state_snapshot(&self) {
        let projects = self.scanner.list_projects();
        let sessions = self.sessions.snapshots();
        let runs = self.runs.snapshots();
        let _ = self.transport.sink().send(Response::StateSnapshot { projects, sessions, runs }).await;
    }

    /// Runs the daemon until cancelled (SIGINT/SIGTERM or a terminal
    /// transport error), then performs shutdown ordering. Returns the
    /// terminal transport error, if any.
    pub async fn serve(self: &Arc<Self>) -> Result<(), chief_transport::TransportError> {
        self.scanner.initial_scan().await;

        let rate_limiter = self.transport.rate_limiter.clone();
        let router = Router::new(
            self.config.workspace.clone(),
            self.scanner.clone(),
            self.watcher.clone(),
            self.sessions.clone(),
            self.runs.clone(),
            rate_limiter,
            self.transport.sink(),
        );

        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<serde_json::Value>();

        let transport = self.transport.clone();
        let cancel = self.cancel.clone();
        let transport_task = tokio::spawn(async move { transport.run(commands_tx, cancel).await });

        self.scanner.spawn_periodic(DEFAULT_SCAN_INTERVAL);
        self.spawn_signal_handler();

        let dispatch_cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(value) = commands_rx.recv() => {
                        match serde_json::from_value::<Inbound>(value) {
                            Ok(inbound) => router.handle(inbound).await,
                            Err(e) => warn!(error = %e, "dropping malformed inbound envelope"),
                        }
                    }
                    _ = dispatch_cancel.cancelled() => break,
                    else => break,
                }
            }
        });

        let result = transport_task.await.unwrap_or(Ok(()));
        self.cancel.cancel();
        self.shutdown().await;
        result
    }

    fn spawn_signal_handler(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
            cancel.cancel();
        });
    }

    /// Reverse of start ordering, capped globally at 10s (§4.H, §5).
    async fn shutdown(&self) {
        info!("shutdown starting");
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DEADLINE;

        let _ = tokio::time::timeout_at(deadline, self.runs.shutdown()).await;
        let _ = tokio::time::timeout_at(deadline, self.sessions.kill_all()).await;
        self.watcher.close();
        let _ = tokio::time::timeout_at(deadline, self.transport.shutdown()).await;
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chief_core::{Credentials, FakeClock};

    struct FixedCredentials;
    impl CredentialsProvider for FixedCredentials {
        fn current(&self) -> Credentials {
            Credentials {
                access_token: "tok".into(),
                refresh_token: "ref".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                device_name: "dev".into(),
                user: "user".into(),
            }
        }
        fn near_expiry(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn new_orchestrator_starts_with_an_empty_project_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            workspace: dir.path().to_path_buf(),
            device_name: "test-device".into(),
            log_file: None,
            server_url: "http://127.0.0.1:1".into(),
            chief_version: "0.1.0".into(),
        };
        let orchestrator = Orchestrator::new(config, Arc::new(FixedCredentials), FakeClock::new());
        assert!(orchestrator.scanner.list_projects().is_empty());
    }
}
