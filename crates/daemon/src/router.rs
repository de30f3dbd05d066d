// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command Router (§4.B): rate-limit, dispatch to the owning subsystem,
//! marshal the reply envelope. Depends only on `ProjectFinder`/
//! `MessageSink` and the subsystem managers' own public APIs — it never
//! reaches past them into private state (§9 Design Notes).

use std::path::PathBuf;
use std::sync::Arc;

use chief_artifacts::ArtifactError;
use chief_core::{Clock, ErrorCode, ProjectFinder, ProjectSummary};
use chief_runs::RunManager;
use chief_sessions::{SessionError, SessionManager, SessionMode};
use chief_transport::RateLimiter;
use chief_wire::response::SettingsPatch;
use chief_wire::{Command, Inbound, MessageSink, Response};
use chief_workspace::{FileWatcher, Scanner};
use tracing::{info, warn};

use crate::clone;

pub struct Router<C: Clock> {
    workspace_root: PathBuf,
    scanner: Arc<Scanner>,
    watcher: Arc<FileWatcher>,
    sessions: Arc<SessionManager<C>>,
    runs: Arc<RunManager>,
    rate_limiter: Arc<RateLimiter<C>>,
    sink: Arc<dyn MessageSink>,
}

impl<C: Clock> Router<C> {
    pub fn new(
        workspace_root: PathBuf,
        scanner: Arc<Scanner>,
        watcher: Arc<FileWatcher>,
        sessions: Arc<SessionManager<C>>,
        runs: Arc<RunManager>,
        rate_limiter: Arc<RateLimiter<C>>,
        sink: Arc<dyn MessageSink>,
    ) -> Arc<Self> {
        Arc::new(Router { workspace_root, scanner, watcher, sessions, runs, rate_limiter, sink })
    }

    pub async fn handle(&self, inbound: Inbound) {
        let request_id = inbound.id;
        let command = inbound.command;

        if matches!(command, Command::Unknown) {
            info!("dropping unrecognized command envelope");
            return;
        }

        if !command.is_ping() && !self.rate_limiter.admit(command.is_expensive()) {
            let _ = self
                .sink
                .send(Response::error(ErrorCode::RateLimited, "rate limit exceeded", Some(request_id)))
                .await;
            return;
        }

        self.dispatch(command, request_id).await;
    }

    async fn dispatch(&self, command: Command, request_id: String) {
        match command {
            Command::Ping => {
                let _ = self.sink.send(Response::Pong).await;
            }
            Command::ListProjects => {
                let _ = self.sink.send(Response::ProjectList { projects: self.scanner.list_projects() }).await;
            }
            Command::GetProject { project } => self.get_project(project, request_id).await,
            Command::GetPrd { project, prd_id } => self.get_prd(project, prd_id, request_id).await,
            Command::NewPrd { project, session_id, message } => {
                self.new_prd(project, session_id, message, request_id).await
            }
            Command::RefinePrd { project, prd_id, session_id, message } => {
                self.refine_prd(project, prd_id, session_id, message, request_id).await
            }
            Command::PrdMessage { session_id, message } => {
                self.prd_message(session_id, message, request_id).await
            }
            Command::ClosePrdSession { session_id, save } => {
                self.close_prd_session(session_id, save, request_id).await
            }
            Command::StartRun { project, prd_id } => self.start_run(project, prd_id, request_id).await,
            Command::PauseRun { project, prd_id } => self.pause_run(project, prd_id).await,
            Command::ResumeRun { project, prd_id } => self.resume_run(project, prd_id).await,
            Command::StopRun { project, prd_id } => self.stop_run(project, prd_id).await,
            Command::GetDiff { project, prd_id, story_id } => {
                self.get_diff(project, prd_id, story_id, request_id).await
            }
            Command::GetLogs { project, prd_id, story_id } => {
                self.get_logs(project, prd_id, story_id, request_id).await
            }
            Command::GetSettings { project } => self.get_settings(project, request_id).await,
            Command::UpdateSettings {
                project,
                max_iterations,
                auto_commit,
                commit_prefix,
                claude_model,
                test_command,
            } => {
                let patch =
                    SettingsPatch { max_iterations, auto_commit, commit_prefix, claude_model, test_command };
                self.update_settings(project, patch, request_id).await
            }
            Command::CloneRepo { url, directory_name } => {
                self.clone_repo(url, directory_name, request_id).await
            }
            Command::CreateProject { name, git_init } => self.create_project(name, git_init, request_id).await,
            Command::Unknown => unreachable!("filtered out in handle()"),
        }
    }

    async fn find_project(&self, name: &str, request_id: &str) -> Option<ProjectSummary> {
        match self.scanner.find_project(name) {
            Some(project) => Some(project),
            None => {
                let _ = self
                    .sink
                    .send(Response::error(
                        ErrorCode::ProjectNotFound,
                        format!("project {name} not found"),
                        Some(request_id.to_string()),
                    ))
                    .await;
                None
            }
        }
    }

    async fn get_project(&self, project: String, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        if let Err(e) = self.watcher.activate(&project) {
            warn!(error = %e, project = %project, "failed to activate file watcher");
        }
        let _ = self.sink.send(Response::ProjectState { project: summary }).await;
    }

    async fn get_prd(&self, project: String, prd_id: String, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        let prd_dir = summary.path.join(".chief").join("prds").join(&prd_id);
        let prd = match chief_artifacts::read_json(prd_dir.join("prd.json")).await {
            Ok(Some(prd)) => prd,
            Ok(None) => {
                let _ = self
                    .sink
                    .send(Response::error(
                        ErrorCode::PrdNotFound,
                        format!("no prd {prd_id} in {project}"),
                        Some(request_id),
                    ))
                    .await;
                return;
            }
            Err(e) => {
                let _ = self
                    .sink
                    .send(Response::error(ErrorCode::FilesystemError, e.to_string(), Some(request_id)))
                    .await;
                return;
            }
        };
        let markdown = tokio::fs::read_to_string(prd_dir.join("prd.md")).await.unwrap_or_default();
        let _ = self.sink.send(Response::PrdContent { project, prd_id, markdown, prd }).await;
    }

    async fn new_prd(&self, project: String, session_id: String, message: String, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        self.spawn_session(session_id, project, summary.path, SessionMode::New, message, request_id).await;
    }

    async fn refine_prd(
        &self,
        project: String,
        prd_id: String,
        session_id: String,
        message: String,
        request_id: String,
    ) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        let cwd = summary.path.join(".chief").join("prds").join(prd_id);
        self.spawn_session(session_id, project, cwd, SessionMode::Edit, message, request_id).await;
    }

    async fn spawn_session(
        &self,
        session_id: String,
        project: String,
        cwd: PathBuf,
        mode: SessionMode,
        message: String,
        request_id: String,
    ) {
        if let Err(e) = self.sessions.spawn_session(session_id, project, cwd, mode, message).await {
            self.send_session_error(e, request_id).await;
        }
    }

    async fn prd_message(&self, session_id: String, message: String, request_id: String) {
        if let Err(e) = self.sessions.send_message(&session_id, &message).await {
            self.send_session_error(e, request_id).await;
        }
    }

    async fn close_prd_session(&self, session_id: String, save: bool, request_id: String) {
        if let Err(e) = self.sessions.close_session(&session_id, save).await {
            self.send_session_error(e, request_id).await;
        }
    }

    async fn send_session_error(&self, error: SessionError, request_id: String) {
        let _ = self.sink.send(Response::error(error.code(), error.to_string(), Some(request_id))).await;
    }

    async fn start_run(&self, project: String, prd_id: String, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        let settings = match chief_artifacts::read_settings(&summary.path, &project).await {
            Ok(settings) => settings,
            Err(e) => {
                let _ = self.sink.send(Response::error(e.code(), e.to_string(), Some(request_id))).await;
                return;
            }
        };
        let max_iterations = settings.max_iterations.max(1) as u32;
        if let Err(e) = self.runs.start_run(summary.path, project, prd_id, max_iterations).await {
            let _ = self.sink.send(Response::error(e.code(), e.to_string(), Some(request_id))).await;
        }
    }

    async fn pause_run(&self, project: String, prd_id: String) {
        self.runs.pause_run(&project, &prd_id);
        let _ = self
            .sink
            .send(Response::RunProgress { project, prd_id, status: "paused".to_string(), story_id: None })
            .await;
    }

    async fn resume_run(&self, project: String, prd_id: String) {
        self.runs.resume_run(&project, &prd_id);
        let _ = self
            .sink
            .send(Response::RunProgress { project, prd_id, status: "running".to_string(), story_id: None })
            .await;
    }

    async fn stop_run(&self, project: String, prd_id: String) {
        self.runs.stop_run(&project, &prd_id).await;
        let _ = self
            .sink
            .send(Response::RunProgress { project, prd_id, status: "stopped".to_string(), story_id: None })
            .await;
    }

    async fn get_diff(&self, project: String, prd_id: String, story_id: String, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        match chief_artifacts::get_story_diff(&summary.path, &story_id).await {
            Ok(diff) => {
                let _ = self
                    .sink
                    .send(Response::Diff {
                        project,
                        prd_id,
                        story_id,
                        files: diff.changed_files,
                        diff_text: diff.diff_text,
                    })
                    .await;
            }
            Err(e) => self.send_artifact_error(e, request_id).await,
        }
    }

    async fn get_logs(&self, project: String, prd_id: String, story_id: Option<String>, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        match chief_artifacts::read_logs(&summary.path, &prd_id, story_id.as_deref()).await {
            Ok(entries) => {
                let _ = self.sink.send(Response::Logs { project, prd_id, entries }).await;
            }
            Err(e) => self.send_artifact_error(e, request_id).await,
        }
    }

    async fn get_settings(&self, project: String, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        match chief_artifacts::read_settings(&summary.path, &project).await {
            Ok(settings) => {
                let _ = self.sink.send(Response::Settings { settings }).await;
            }
            Err(e) => self.send_artifact_error(e, request_id).await,
        }
    }

    async fn update_settings(&self, project: String, patch: SettingsPatch, request_id: String) {
        let Some(summary) = self.find_project(&project, &request_id).await else { return };
        match chief_artifacts::update_settings(&summary.path, &project, patch).await {
            Ok(settings) => {
                let _ = self.sink.send(Response::Settings { settings }).await;
            }
            Err(e) => self.send_artifact_error(e, request_id).await,
        }
    }

    async fn send_artifact_error(&self, error: ArtifactError, request_id: String) {
        let _ = self.sink.send(Response::error(error.code(), error.to_string(), Some(request_id))).await;
    }

    async fn clone_repo(&self, url: String, directory_name: Option<String>, request_id: String) {
        let name = directory_name.unwrap_or_else(|| clone::derive_directory_name(&url));
        if clone::is_unsafe_directory_name(&name) {
            let _ = self
                .sink
                .send(Response::error(
                    ErrorCode::CloneFailed,
                    format!("invalid directory name {name}"),
                    Some(request_id),
                ))
                .await;
            return;
        }
        let target_dir = self.workspace_root.join(&name);
        if target_dir.exists() {
            let _ = self
                .sink
                .send(Response::error(
                    ErrorCode::CloneFailed,
                    format!("{} already exists", target_dir.display()),
                    Some(request_id),
                ))
                .await;
            return;
        }

        let scanner = self.scanner.clone();
        let sink = self.sink.clone();
        let workspace_root = self.workspace_root.clone();
        tokio::spawn(async move {
            clone::run_clone(workspace_root, target_dir, sink, url).await;
            scanner.scan_and_update().await;
        });
    }

    async fn create_project(&self, name: String, git_init: bool, request_id: String) {
        if clone::is_unsafe_directory_name(&name) {
            let _ = self
                .sink
                .send(Response::error(
                    ErrorCode::FilesystemError,
                    format!("invalid project name {name}"),
                    Some(request_id),
                ))
                .await;
            return;
        }
        let path = self.workspace_root.join(&name);
        if let Err(e) = tokio::fs::create_dir_all(&path).await {
            let _ = self
                .sink
                .send(Response::error(ErrorCode::FilesystemError, e.to_string(), Some(request_id)))
                .await;
            return;
        }

        if git_init {
            let status = tokio::process::Command::new("git").arg("-C").arg(&path).arg("init").status().await;
            if !matches!(status, Ok(s) if s.success()) {
                let _ = self
                    .sink
                    .send(Response::error(
                        ErrorCode::FilesystemError,
                        "git init failed".to_string(),
                        Some(request_id),
                    ))
                    .await;
                return;
            }
        }

        self.scanner.scan_and_update().await;
        if git_init {
            if let Some(summary) = self.scanner.rescan_one(&name).await {
                let _ = self.sink.send(Response::ProjectState { project: summary }).await;
            }
        } else {
            let _ = self.sink.send(Response::ProjectList { projects: self.scanner.list_projects() }).await;
        }
    }
}
