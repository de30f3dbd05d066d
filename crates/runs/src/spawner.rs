// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The iterator subprocess boundary (§1 Non-goals: "the subprocess agents
//! themselves ... the core only owns spawn/stdin/stdout/stderr/wait/kill").
//!
//! `IterationSpawner` is the duck-typed capability (§9 Design Notes) the
//! Run Manager depends on instead of a concrete command line, so a test
//! can substitute a fake binary without touching the manager.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Child;

#[async_trait]
pub trait IterationSpawner: Send + Sync {
    async fn spawn(&self, project_dir: &Path, story_id: &str) -> std::io::Result<Child>;
}

/// Invokes a configured external executable by path, passing the story id
/// as its sole argument and the project directory as its cwd.
pub struct ExternalCommandSpawner {
    pub command: String,
}

#[async_trait]
impl IterationSpawner for ExternalCommandSpawner {
    async fn spawn(&self, project_dir: &Path, story_id: &str) -> std::io::Result<Child> {
        tokio::process::Command::new(&self.command)
            .arg("--story")
            .arg(story_id)
            .current_dir(project_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}
