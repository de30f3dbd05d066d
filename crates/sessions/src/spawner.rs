// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The interactive subprocess boundary (§4.E).
//!
//! `SessionSpawner` is the duck-typed capability (§9 Design Notes) the
//! Session Manager depends on instead of a concrete command line, mirroring
//! `chief_runs::IterationSpawner`'s split between subprocess lifecycle and
//! the Run Manager's control logic.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Child;

/// Which flavor of interactive session is being spawned (§4.B `new_prd` /
/// `refine_prd`). Only affects the argument vector and working directory —
/// the streaming/close protocol is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    New,
    Edit,
}

impl SessionMode {
    fn flag(self) -> &'static str {
        match self {
            SessionMode::New => "new",
            SessionMode::Edit => "edit",
        }
    }
}

#[async_trait]
pub trait SessionSpawner: Send + Sync {
    async fn spawn(&self, cwd: &Path, mode: SessionMode) -> std::io::Result<Child>;
}

/// Invokes a configured external executable with `--mode {new,edit}`,
/// wired for line-oriented stdin/stdout/stderr.
pub struct ExternalCommandSpawner {
    pub command: String,
}

#[async_trait]
impl SessionSpawner for ExternalCommandSpawner {
    async fn spawn(&self, cwd: &Path, mode: SessionMode) -> std::io::Result<Child> {
        tokio::process::Command::new(&self.command)
            .arg("--mode")
            .arg(mode.flag())
            .current_dir(cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}
