// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound response and broadcast payloads (§4.B, §4.C/D/E/F state pushes).

use chief_core::{ErrorCode, ProjectSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsView {
    pub project: String,
    pub max_iterations: i64,
    pub auto_commit: bool,
    pub commit_prefix: String,
    pub claude_model: String,
    pub test_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub iteration: u32,
    pub timestamp: String,
    pub story_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,

    ProjectList {
        projects: Vec<ProjectSummary>,
    },
    ProjectState {
        project: ProjectSummary,
    },

    PrdContent {
        project: String,
        prd_id: String,
        markdown: String,
        prd: chief_core::Prd,
    },

    PrdOutput {
        session_id: String,
        project: String,
        text: String,
    },
    PrdResponseComplete {
        session_id: String,
    },

    RunStarted {
        project: String,
        prd_id: String,
    },
    RunProgress {
        project: String,
        prd_id: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        story_id: Option<String>,
    },
    RunOutput {
        project: String,
        prd_id: String,
        text: String,
    },

    Diff {
        project: String,
        prd_id: String,
        story_id: String,
        files: Vec<String>,
        diff_text: String,
    },

    Logs {
        project: String,
        prd_id: String,
        entries: Vec<LogEntry>,
    },

    Settings {
        settings: SettingsView,
    },

    CloneProgress {
        url: String,
        percent: u8,
    },
    CloneComplete {
        url: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    SessionExpired {
        session_id: String,
    },
    SessionTimeoutWarning {
        session_id: String,
        minutes_remaining: u64,
    },

    /// Pushed once per reconnect, before any other post-reconnect envelope
    /// (§4.A, §8 Invariants). `runs`/`sessions`/`projects` are always
    /// present JSON arrays, never absent/null, even when empty.
    StateSnapshot {
        projects: Vec<ProjectSummary>,
        sessions: Vec<SessionSnapshot>,
        runs: Vec<RunSnapshot>,
    },

    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub project: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSnapshot {
    pub project: String,
    pub prd_id: String,
    pub state: String,
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_story_id: Option<String>,
}

impl Response {
    pub fn error(code: ErrorCode, message: impl Into<String>, request_id: Option<String>) -> Self {
        Response::Error { code, message: message.into(), request_id }
    }
}

/// Shallow-merge request used by `UpdateSettings`: only fields present in
/// the request overwrite the on-disk value (§4.G).
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub max_iterations: Option<i64>,
    pub auto_commit: Option<bool>,
    pub commit_prefix: Option<String>,
    pub claude_model: Option<String>,
    pub test_command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_snapshot_arrays_never_null() {
        let snap = Response::StateSnapshot { projects: vec![], sessions: vec![], runs: vec![] };
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json["projects"].is_array());
        assert!(json["sessions"].is_array());
        assert!(json["runs"].is_array());
    }
}
