// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound command envelope bodies (§4.B). Unknown `type` values are not a
//! deserialization error at the transport boundary — the event-plane
//! reader decodes into `serde_json::Value` first and only then attempts
//! this enum, logging and dropping on mismatch (§3, §4.B "Unknown types").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Ping,
    ListProjects,
    GetProject {
        project: String,
    },
    GetPrd {
        project: String,
        prd_id: String,
    },
    NewPrd {
        project: String,
        session_id: String,
        message: String,
    },
    RefinePrd {
        project: String,
        prd_id: String,
        session_id: String,
        message: String,
    },
    PrdMessage {
        session_id: String,
        message: String,
    },
    ClosePrdSession {
        session_id: String,
        save: bool,
    },
    StartRun {
        project: String,
        prd_id: String,
    },
    PauseRun {
        project: String,
        prd_id: String,
    },
    ResumeRun {
        project: String,
        prd_id: String,
    },
    StopRun {
        project: String,
        prd_id: String,
    },
    GetDiff {
        project: String,
        prd_id: String,
        story_id: String,
    },
    GetLogs {
        project: String,
        prd_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        story_id: Option<String>,
    },
    GetSettings {
        project: String,
    },
    UpdateSettings {
        project: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_iterations: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_commit: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        commit_prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        claude_model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test_command: Option<String>,
    },
    CloneRepo {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        directory_name: Option<String>,
    },
    CreateProject {
        name: String,
        #[serde(default)]
        git_init: bool,
    },

    /// Anything this router doesn't recognize — captured so callers can log
    /// and drop rather than fail the whole envelope decode (§4.B).
    #[serde(other)]
    Unknown,
}

/// Commands subject to the "expensive" rate-limit bucket (§4.A).
pub const EXPENSIVE_COMMANDS: &[&str] =
    &["start_run", "new_prd", "refine_prd", "clone_repo", "create_project"];

impl Command {
    /// The wire `type` string, used for rate-limiting and logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::ListProjects => "list_projects",
            Command::GetProject { .. } => "get_project",
            Command::GetPrd { .. } => "get_prd",
            Command::NewPrd { .. } => "new_prd",
            Command::RefinePrd { .. } => "refine_prd",
            Command::PrdMessage { .. } => "prd_message",
            Command::ClosePrdSession { .. } => "close_prd_session",
            Command::StartRun { .. } => "start_run",
            Command::PauseRun { .. } => "pause_run",
            Command::ResumeRun { .. } => "resume_run",
            Command::StopRun { .. } => "stop_run",
            Command::GetDiff { .. } => "get_diff",
            Command::GetLogs { .. } => "get_logs",
            Command::GetSettings { .. } => "get_settings",
            Command::UpdateSettings { .. } => "update_settings",
            Command::CloneRepo { .. } => "clone_repo",
            Command::CreateProject { .. } => "create_project",
            Command::Unknown => "unknown",
        }
    }

    /// True for `ping`, which is exempt from all rate limiting (§4.A).
    pub fn is_ping(&self) -> bool {
        matches!(self, Command::Ping)
    }

    /// True for commands drawn from the small "expensive" token bucket.
    pub fn is_expensive(&self) -> bool {
        EXPENSIVE_COMMANDS.contains(&self.type_name())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_decodes_to_unknown_variant() {
        let raw = serde_json::json!({"type": "future_command", "foo": "bar"});
        let cmd: Command = serde_json::from_value(raw).unwrap();
        assert_eq!(cmd, Command::Unknown);
    }

    #[test]
    fn expensive_bucket_membership() {
        assert!(Command::StartRun { project: "p".into(), prd_id: "x".into() }.is_expensive());
        assert!(!Command::Ping.is_expensive());
        assert!(Command::Ping.is_ping());
    }
}
