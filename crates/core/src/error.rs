// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing error taxonomy (§7).
//!
//! These codes are the only thing that round-trips in an outbound `error`
//! envelope; internal error types (`TransportError`, `ArtifactError`, ...)
//! carry richer context for logs and are mapped down to one of these at
//! the router boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ProjectNotFound,
    PrdNotFound,
    SessionNotFound,
    ClaudeError,
    FilesystemError,
    CloneFailed,
    RateLimited,
    QuotaExceeded,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorCode::PrdNotFound => "PRD_NOT_FOUND",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::ClaudeError => "CLAUDE_ERROR",
            ErrorCode::FilesystemError => "FILESYSTEM_ERROR",
            ErrorCode::CloneFailed => "CLONE_FAILED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
