// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Manager error taxonomy (§4.E).

use chief_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {session_id} not found")]
    NotFound { session_id: String },

    #[error("session id {session_id} is already in use")]
    Duplicate { session_id: String },

    #[error("failed to spawn session subprocess: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotFound { .. } => ErrorCode::SessionNotFound,
            // No dedicated wire code for this; it's a setup-time failure
            // like a spawn failure, so it maps the same way (§7).
            SessionError::Duplicate { .. } => ErrorCode::ClaudeError,
            SessionError::Spawn(_) => ErrorCode::ClaudeError,
        }
    }
}
