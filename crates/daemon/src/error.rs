// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon error taxonomy (§6 "Exit codes").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("workspace root {0} is not a directory")]
    InvalidWorkspace(std::path::PathBuf),

    #[error("no server URL: pass --server-url/--base-url or set CHIEF_SERVER_URL")]
    MissingServerUrl,

    #[error("no credentials file at {0}")]
    MissingCredentials(std::path::PathBuf),

    #[error("malformed credentials file: {0}")]
    MalformedCredentials(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] chief_transport::TransportError),
}

impl DaemonError {
    /// `0` on clean shutdown; non-zero on workspace validation error,
    /// missing credentials, auth failure, or incompatible protocol (§6).
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::InvalidWorkspace(_) | DaemonError::MissingServerUrl => 2,
            DaemonError::MissingCredentials(_) | DaemonError::MalformedCredentials(_) => 3,
            DaemonError::Transport(e) if matches!(e, chief_transport::TransportError::AuthFailed(_)) => 4,
            DaemonError::Transport(e) if matches!(e, chief_transport::TransportError::Incompatible(_)) => 5,
            DaemonError::Transport(_) => 1,
        }
    }
}
