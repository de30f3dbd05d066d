// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File Watcher error taxonomy (§4.D).

use chief_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("project {name} not found")]
    ProjectNotFound { name: String },

    #[error("failed to watch project directory: {0}")]
    Watch(#[from] notify::Error),
}

impl WorkspaceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkspaceError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            WorkspaceError::Watch(_) => ErrorCode::FilesystemError,
        }
    }
}
