// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact Reader error taxonomy (§4.G).

use chief_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidSettings(String),

    #[error("no commit found for story {0}")]
    NoCommitForStory(String),
}

impl ArtifactError {
    /// Maps onto the wire-level error code every transport response
    /// carries (§4.G: "`error{FILESYSTEM_ERROR}` on invalid fields").
    pub fn code(&self) -> ErrorCode {
        match self {
            ArtifactError::Io(_) | ArtifactError::Json(_) | ArtifactError::InvalidSettings(_) => {
                ErrorCode::FilesystemError
            }
            ArtifactError::NoCommitForStory(_) => ErrorCode::FilesystemError,
        }
    }
}
