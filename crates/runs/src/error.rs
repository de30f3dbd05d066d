// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run Manager error taxonomy (§4.F).

use chief_artifacts::ArtifactError;
use chief_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no PRD {prd_id} in project {project}")]
    PrdNotFound { project: String, prd_id: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("failed to spawn run subprocess: {0}")]
    Spawn(#[from] std::io::Error),
}

impl RunError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RunError::PrdNotFound { .. } => ErrorCode::PrdNotFound,
            RunError::Artifact(e) => e.code(),
            RunError::Spawn(_) => ErrorCode::ClaudeError,
        }
    }
}
