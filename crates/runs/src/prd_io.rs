// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loading and atomically persisting `prd.json` (§3, §4.F).

use std::path::{Path, PathBuf};

use chief_artifacts::{read_json, write_json_atomic};
use chief_core::Prd;

use crate::error::RunError;

pub fn prd_json_path(project_dir: &Path, prd_id: &str) -> PathBuf {
    project_dir.join(".chief").join("prds").join(prd_id).join("prd.json")
}

pub async fn load_prd(project_dir: &Path, project: &str, prd_id: &str) -> Result<Prd, RunError> {
    read_json::<Prd>(prd_json_path(project_dir, prd_id))
        .await?
        .ok_or_else(|| RunError::PrdNotFound { project: project.to_string(), prd_id: prd_id.to_string() })
}

pub async fn save_prd(project_dir: &Path, prd_id: &str, prd: &Prd) -> Result<(), RunError> {
    write_json_atomic(prd_json_path(project_dir, prd_id), prd.clone()).await?;
    Ok(())
}
