// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project settings (§4.G): `<project>/.chief/config.json`, shallow
//! merge on update, atomic write.
//!
//! [`ProjectSettings`] is the on-disk shape: exactly the 5 fields §4.G
//! documents, with no `project` key, so a hand-written `config.json`
//! listing just those defaults deserializes cleanly. The wire
//! reply embeds the project name alongside it as [`SettingsView`]
//! ([`chief_wire::response`]) without that name ever touching disk.

use std::path::Path;

use chief_wire::response::{SettingsPatch, SettingsView};
use serde::{Deserialize, Serialize};

use crate::atomic::{read_json, write_json_atomic};
use crate::error::ArtifactError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSettings {
    pub max_iterations: i64,
    pub auto_commit: bool,
    pub commit_prefix: String,
    pub claude_model: String,
    pub test_command: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        ProjectSettings {
            max_iterations: 5,
            auto_commit: true,
            commit_prefix: String::new(),
            claude_model: String::new(),
            test_command: String::new(),
        }
    }
}

impl ProjectSettings {
    fn into_view(self, project: &str) -> SettingsView {
        SettingsView {
            project: project.to_string(),
            max_iterations: self.max_iterations,
            auto_commit: self.auto_commit,
            commit_prefix: self.commit_prefix,
            claude_model: self.claude_model,
            test_command: self.test_command,
        }
    }
}

fn config_path(project_dir: &Path) -> std::path::PathBuf {
    project_dir.join(".chief").join("config.json")
}

async fn read_project_settings(project_dir: &Path) -> Result<ProjectSettings, ArtifactError> {
    match read_json::<ProjectSettings>(config_path(project_dir)).await? {
        Some(settings) => Ok(settings),
        None => Ok(ProjectSettings::default()),
    }
}

pub async fn read_settings(project_dir: &Path, project: &str) -> Result<SettingsView, ArtifactError> {
    Ok(read_project_settings(project_dir).await?.into_view(project))
}

/// Shallow-merge `patch` onto the current settings and write atomically.
/// Fields absent from `patch` are preserved (§4.G). `max_iterations <= 0`
/// is rejected without writing.
pub async fn update_settings(
    project_dir: &Path,
    project: &str,
    patch: SettingsPatch,
) -> Result<SettingsView, ArtifactError> {
    if let Some(max_iterations) = patch.max_iterations {
        if max_iterations <= 0 {
            return Err(ArtifactError::InvalidSettings(
                "max_iterations must be positive".into(),
            ));
        }
    }

    let mut current = read_project_settings(project_dir).await?;
    if let Some(v) = patch.max_iterations {
        current.max_iterations = v;
    }
    if let Some(v) = patch.auto_commit {
        current.auto_commit = v;
    }
    if let Some(v) = patch.commit_prefix {
        current.commit_prefix = v;
    }
    if let Some(v) = patch.claude_model {
        current.claude_model = v;
    }
    if let Some(v) = patch.test_command {
        current.test_command = v;
    }

    write_json_atomic(config_path(project_dir), current.clone()).await?;
    Ok(current.into_view(project))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_config_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings(dir.path(), "demo").await.unwrap();
        assert_eq!(settings.max_iterations, 5);
        assert!(settings.auto_commit);
    }

    #[tokio::test]
    async fn update_preserves_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        let patch = SettingsPatch { claude_model: Some("opus".into()), ..Default::default() };
        let settings = update_settings(dir.path(), "demo", patch).await.unwrap();
        assert_eq!(settings.claude_model, "opus");
        assert_eq!(settings.max_iterations, 5);

        let patch2 = SettingsPatch { max_iterations: Some(8), ..Default::default() };
        let settings2 = update_settings(dir.path(), "demo", patch2).await.unwrap();
        assert_eq!(settings2.max_iterations, 8);
        assert_eq!(settings2.claude_model, "opus");
    }

    #[tokio::test]
    async fn zero_max_iterations_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let patch = SettingsPatch { max_iterations: Some(0), ..Default::default() };
        let err = update_settings(dir.path(), "demo", patch).await.unwrap_err();
        assert_eq!(err.code(), chief_core::ErrorCode::FilesystemError);
    }

    #[tokio::test]
    async fn spec_shaped_config_without_a_project_field_reads_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join(".chief")).await.unwrap();
        tokio::fs::write(
            dir.path().join(".chief").join("config.json"),
            r#"{"max_iterations":3,"auto_commit":false,"commit_prefix":"x: ","claude_model":"opus","test_command":"make test"}"#,
        )
        .await
        .unwrap();

        let settings = read_settings(dir.path(), "demo").await.unwrap();
        assert_eq!(settings.project, "demo");
        assert_eq!(settings.max_iterations, 3);
        assert!(!settings.auto_commit);
    }

    #[tokio::test]
    async fn update_does_not_write_a_project_key_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let patch = SettingsPatch { max_iterations: Some(9), ..Default::default() };
        update_settings(dir.path(), "demo", patch).await.unwrap();

        let raw = tokio::fs::read_to_string(config_path(dir.path())).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("project").is_none());
    }
}
