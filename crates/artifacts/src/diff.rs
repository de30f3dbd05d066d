// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-story git diff reading (§4.G).
//!
//! `get_story_diff` finds the most recent `feat: <story_id> - ...` commit
//! and returns the files it touched plus its unified diff text, shelling
//! out to `git log`/`git show` with a timeout and treating a non-zero
//! exit as a typed error.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::ArtifactError;

const GIT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug)]
pub struct StoryDiff {
    pub changed_files: Vec<String>,
    pub diff_text: String,
}

pub async fn get_story_diff(project_dir: &Path, story_id: &str) -> Result<StoryDiff, ArtifactError> {
    let pattern = format!(r"^feat: {} - ", regex::escape(story_id));
    let re = Regex::new(&pattern).expect("constant pattern is always valid");

    let log_output = run_git(project_dir, &["log", "--format=%H %s"]).await?;
    let hash = log_output
        .lines()
        .find_map(|line| {
            let (hash, subject) = line.split_once(' ')?;
            re.is_match(subject).then(|| hash.to_string())
        })
        .ok_or_else(|| ArtifactError::NoCommitForStory(story_id.to_string()))?;

    let files_output =
        run_git(project_dir, &["show", "--name-only", "--format=", &hash]).await?;
    let changed_files =
        files_output.lines().map(str::to_string).filter(|l| !l.is_empty()).collect();

    let diff_text = run_git(project_dir, &["show", &hash]).await?;

    Ok(StoryDiff { changed_files, diff_text })
}

async fn run_git(project_dir: &Path, args: &[&str]) -> Result<String, ArtifactError> {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(project_dir).args(args);
    let output = timeout(GIT_TIMEOUT, cmd.output())
        .await
        .map_err(|_| ArtifactError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "git timed out")))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ArtifactError::Io(std::io::Error::other(format!(
            "git {:?} failed: {stderr}",
            args
        ))));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command as TokioCommand;

    async fn git(dir: &Path, args: &[&str]) {
        let status = TokioCommand::new("git").arg("-C").arg(dir).args(args).status().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn finds_most_recent_matching_commit() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]).await;
        git(dir.path(), &["config", "user.email", "a@example.com"]).await;
        git(dir.path(), &["config", "user.name", "a"]).await;

        tokio::fs::write(dir.path().join("a.txt"), "one").await.unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "feat: US-001 - first pass"]).await;

        tokio::fs::write(dir.path().join("b.txt"), "two").await.unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "feat: US-001 - second pass"]).await;

        let diff = get_story_diff(dir.path(), "US-001").await.unwrap();
        assert_eq!(diff.changed_files, vec!["b.txt"]);
        assert!(diff.diff_text.contains("two"));
    }

    #[tokio::test]
    async fn missing_commit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]).await;
        git(dir.path(), &["config", "user.email", "a@example.com"]).await;
        git(dir.path(), &["config", "user.name", "a"]).await;
        tokio::fs::write(dir.path().join("a.txt"), "one").await.unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "chore: unrelated"]).await;

        let err = get_story_diff(dir.path(), "US-999").await.unwrap_err();
        assert!(matches!(err, ArtifactError::NoCommitForStory(_)));
    }
}
