// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clone_repo` (§4.B): `git clone --progress` under the workspace root,
//! streaming parsed percentages. Grounded on the same subprocess-with-
//! stderr-line-parsing shape as `chief_artifacts::diff::run_git`, just
//! long-running and progress-reporting instead of one-shot.

use std::path::PathBuf;

use chief_wire::{MessageSink, Response};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Derives a target directory name from a repository URL when the caller
/// doesn't supply one, e.g. `https://example.com/org/repo.git` -> `repo`.
pub fn derive_directory_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    trimmed.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("repo").to_string()
}

/// True if `name` would escape the workspace root (§4.B: caller-supplied
/// directory names come from the remote control plane, a trust boundary).
pub fn is_unsafe_directory_name(name: &str) -> bool {
    name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." || name == "."
}

pub async fn run_clone(
    workspace_root: PathBuf,
    target_dir: PathBuf,
    sink: Arc<dyn MessageSink>,
    url: String,
) {
    let mut child = match Command::new("git")
        .arg("-C")
        .arg(&workspace_root)
        .arg("clone")
        .arg("--progress")
        .arg(&url)
        .arg(&target_dir)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            send_complete(&sink, &url, false, Some(e.to_string())).await;
            return;
        }
    };

    if let Some(stderr) = child.stderr.take() {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(percent) = parse_percent(&line) {
                let _ = sink.send(Response::CloneProgress { url: url.clone(), percent }).await;
            }
        }
    }

    let status = child.wait().await;
    let success = matches!(status, Ok(s) if s.success());
    let error = if success { None } else { Some("git clone exited with a non-zero status".to_string()) };
    send_complete(&sink, &url, success, error).await;
}

async fn send_complete(sink: &Arc<dyn MessageSink>, url: &str, success: bool, error: Option<String>) {
    let _ = sink.send(Response::CloneComplete { url: url.to_string(), success, error }).await;
}

/// Parses the percentage out of a `git clone --progress` stderr line, e.g.
/// `Receiving objects:  42% (420/1000), 1.2 MiB | 3.4 MiB/s`.
fn parse_percent(line: &str) -> Option<u8> {
    let (before, _) = line.split_once('%')?;
    let digits: String = before.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_directory_name_from_url() {
        assert_eq!(derive_directory_name("https://example.com/org/repo.git"), "repo");
        assert_eq!(derive_directory_name("git@example.com:org/repo.git"), "repo");
        assert_eq!(derive_directory_name("https://example.com/org/repo/"), "repo");
    }

    #[test]
    fn parses_progress_percentages() {
        assert_eq!(parse_percent("Receiving objects:  42% (420/1000)"), Some(42));
        assert_eq!(parse_percent("Resolving deltas: 100% (10/10), done."), Some(100));
        assert_eq!(parse_percent("Cloning into 'repo'..."), None);
    }

    #[test]
    fn rejects_unsafe_directory_names() {
        assert!(is_unsafe_directory_name(""));
        assert!(is_unsafe_directory_name(".."));
        assert!(is_unsafe_directory_name("a/b"));
        assert!(!is_unsafe_directory_name("my-repo"));
    }
}
