// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run log enumeration (§4.G): `.chief/prds/<prd_id>/logs/<iteration>-<ts>.log`.
//!
//! Each log file is the full captured output of one run iteration. A
//! `<ralph-status>US-xxx</ralph-status>` marker line sets `story_id` for
//! every entry read from that file onward (§4.F "status marker stream").

use std::path::Path;

use chief_wire::response::LogEntry;

use crate::error::ArtifactError;

const STATUS_OPEN: &str = "<ralph-status>";
const STATUS_CLOSE: &str = "</ralph-status>";

fn logs_dir(project_dir: &Path, prd_id: &str) -> std::path::PathBuf {
    project_dir.join(".chief").join("prds").join(prd_id).join("logs")
}

/// File name format is `<iteration>-<timestamp>.log`; `<timestamp>` is
/// whatever the Run Manager stamped it with and is carried through
/// verbatim as `LogEntry::timestamp`.
fn parse_file_name(name: &str) -> Option<(u32, String)> {
    let (iteration_str, rest) = name.strip_suffix(".log")?.split_once('-')?;
    let iteration = iteration_str.parse().ok()?;
    Some((iteration, rest.to_string()))
}

pub async fn read_logs(
    project_dir: &Path,
    prd_id: &str,
    story_id: Option<&str>,
) -> Result<Vec<LogEntry>, ArtifactError> {
    let dir = logs_dir(project_dir, prd_id);
    let mut file_names = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = read_dir.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            file_names.push(name.to_string());
        }
    }
    file_names.sort();

    let mut entries = Vec::new();
    for name in file_names {
        let Some((iteration, timestamp)) = parse_file_name(&name) else { continue };
        let contents = tokio::fs::read_to_string(dir.join(&name)).await?;
        let mut current_story: Option<String> = None;
        for line in contents.lines() {
            if let Some(marker) = extract_status_marker(line) {
                current_story = Some(marker);
                continue;
            }
            entries.push(LogEntry {
                iteration,
                timestamp: timestamp.clone(),
                story_id: current_story.clone(),
                text: line.to_string(),
            });
        }
    }

    if let Some(story_id) = story_id {
        entries.retain(|e| e.story_id.as_deref() == Some(story_id));
    }
    Ok(entries)
}

fn extract_status_marker(line: &str) -> Option<String> {
    let start = line.find(STATUS_OPEN)? + STATUS_OPEN.len();
    let end = line[start..].find(STATUS_CLOSE)? + start;
    Some(line[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_entries_tagged_by_status_marker() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join(".chief/prds/prd-1/logs");
        tokio::fs::create_dir_all(&logs).await.unwrap();
        tokio::fs::write(
            logs.join("1-20260101T000000Z.log"),
            "booting\n<ralph-status>US-001</ralph-status>\nworking on US-001\n",
        )
        .await
        .unwrap();

        let entries = read_logs(dir.path(), "prd-1", None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].story_id, None);
        assert_eq!(entries[1].story_id.as_deref(), Some("US-001"));
    }

    #[tokio::test]
    async fn filters_by_story_id() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join(".chief/prds/prd-1/logs");
        tokio::fs::create_dir_all(&logs).await.unwrap();
        tokio::fs::write(
            logs.join("1-a.log"),
            "<ralph-status>US-001</ralph-status>\nfirst\n<ralph-status>US-002</ralph-status>\nsecond\n",
        )
        .await
        .unwrap();

        let entries = read_logs(dir.path(), "prd-1", Some("US-002")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "second");
    }

    #[tokio::test]
    async fn missing_logs_dir_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_logs(dir.path(), "absent", None).await.unwrap();
        assert!(entries.is_empty());
    }
}
