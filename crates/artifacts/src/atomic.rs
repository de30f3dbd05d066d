// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON file writes (§4.G: "Writes are atomic").
//!
//! Write to a temp file in the destination's own directory, `sync_all`,
//! then rename over the target. The rename is the only step that can be
//! observed mid-write, and on the platforms this daemon targets it is
//! atomic within a filesystem.

use std::path::Path;

use serde::Serialize;
use tokio::task;

use crate::error::ArtifactError;

pub async fn write_json_atomic<T: Serialize + Send + 'static>(
    path: impl AsRef<Path>,
    value: T,
) -> Result<(), ArtifactError> {
    let path = path.as_ref().to_path_buf();
    task::spawn_blocking(move || write_json_atomic_blocking(&path, &value))
        .await
        .map_err(|e| ArtifactError::Io(std::io::Error::other(e)))?
}

fn write_json_atomic_blocking<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    use std::io::Write;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ArtifactError::Io(e.error))?;
    Ok(())
}

pub async fn read_json<T: for<'de> serde::Deserialize<'de>>(
    path: impl AsRef<Path>,
) -> Result<Option<T>, ArtifactError> {
    let path = path.as_ref().to_path_buf();
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        value: i32,
    }

    #[tokio::test]
    async fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        write_json_atomic(&path, Doc { value: 7 }).await.unwrap();
        let read: Option<Doc> = read_json(&path).await.unwrap();
        assert_eq!(read, Some(Doc { value: 7 }));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let read: Option<Doc> = read_json(&path).await.unwrap();
        assert_eq!(read, None);
    }
}
