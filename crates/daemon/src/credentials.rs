// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `CredentialsProvider` backed by `<home>/.config/chief/credentials.json`
//! (§6). An external login flow owns writing this file; the daemon only
//! reads it, once at startup, and holds it in memory for the process
//! lifetime — token refresh is an external collaborator (§1 Non-goals).

use std::path::{Path, PathBuf};

use chief_core::{Credentials, CredentialsProvider};
use parking_lot::RwLock;

use crate::error::DaemonError;

pub fn default_credentials_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".config").join("chief").join("credentials.json")
}

pub struct FileCredentialsProvider {
    current: RwLock<Credentials>,
}

impl FileCredentialsProvider {
    pub fn load(path: &Path) -> Result<Self, DaemonError> {
        if !path.exists() {
            return Err(DaemonError::MissingCredentials(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|_| DaemonError::MissingCredentials(path.to_path_buf()))?;
        let current: Credentials = serde_json::from_slice(&bytes)?;
        Ok(FileCredentialsProvider { current: RwLock::new(current) })
    }
}

impl CredentialsProvider for FileCredentialsProvider {
    fn current(&self) -> Credentials {
        self.current.read().clone()
    }

    fn near_expiry(&self) -> bool {
        self.current.read().near_expiry_at(chrono::Utc::now())
    }
}
