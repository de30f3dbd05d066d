// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-wide configuration (§10.3): CLI flag wins, falling back to an
//! environment variable, falling back to a hardcoded default. Per-project
//! settings are a separate concern owned by `chief_artifacts::settings`.

use std::path::PathBuf;

use crate::cli::{Cli, Commands};
use crate::error::DaemonError;

pub struct Config {
    pub workspace: PathBuf,
    pub device_name: String,
    pub log_file: Option<PathBuf>,
    pub server_url: String,
    pub chief_version: String,
}

/// Resolves the control-plane URL the session command line should connect
/// to: the `--server-url` flag, then `--base-url`, then `CHIEF_SERVER_URL`
/// (§6: "the explicit flag wins").
fn resolve_server_url(server_url: Option<String>, base_url: Option<String>) -> Option<String> {
    server_url.or(base_url).or_else(|| std::env::var("CHIEF_SERVER_URL").ok())
}

/// Command line used to spawn interactive PRD sessions. Not part of the
/// CLI surface in §6; resolved from `CHIEF_SESSION_COMMAND`, defaulting to
/// the vendor agent binary name.
pub fn session_command() -> String {
    std::env::var("CHIEF_SESSION_COMMAND").unwrap_or_else(|_| "claude".to_string())
}

/// Command line used to spawn automated run iterations (§4.F).
pub fn run_command() -> String {
    std::env::var("CHIEF_RUN_COMMAND").unwrap_or_else(|_| "claude".to_string())
}

impl Config {
    /// Validates the workspace directory exists and is readable before any
    /// subsystem starts (§10.3).
    pub fn load(cli: Cli) -> Result<Config, DaemonError> {
        let Commands::Serve { workspace, device_name, log_file, server_url, base_url, version } = cli.command;

        if !workspace.is_dir() {
            return Err(DaemonError::InvalidWorkspace(workspace));
        }

        let server_url = resolve_server_url(server_url, base_url).ok_or(DaemonError::MissingServerUrl)?;

        Ok(Config { workspace, device_name, log_file, server_url, chief_version: version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_server_url_flag_wins_over_base_url() {
        let resolved = resolve_server_url(Some("https://explicit".into()), Some("https://fallback".into()));
        assert_eq!(resolved.as_deref(), Some("https://explicit"));
    }

    #[test]
    fn base_url_is_used_when_server_url_is_absent() {
        let resolved = resolve_server_url(None, Some("https://fallback".into()));
        assert_eq!(resolved.as_deref(), Some("https://fallback"));
    }
}
