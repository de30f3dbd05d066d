// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `chiefd` binary entry point (§6).

use std::sync::Arc;

use chief_core::SystemClock;
use chief_daemon::cli::Cli;
use chief_daemon::{Config, DaemonError, FileCredentialsProvider, Orchestrator};
use clap::Parser;

fn main() {
    let cli = Cli::parse();
    let exit_code = match Config::load(cli) {
        Ok(config) => {
            // Held for the process lifetime: dropping it stops the
            // non-blocking file appender's flush thread (§10.1).
            let _log_guard = chief_daemon::logging::init(config.log_file.as_deref());
            let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
            match runtime.block_on(serve(config)) {
                Ok(()) => 0,
                Err(e) => report(e),
            }
        }
        Err(e) => report(e),
    };
    std::process::exit(exit_code);
}

fn report(e: DaemonError) -> i32 {
    tracing::error!(error = %e, "chiefd exiting");
    e.exit_code()
}

async fn serve(config: Config) -> Result<(), DaemonError> {
    let credentials_path = chief_daemon::credentials::default_credentials_path();
    let credentials = Arc::new(FileCredentialsProvider::load(&credentials_path)?);
    let orchestrator = Orchestrator::new(config, credentials, SystemClock);
    orchestrator.serve().await.map_err(DaemonError::Transport)
}
