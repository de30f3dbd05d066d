// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI surface (§6 "Outbound CLI surface"): one `serve` subcommand.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chiefd", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan `--workspace`, connect to the control plane, and serve commands
    /// until terminated.
    Serve {
        #[arg(long)]
        workspace: PathBuf,

        #[arg(long, default_value = "this-workstation")]
        device_name: String,

        #[arg(long)]
        log_file: Option<PathBuf>,

        #[arg(long)]
        server_url: Option<String>,

        #[arg(long)]
        base_url: Option<String>,

        #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
        version: String,
    },
}
