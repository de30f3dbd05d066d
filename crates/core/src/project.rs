// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project data model and the `ProjectFinder` capability trait (§3, §9).
//!
//! A `Project` is identified by its leaf directory name under the
//! workspace root. It is created by scanner observation and destroyed when
//! no longer observed; it never mutates once published except through a
//! full re-scan (§3) — so `ProjectSummary` is a plain immutable value,
//! cloned out of the Scanner's table on every read.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::prd::PrdSummary;

/// A project observed under the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub has_git: bool,
}

/// Published, cloneable snapshot of a project and its PRDs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSummary {
    pub name: String,
    pub path: PathBuf,
    pub has_git: bool,
    pub prds: Vec<PrdSummary>,
}

/// "A thing that can look up a project by name" (§9 Design Notes).
///
/// The Scanner implements this directly; the Router and File Watcher
/// depend only on the trait so they can be tested against a fake table
/// without spinning up a real filesystem scan loop.
pub trait ProjectFinder: Send + Sync {
    fn find_project(&self, name: &str) -> Option<ProjectSummary>;
    fn list_projects(&self) -> Vec<ProjectSummary>;
}
