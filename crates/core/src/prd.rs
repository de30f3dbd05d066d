// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PRD / story data model (§3).
//!
//! A PRD lives at `<project>/.chief/prds/<prd_id>/` as `prd.md` (free text,
//! opaque to the daemon) and `prd.json` (this structured state). Unknown
//! fields in `prd.json` must survive a read-modify-write round trip, so
//! `Prd` embeds a catch-all `extra` map via `#[serde(flatten)]` so fields
//! this daemon doesn't model are preserved verbatim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One user story within a PRD. Identified by an id of the form `US-xxx`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub passes: bool,
    #[serde(rename = "inProgress", default, skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<bool>,

    /// Fields this daemon doesn't model, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// The structured contents of `prd.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prd {
    pub project: String,
    #[serde(rename = "userStories", default)]
    pub user_stories: Vec<Story>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Prd {
    /// Returns true once every story's `passes` flag is set.
    pub fn all_passing(&self) -> bool {
        !self.user_stories.is_empty() && self.user_stories.iter().all(|s| s.passes)
    }

    /// The next story that has not yet passed, in declaration order.
    pub fn next_failing_story(&self) -> Option<&Story> {
        self.user_stories.iter().find(|s| !s.passes)
    }

    pub fn story_mut(&mut self, id: &str) -> Option<&mut Story> {
        self.user_stories.iter_mut().find(|s| s.id == id)
    }
}

/// Lightweight per-PRD summary used by the Scanner and `project_state`/`project_list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrdSummary {
    pub id: String,
    pub story_count: usize,
    pub passing_count: usize,
}

impl PrdSummary {
    pub fn from_prd(id: &str, prd: &Prd) -> Self {
        PrdSummary {
            id: id.to_string(),
            story_count: prd.user_stories.len(),
            passing_count: prd.user_stories.iter().filter(|s| s.passes).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str, passes: bool) -> Story {
        Story { id: id.into(), title: id.into(), passes, in_progress: None, extra: HashMap::new() }
    }

    #[test]
    fn all_passing_requires_nonempty() {
        let prd = Prd { project: "p".into(), user_stories: vec![], extra: HashMap::new() };
        assert!(!prd.all_passing());
    }

    #[test]
    fn next_failing_story_order() {
        let prd = Prd {
            project: "p".into(),
            user_stories: vec![story("US-001", true), story("US-002", false)],
            extra: HashMap::new(),
        };
        assert_eq!(prd.next_failing_story().unwrap().id, "US-002");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = serde_json::json!({
            "project": "p",
            "userStories": [],
            "owner": "someone-else-added-this-field"
        });
        let prd: Prd = serde_json::from_value(json).unwrap();
        assert_eq!(prd.extra.get("owner").unwrap(), "someone-else-added-this-field");
        let round_tripped = serde_json::to_value(&prd).unwrap();
        assert_eq!(round_tripped["owner"], "someone-else-added-this-field");
    }
}
