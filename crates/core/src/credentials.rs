// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credentials data model.
//!
//! Token persistence, the login flow, and refresh are deliberately external
//! collaborators (§1 Non-goals): the daemon only ever reads the access
//! token and a near-expiry check through a `CredentialsProvider`. Do not
//! introduce a process-wide singleton for it (§9 Design Notes) — it is
//! threaded in by the Orchestrator and handed to whatever needs it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Near-expiry window: a credential is refreshed by its external provider
/// once less than this much time remains.
pub const NEAR_EXPIRY_WINDOW: Duration = Duration::minutes(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub device_name: String,
    pub user: String,
}

impl Credentials {
    /// True if `expires_at - now < 5 min`.
    pub fn near_expiry_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < NEAR_EXPIRY_WINDOW
    }
}

/// Supplies the current credentials and tracks near-expiry.
///
/// Implemented outside this crate (reads `~/.config/chief/credentials.json`
/// written by an external login flow); the daemon core only depends on
/// this trait so it can be faked in tests.
pub trait CredentialsProvider: Send + Sync {
    fn current(&self) -> Credentials;
    fn near_expiry(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expires_in: Duration) -> Credentials {
        Credentials {
            access_token: "tok".into(),
            refresh_token: "ref".into(),
            expires_at: Utc::now() + expires_in,
            device_name: "dev".into(),
            user: "me".into(),
        }
    }

    #[test]
    fn near_expiry_boundary() {
        let now = Utc::now();
        assert!(creds(Duration::minutes(4)).near_expiry_at(now));
        assert!(!creds(Duration::minutes(10)).near_expiry_at(now));
    }
}
