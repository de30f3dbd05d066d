// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope framing (§3): `{type, id, timestamp, ...fields}` in both
//! directions. `id` on an inbound envelope echoes back as `request_id` on
//! the matching response/error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::response::Response;

/// A decoded inbound command envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Inbound {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub command: Command,
}

/// An outbound response/event envelope. `id` is always freshly generated
/// (§3) — it is never the echoed request id; request correlation travels
/// in the `request_id` field carried by the response payload itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outbound {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub response: Response,
}

impl Outbound {
    pub fn new(response: Response, clock: &impl chief_core::Clock) -> Self {
        Outbound { id: chief_core::new_id(), timestamp: clock.utc_now(), response }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chief_core::SystemClock;

    #[test]
    fn outbound_has_nonempty_id_and_timestamp() {
        let out = Outbound::new(Response::Pong, &SystemClock);
        assert!(!out.id.is_empty());
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["type"], "pong");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn inbound_decodes_unknown_fields_by_command_shape() {
        let raw = serde_json::json!({
            "type": "ping",
            "id": "req-1",
            "timestamp": "2026-01-01T00:00:00Z",
        });
        let inbound: Inbound = serde_json::from_value(raw).unwrap();
        assert_eq!(inbound.command, Command::Ping);
    }
}
