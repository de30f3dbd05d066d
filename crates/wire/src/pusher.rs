// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pusher-compatible event-plane frames (§4.A, §6).
//!
//! `data` is either a string (JSON-encoded) or an embedded object; Pusher
//! wire compatibility requires accepting both, so `Frame::data` is a raw
//! `serde_json::Value` and callers re-parse it with [`Frame::data_as`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Frame { event: event.into(), channel: None, data }
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Parse `data`, handling both the string-encoded and embedded-object
    /// forms Pusher allows.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            serde_json::Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        }
    }
}

pub const EVENT_CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const EVENT_SUBSCRIBE: &str = "pusher:subscribe";
pub const EVENT_SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
pub const EVENT_PING: &str = "pusher:ping";
pub const EVENT_PONG: &str = "pusher:pong";
pub const EVENT_COMMAND: &str = "chief.command";

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionEstablished {
    pub socket_id: String,
    pub activity_timeout: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribePayload {
    pub channel: String,
    pub auth: String,
}

pub fn private_channel(device_id: &str) -> String {
    format!("private-chief-server.{device_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_as_handles_string_encoded_payload() {
        let frame = Frame::new(
            EVENT_COMMAND,
            serde_json::Value::String(r#"{"type":"ping","id":"1"}"#.to_string()),
        );
        let value: serde_json::Value = frame.data_as().unwrap();
        assert_eq!(value["type"], "ping");
    }

    #[test]
    fn data_as_handles_embedded_object_payload() {
        let frame = Frame::new(EVENT_COMMAND, serde_json::json!({"type": "ping", "id": "1"}));
        let value: serde_json::Value = frame.data_as().unwrap();
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn private_channel_naming() {
        assert_eq!(private_channel("dev-123"), "private-chief-server.dev-123");
    }
}
