// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport error taxonomy (§4.A, §7).
//!
//! Two kinds are terminal for the daemon (`AuthFailed`, `Incompatible`);
//! everything else is retried with backoff forever (§7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device deauthorized: {0}")]
    AuthFailed(String),

    #[error("incompatible protocol version: {0}")]
    Incompatible(String),

    #[error("transport request failed: {0}")]
    Retryable(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Terminal errors stop reconnection and surface to the Orchestrator
    /// (§4.A reconnect state machine, §7).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::AuthFailed(_) | TransportError::Incompatible(_))
    }
}
