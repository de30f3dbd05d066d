// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane HTTP client (§4.A, §6).
//!
//! Every call attaches `Authorization: Bearer <access_token>` from the
//! `CredentialsProvider`. `connect` distinguishes the two terminal error
//! kinds (`AuthFailed` on 401/403, `Incompatible` on version mismatch)
//! from the general "retryable" bucket every other non-2xx falls into.

use std::sync::Arc;
use std::time::Duration;

use chief_core::CredentialsProvider;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Protocol version this build of the daemon speaks. Compared against the
/// server's `protocol_version` on connect.
pub const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest {
    pub chief_version: String,
    pub device_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReverbConfig {
    pub key: String,
    pub host: String,
    pub port: u16,
    pub scheme: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectResponse {
    pub protocol_version: String,
    pub device_id: String,
    pub session_id: String,
    pub reverb: ReverbConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest<'a> {
    pub batch_id: String,
    pub messages: &'a [serde_json::Value],
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub accepted: usize,
    pub batch_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastingAuthRequest<'a> {
    pub socket_id: &'a str,
    pub channel_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastingAuthResponse {
    pub auth: String,
}

pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialsProvider>,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        ControlPlaneClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            credentials,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.credentials.current().access_token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn connect(&self, req: &ConnectRequest) -> Result<ConnectResponse, TransportError> {
        let resp = self
            .http
            .post(self.url("/api/device/connect"))
            .header("Authorization", self.bearer())
            .json(req)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TransportError::AuthFailed(format!(
                "device connect deauthorized (HTTP {status})"
            )));
        }
        if !status.is_success() {
            return Err(TransportError::Retryable(format!("connect failed: HTTP {status}")));
        }

        let body: ConnectResponse = resp.json().await?;
        if body.protocol_version != PROTOCOL_VERSION {
            return Err(TransportError::Incompatible(format!(
                "server speaks protocol {}, this build speaks {}",
                body.protocol_version, PROTOCOL_VERSION
            )));
        }
        Ok(body)
    }

    /// Best-effort: called exactly once on graceful shutdown (§4.A).
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(self.url("/api/device/disconnect"))
            .header("Authorization", self.bearer())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Retryable(format!(
                "disconnect failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Periodic liveness ping. Failure is logged by the caller, never fatal.
    pub async fn heartbeat(&self) -> Result<(), TransportError> {
        let resp = self
            .http
            .post(self.url("/api/device/heartbeat"))
            .header("Authorization", self.bearer())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Retryable(format!(
                "heartbeat failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    pub async fn upload_messages(
        &self,
        batch_id: &str,
        messages: &[serde_json::Value],
    ) -> Result<MessagesResponse, TransportError> {
        let req = MessagesRequest { batch_id: batch_id.to_string(), messages };
        let resp = self
            .http
            .post(self.url("/api/device/messages"))
            .header("Authorization", self.bearer())
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Retryable(format!(
                "messages upload failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn broadcasting_auth(
        &self,
        socket_id: &str,
        channel_name: &str,
    ) -> Result<BroadcastingAuthResponse, TransportError> {
        let req = BroadcastingAuthRequest { socket_id, channel_name };
        let resp = self
            .http
            .post(self.url("/api/device/broadcasting/auth"))
            .header("Authorization", self.bearer())
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TransportError::Retryable(format!(
                "broadcasting auth failed: HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}
