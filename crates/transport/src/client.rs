// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect state machine (§4.A): `Disconnected → Connecting → Connected
//! → Subscribed → Disconnected`. Owns the control-plane client, the
//! outbound batcher, and the event-plane socket, retrying every
//! non-terminal [`TransportError`] with [`Backoff`] forever.
//!
//! The `OnReconnect` hook (§9 Design Notes: "cyclic references") lets the
//! Orchestrator re-announce state (project list, open sessions) after a
//! fresh subscribe without the transport needing to know about the
//! Router, Scanner, or Session Manager. It is awaited in line, before the
//! event plane starts forwarding commands, so the `state_snapshot` it
//! sends is guaranteed to precede any subsequent command response (§5,
//! §8) on both the first subscribe and every later reconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chief_core::{Clock, CredentialsProvider};
use chief_wire::MessageSink;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backoff::Backoff;
use crate::batch::OutboundBatcher;
use crate::http::{ConnectRequest, ControlPlaneClient};
use crate::ratelimit::RateLimiter;
use crate::ws::{self, EventPlane};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

/// Re-announces state after a successful subscribe. Invoked and awaited
/// once per subscribe, after the event plane is ready to receive commands
/// but before any are delivered.
#[async_trait]
pub trait OnReconnect: Send + Sync {
    async fn on_subscribed(&self);
}

/// Default liveness ping period (§4.A).
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct Transport<C: Clock> {
    control_plane: Arc<ControlPlaneClient>,
    clock: C,
    chief_version: String,
    device_name: String,
    state: Mutex<State>,
    on_reconnect: Arc<dyn OnReconnect>,
    pub outbound: Arc<OutboundBatcher<C>>,
    pub rate_limiter: Arc<RateLimiter<C>>,
}

impl<C: Clock> Transport<C> {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialsProvider>,
        clock: C,
        chief_version: impl Into<String>,
        device_name: impl Into<String>,
        on_reconnect: Arc<dyn OnReconnect>,
    ) -> Self {
        let control_plane = Arc::new(ControlPlaneClient::new(base_url, credentials));
        let outbound = OutboundBatcher::spawn(control_plane.clone(), clock.clone());
        let rate_limiter = Arc::new(RateLimiter::new(clock.clone()));
        Transport {
            control_plane,
            clock,
            chief_version: chief_version.into(),
            device_name: device_name.into(),
            state: Mutex::new(State::Disconnected),
            on_reconnect,
            outbound,
            rate_limiter,
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    fn set_state(&self, state: State) {
        *self.state.lock() = state;
        info!(?state, "transport state change");
    }

    /// Run the connect/subscribe/receive cycle until a terminal error, or
    /// until `cancel` is signalled (in which case the event plane is closed
    /// gracefully before returning, per §9 Design Notes).
    pub async fn run(
        &self,
        commands: mpsc::UnboundedSender<serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<(), crate::error::TransportError> {
        let mut backoff = Backoff::new();
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.set_state(State::Connecting);
            match self.connect_and_subscribe(&commands, &cancel).await {
                Ok(()) => {
                    if cancel.is_cancelled() {
                        self.set_state(State::Disconnected);
                        return Ok(());
                    }
                    backoff.reset();
                    // run() returns Ok only when the event plane closed
                    // cleanly (peer-initiated); loop to reconnect.
                }
                Err(e) if e.is_terminal() => {
                    error!(error = %e, "terminal transport error, giving up");
                    self.set_state(State::Disconnected);
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "transport error, will retry");
                }
            }
            self.set_state(State::Disconnected);
            tokio::select! {
                _ = tokio::time::sleep(backoff.next_delay()) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    async fn connect_and_subscribe(
        &self,
        commands: &mpsc::UnboundedSender<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<(), crate::error::TransportError> {
        let connect_req = ConnectRequest {
            chief_version: self.chief_version.clone(),
            device_name: self.device_name.clone(),
        };
        let connected = self.control_plane.connect(&connect_req).await?;
        self.set_state(State::Connected);

        let url = ws::event_plane_url(
            &connected.reverb.scheme,
            &connected.reverb.host,
            connected.reverb.port,
            &connected.reverb.key,
        );
        let event_plane: EventPlane =
            ws::connect(&url, &self.control_plane, &connected.device_id).await?;
        self.set_state(State::Subscribed);
        // Awaited before the event plane starts forwarding commands, so
        // the re-announced state_snapshot is always the first envelope
        // after a subscribe (first or reconnect) — §5/§8's "exactly one
        // state_snapshot precedes any subsequent command response".
        self.on_reconnect.on_subscribed().await;

        let heartbeat_task = self.spawn_heartbeat();
        let result = event_plane.run(commands.clone(), cancel.clone()).await;
        heartbeat_task.abort();
        result
    }

    /// Periodic liveness ping for the lifetime of one connection (§4.A,
    /// default 30s). Aborted when the event plane's run loop returns.
    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let control_plane = self.control_plane.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = control_plane.heartbeat().await {
                    warn!(error = %e, "heartbeat failed");
                }
            }
        })
    }

    /// Best-effort disconnect and drain, called once by the Orchestrator on
    /// shutdown (§4.A, §4.H).
    pub async fn shutdown(&self) {
        self.outbound.close().await;
        if let Err(e) = self.control_plane.disconnect().await {
            warn!(error = %e, "disconnect call failed during shutdown");
        }
        self.set_state(State::Disconnected);
    }

    pub fn sink(&self) -> Arc<dyn MessageSink> {
        self.outbound.clone()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chief_core::{Credentials, FakeClock};

    struct FixedCredentials;
    impl CredentialsProvider for FixedCredentials {
        fn current(&self) -> Credentials {
            Credentials {
                access_token: "tok".into(),
                refresh_token: "ref".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                device_name: "dev".into(),
                user: "user".into(),
            }
        }
        fn near_expiry(&self) -> bool {
            false
        }
    }

    struct NoopReconnect;
    #[async_trait]
    impl OnReconnect for NoopReconnect {
        async fn on_subscribed(&self) {}
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let transport = Transport::new(
            "http://127.0.0.1:1",
            Arc::new(FixedCredentials),
            FakeClock::new(),
            "0.1.0",
            "test-device",
            Arc::new(NoopReconnect),
        );
        assert_eq!(transport.state(), State::Disconnected);
    }
}
