// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pusher-compatible event-plane client (§4.A, §6).
//!
//! Handshake: connect → `pusher:connection_established` → sign the private
//! channel via `ControlPlaneClient::broadcasting_auth` → `pusher:subscribe`
//! → await `pusher_internal:subscription_succeeded`. Once subscribed,
//! `chief.command` frames are forwarded to the caller and `pusher:ping`
//! is answered with `pusher:pong`; this side also emits its own
//! `pusher:ping` at half the server-advertised `activity_timeout` so a
//! silent connection is detected before the server times it out.

use std::time::Duration;

use chief_wire::pusher::{
    self, ConnectionEstablished, Frame, SubscribePayload,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::http::ControlPlaneClient;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event-plane connection, already subscribed to the device's private
/// channel. Dropping it does not close the socket gracefully; call
/// [`EventPlane::close`] for that.
pub struct EventPlane {
    socket: WsStream,
    activity_timeout: Duration,
}

/// Connect to the Reverb/Pusher websocket endpoint at `url` and complete
/// the subscribe handshake for `device_id`'s private channel.
pub async fn connect(
    url: &str,
    control_plane: &ControlPlaneClient,
    device_id: &str,
) -> Result<EventPlane, TransportError> {
    let (mut socket, _resp) = tokio_tungstenite::connect_async(url).await?;

    let established: ConnectionEstablished = loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Frame = serde_json::from_str(&text)?;
                if frame.event == pusher::EVENT_CONNECTION_ESTABLISHED {
                    break frame.data_as()?;
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                socket.send(Message::Pong(payload)).await?;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(TransportError::Retryable(
                    "socket closed before connection_established".into(),
                ))
            }
        }
    };

    let channel = pusher::private_channel(device_id);
    let auth = control_plane.broadcasting_auth(&established.socket_id, &channel).await?;
    let subscribe = Frame::new(
        pusher::EVENT_SUBSCRIBE,
        serde_json::to_value(SubscribePayload { channel: channel.clone(), auth: auth.auth })?,
    );
    socket.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;

    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Frame = serde_json::from_str(&text)?;
                if frame.event == pusher::EVENT_SUBSCRIPTION_SUCCEEDED
                    && frame.channel.as_deref() == Some(channel.as_str())
                {
                    break;
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                socket.send(Message::Pong(payload)).await?;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(TransportError::Retryable(
                    "socket closed before subscription_succeeded".into(),
                ))
            }
        }
    }

    debug!(channel = %channel, "event plane subscribed");
    Ok(EventPlane {
        socket,
        activity_timeout: Duration::from_secs(established.activity_timeout),
    })
}

impl EventPlane {
    /// Run the receive loop, forwarding each decoded `chief.command` frame
    /// body to `commands` until the socket closes, errors, or `cancel` is
    /// signalled. Answers `pusher:ping` and self-initiates one at half
    /// `activity_timeout`. On cancellation, closes gracefully (§9 Design
    /// Notes open question) rather than being dropped mid-connection.
    pub async fn run(
        mut self,
        commands: mpsc::UnboundedSender<serde_json::Value>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let half_timeout = self.activity_timeout / 2;
        let mut keepalive = tokio::time::interval(half_timeout.max(Duration::from_secs(1)));
        keepalive.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.close().await;
                    return Ok(());
                }
                _ = keepalive.tick() => {
                    let frame = Frame::new(pusher::EVENT_PING, serde_json::Value::Null);
                    if let Ok(text) = serde_json::to_string(&frame) {
                        self.socket.send(Message::Text(text)).await?;
                    }
                }
                msg = self.socket.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame: Frame = serde_json::from_str(&text)?;
                            self.handle_frame(frame, &commands).await?;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            self.socket.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Frame,
        commands: &mpsc::UnboundedSender<serde_json::Value>,
    ) -> Result<(), TransportError> {
        match frame.event.as_str() {
            pusher::EVENT_PING => {
                let pong = Frame::new(pusher::EVENT_PONG, serde_json::Value::Null);
                self.socket.send(Message::Text(serde_json::to_string(&pong)?)).await?;
            }
            pusher::EVENT_COMMAND => {
                let payload: serde_json::Value = frame.data_as()?;
                if commands.send(payload).is_err() {
                    warn!("command receiver dropped; discarding inbound frame");
                }
            }
            pusher::EVENT_PONG => {}
            other => debug!(event = other, "ignoring unrecognized event-plane frame"),
        }
        Ok(())
    }

    /// Graceful close with a 10s deadline (§12 resolution of the event-plane
    /// close ambiguity): send a close frame and wait for the peer's
    /// acknowledgement, falling back to an abrupt drop if it doesn't arrive
    /// in time.
    pub async fn close(mut self) {
        let deadline = Duration::from_secs(10);
        let _ = self.socket.close(None).await;
        let drain = async {
            while let Some(Ok(_)) = self.socket.next().await {}
        };
        let _ = tokio::time::timeout(deadline, drain).await;
    }
}

pub fn event_plane_url(scheme: &str, host: &str, port: u16, key: &str) -> String {
    let ws_scheme = if scheme == "https" { "wss" } else { "ws" };
    format!("{ws_scheme}://{host}:{port}/app/{key}?protocol=7&client=chief&version=1.0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_plane_url_maps_https_to_wss() {
        let url = event_plane_url("https", "reverb.example.com", 443, "appkey");
        assert!(url.starts_with("wss://reverb.example.com:443/app/appkey"));
    }

    #[test]
    fn event_plane_url_maps_http_to_ws() {
        let url = event_plane_url("http", "localhost", 8080, "appkey");
        assert!(url.starts_with("ws://localhost:8080/app/appkey"));
    }
}
