// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound batching (§4.A).
//!
//! `send` is non-blocking: callers hand envelopes to an unbounded queue. A
//! flush task coalesces up to `BATCH_MAX` envelopes or waits up to
//! `BATCH_WINDOW`, whichever comes first, then issues one `messages`
//! upload. Failed uploads retry with backoff without reordering relative
//! to later batches — the flush loop only dequeues the next batch after
//! the current one has been accepted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chief_core::{new_id, Clock};
use chief_wire::sink::SinkClosed;
use chief_wire::{MessageSink, Outbound, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::http::ControlPlaneClient;

pub const BATCH_MAX: usize = 20;
pub const BATCH_WINDOW: Duration = Duration::from_millis(100);
pub const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(10);

pub struct OutboundBatcher<C: Clock> {
    clock: C,
    tx: mpsc::UnboundedSender<serde_json::Value>,
    shutdown: parking_lot::Mutex<Option<oneshot::Sender<oneshot::Sender<()>>>>,
}

impl<C: Clock> OutboundBatcher<C> {
    pub fn spawn(client: Arc<ControlPlaneClient>, clock: C) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(flush_loop(client, rx, shutdown_rx));
        Arc::new(OutboundBatcher { clock, tx, shutdown: parking_lot::Mutex::new(Some(shutdown_tx)) })
    }

    /// Close the queue and wait (bounded by `SHUTDOWN_DRAIN_DEADLINE`) for
    /// the flusher to drain everything already queued (§4.A).
    pub async fn close(&self) {
        let Some(shutdown_tx) = self.shutdown.lock().take() else { return };
        let (done_tx, done_rx) = oneshot::channel();
        if shutdown_tx.send(done_tx).is_err() {
            return;
        }
        let _ = timeout(SHUTDOWN_DRAIN_DEADLINE, done_rx).await;
    }
}

#[async_trait]
impl<C: Clock> MessageSink for OutboundBatcher<C> {
    async fn send(&self, response: Response) -> Result<(), SinkClosed> {
        let outbound = Outbound::new(response, &self.clock);
        let json = serde_json::to_value(&outbound).map_err(|_| SinkClosed)?;
        self.tx.send(json).map_err(|_| SinkClosed)
    }
}

async fn flush_loop(
    client: Arc<ControlPlaneClient>,
    mut rx: mpsc::UnboundedReceiver<serde_json::Value>,
    mut shutdown_rx: oneshot::Receiver<oneshot::Sender<()>>,
) {
    loop {
        let mut batch = Vec::with_capacity(BATCH_MAX);
        let deadline = tokio::time::sleep(BATCH_WINDOW);
        tokio::pin!(deadline);

        let closing = loop {
            if batch.len() >= BATCH_MAX {
                break false;
            }
            tokio::select! {
                biased;
                done_tx = &mut shutdown_rx, if batch.is_empty() => {
                    if let Ok(done_tx) = done_tx {
                        drain_remaining(&client, &mut rx, done_tx).await;
                    }
                    return;
                }
                item = rx.recv() => {
                    match item {
                        Some(v) => batch.push(v),
                        None => break true,
                    }
                }
                _ = &mut deadline, if !batch.is_empty() => break false,
            }
        };

        if !batch.is_empty() {
            upload_with_retry(&client, &batch).await;
        }

        if closing {
            return;
        }
    }
}

async fn drain_remaining(
    client: &Arc<ControlPlaneClient>,
    rx: &mut mpsc::UnboundedReceiver<serde_json::Value>,
    done_tx: oneshot::Sender<()>,
) {
    let mut remaining = Vec::new();
    while let Ok(v) = rx.try_recv() {
        remaining.push(v);
        if remaining.len() >= BATCH_MAX {
            upload_with_retry(client, &remaining).await;
            remaining.clear();
        }
    }
    if !remaining.is_empty() {
        upload_with_retry(client, &remaining).await;
    }
    let _ = done_tx.send(());
}

async fn upload_with_retry(client: &Arc<ControlPlaneClient>, batch: &[serde_json::Value]) {
    let batch_id = new_id();
    let mut backoff = Backoff::new();
    loop {
        match client.upload_messages(&batch_id, batch).await {
            Ok(resp) => {
                debug!(batch_id = %resp.batch_id, accepted = resp.accepted, "batch uploaded");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(batch_id = %batch_id, error = %e, delay_ms = delay.as_millis(), "batch upload failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chief_core::{Credentials, CredentialsProvider, FakeClock};
    use chief_wire::Response;

    struct FixedCredentials;
    impl CredentialsProvider for FixedCredentials {
        fn current(&self) -> Credentials {
            Credentials {
                access_token: "tok".into(),
                refresh_token: "refresh".into(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                device_name: "dev".into(),
                user: "user".into(),
            }
        }
        fn near_expiry(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn send_enqueues_without_blocking() {
        let client = Arc::new(ControlPlaneClient::new("http://127.0.0.1:1", Arc::new(FixedCredentials)));
        let batcher = OutboundBatcher::spawn(client, FakeClock::new());
        for _ in 0..5 {
            batcher.send(Response::Pong).await.unwrap();
        }
    }
}
