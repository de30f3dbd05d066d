// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `MessageSink` capability (§9 Design Notes): "a thing that can
//! `Send(envelope) error`". The Router, Session Manager, and Run Manager
//! all depend on this trait rather than on the concrete transport, so they
//! can be unit-tested against an in-memory recorder.

use async_trait::async_trait;
use thiserror::Error;

use crate::response::Response;

#[derive(Debug, Error)]
#[error("message sink closed")]
pub struct SinkClosed;

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, response: Response) -> Result<(), SinkClosed>;
}

#[cfg(test)]
pub struct RecordingSink {
    pub sent: parking_lot::Mutex<Vec<Response>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink { sent: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, response: Response) -> Result<(), SinkClosed> {
        self.sent.lock().push(response);
        Ok(())
    }
}
