// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the transport and cache seams.

use crate::cache::{CacheLookup, Fields, MetadataCache};
use crate::client::Transport;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// One scripted upstream reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// `200 OK` with a body.
    Ok(Bytes),
    /// Non-200 status.
    Status(u16),
    /// Connection-level failure.
    Transport(String),
    /// Request timed out.
    Timeout,
}

impl ScriptedReply {
    fn into_result(self, url: &Url) -> Result<Bytes> {
        match self {
            ScriptedReply::Ok(body) => Ok(body),
            ScriptedReply::Status(status) => Err(GatewayError::Status {
                status,
                url: url.to_string(),
            }),
            ScriptedReply::Transport(msg) => Err(GatewayError::Transport(msg)),
            ScriptedReply::Timeout => Err(GatewayError::Timeout(format!("{url} timed out"))),
        }
    }
}

/// Transport replaying queued replies, then a default one.
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<ScriptedReply>>,
    otherwise: ScriptedReply,
    delay: Duration,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Transport that answers `200 OK` once the queue is empty.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            otherwise: ScriptedReply::Ok(Bytes::from_static(b"%PDF-1.4")),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Transport that always answers with `status`.
    pub fn failing(status: u16) -> Self {
        Self::new().otherwise(ScriptedReply::Status(status))
    }

    /// Queue a reply.
    #[must_use]
    pub fn then(self, reply: ScriptedReply) -> Self {
        self.queue.lock().push_back(reply);
        self
    }

    /// Queue a successful reply.
    #[must_use]
    pub fn then_ok(self, body: &'static [u8]) -> Self {
        self.then(ScriptedReply::Ok(Bytes::from_static(body)))
    }

    /// Queue a non-200 reply.
    #[must_use]
    pub fn then_status(self, status: u16) -> Self {
        self.then(ScriptedReply::Status(status))
    }

    /// Reply used once the queue is drained.
    #[must_use]
    pub fn otherwise(mut self, reply: ScriptedReply) -> Self {
        self.otherwise = reply;
        self
    }

    /// Delay every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of requests that reached the transport.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        let reply = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        reply.into_result(url)
    }
}

/// Cache whose every operation fails, as if the store were down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableCache;

#[async_trait]
impl MetadataCache for UnreachableCache {
    async fn put(&self, key: &str, _fields: Fields, _ttl: Duration) -> Result<()> {
        Err(GatewayError::Cache(format!("cannot store {key}: connection refused")))
    }

    async fn get(&self, key: &str) -> Result<CacheLookup> {
        Err(GatewayError::Cache(format!("cannot read {key}: connection refused")))
    }
}
