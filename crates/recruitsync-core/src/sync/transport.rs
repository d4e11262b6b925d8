//! Broadcast transports
//!
//! A transport is one independent delivery channel for freshly published
//! snapshots. The fan-out client publishes on every available transport
//! simultaneously; every inbound path funnels through the same acceptance
//! gate, so redundant delivery is expected and harmless.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::util::compact_text;

/// Buffered messages per in-process channel before slow receivers lag.
const PROCESS_CHANNEL_CAPACITY: usize = 64;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// One delivery channel for snapshot fan-out.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Publish a snapshot to every other subscriber of this channel.
    async fn publish(&self, snapshot: &Snapshot) -> Result<()>;

    /// Open a subscription for snapshots arriving on this channel.
    fn subscribe(&self) -> Box<dyn SnapshotSubscription>;
}

/// A live subscription on one transport.
#[async_trait]
pub trait SnapshotSubscription: Send {
    /// Await the next snapshot; `None` when the channel is closed.
    async fn next(&mut self) -> Option<Snapshot>;
}

// ---------------------------------------------------------------------------
// In-process broadcast
// ---------------------------------------------------------------------------

/// Same-process fan-out over a tokio broadcast channel.
///
/// Clones share one bus; every subscriber, including the publisher's own
/// listener, receives every message (self-echoes are filtered by the
/// acceptance gate, not here).
#[derive(Clone)]
pub struct ProcessBroadcast {
    tx: broadcast::Sender<Snapshot>,
}

impl ProcessBroadcast {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(PROCESS_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Default for ProcessBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastTransport for ProcessBroadcast {
    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        // A send error only means no subscriber is currently listening.
        self.tx.send(snapshot.clone()).ok();
        Ok(())
    }

    fn subscribe(&self) -> Box<dyn SnapshotSubscription> {
        Box::new(ProcessSubscription {
            rx: self.tx.subscribe(),
        })
    }
}

struct ProcessSubscription {
    rx: broadcast::Receiver<Snapshot>,
}

#[async_trait]
impl SnapshotSubscription for ProcessSubscription {
    async fn next(&mut self) -> Option<Snapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                // Dropped messages are recovered by reconciliation; keep
                // listening from the current position.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "In-process channel lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cross-device HTTP channel
// ---------------------------------------------------------------------------

/// Envelope carried on the cross-device channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Publishing client id; the server uses it to honor `exclude`
    pub sender: String,
    /// Full snapshot payload
    pub snapshot: Snapshot,
}

/// Cross-device pub/sub over the hosted backend's channel endpoint.
///
/// Publishes with a POST; subscribers poll with `since` (last delivered
/// timestamp) and `exclude` (own client id), so the server never echoes the
/// publisher's own messages back to it.
pub struct HttpChannelTransport {
    base_url: String,
    api_key: Option<String>,
    channel: String,
    client_id: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl HttpChannelTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        channel: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            channel: channel.into(),
            client_id: client_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
        })
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn channel_url(&self) -> String {
        format!("{}/channels/{}", self.base_url, self.channel)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl BroadcastTransport for HttpChannelTransport {
    async fn publish(&self, snapshot: &Snapshot) -> Result<()> {
        let message = ChannelMessage {
            sender: self.client_id.clone(),
            snapshot: snapshot.clone(),
        };
        let response = self
            .authorize(self.client.post(self.channel_url()))
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!(
                "channel publish returned HTTP {status}: {}",
                compact_text(&body)
            )));
        }
        Ok(())
    }

    fn subscribe(&self) -> Box<dyn SnapshotSubscription> {
        Box::new(HttpSubscription {
            url: self.channel_url(),
            api_key: self.api_key.clone(),
            exclude: self.client_id.clone(),
            since: crate::util::now_ms(),
            poll_interval: self.poll_interval,
            client: self.client.clone(),
            buffer: VecDeque::new(),
        })
    }
}

struct HttpSubscription {
    url: String,
    api_key: Option<String>,
    exclude: String,
    since: i64,
    poll_interval: Duration,
    client: reqwest::Client,
    buffer: VecDeque<Snapshot>,
}

impl HttpSubscription {
    async fn poll(&mut self) -> Result<()> {
        let mut request = self
            .client
            .get(&self.url)
            .query(&[("since", self.since.to_string()), ("exclude", self.exclude.clone())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Gateway(format!(
                "channel poll returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let messages = response.json::<Vec<ChannelMessage>>().await?;
        for message in messages {
            self.since = self.since.max(message.snapshot.updated_at);
            self.buffer.push_back(message.snapshot);
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSubscription for HttpSubscription {
    async fn next(&mut self) -> Option<Snapshot> {
        loop {
            if let Some(snapshot) = self.buffer.pop_front() {
                return Some(snapshot);
            }
            tokio::time::sleep(self.poll_interval).await;
            if let Err(error) = self.poll().await {
                // Background channel hiccups self-heal on the next poll.
                tracing::debug!(%error, "Channel poll failed");
            }
        }
    }
}
