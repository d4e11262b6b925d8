//! Realtime fan-out client
//!
//! Propagates freshly created snapshots across every available channel and
//! funnels everything received through one last-writer-wins gate before it
//! reaches the application callback.
//!
//! Three delivery paths run simultaneously when available: the in-process
//! broadcast bus, the durable-store write path (a watcher on the cache's
//! snapshot meta covers contexts the bus cannot reach), and the
//! cross-device channel transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::snapshot::{Snapshot, SnapshotGate};
use crate::store::LocalCache;
use crate::sync::transport::{BroadcastTransport, ProcessBroadcast, SnapshotSubscription};

/// How often the store watcher checks for writes from other processes.
const DEFAULT_STORE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Application callback invoked with every accepted snapshot.
pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Explicitly constructed dependency bundle for a sync client.
///
/// Holds the client identity and every capability handle the client needs;
/// there is no ambient module state.
pub struct SyncContext {
    /// Identity stamped on published snapshots and filtered on receive
    pub client_id: String,
    /// Durable local cache (possibly disabled)
    pub cache: Arc<LocalCache>,
    /// Same-process broadcast bus
    pub local_bus: ProcessBroadcast,
    /// Cross-device channel, when a backend is configured
    pub remote: Option<Arc<dyn BroadcastTransport>>,
    /// Store watcher poll cadence
    pub store_poll_interval: Duration,
}

impl SyncContext {
    /// Create a context with a fresh in-process bus and no remote channel.
    pub fn new(client_id: impl Into<String>, cache: Arc<LocalCache>) -> Self {
        Self {
            client_id: client_id.into(),
            cache,
            local_bus: ProcessBroadcast::new(),
            remote: None,
            store_poll_interval: DEFAULT_STORE_POLL_INTERVAL,
        }
    }

    /// Share an existing in-process bus (other clients in this process).
    #[must_use]
    pub fn with_local_bus(mut self, bus: ProcessBroadcast) -> Self {
        self.local_bus = bus;
        self
    }

    /// Attach a cross-device channel transport.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn BroadcastTransport>) -> Self {
        self.remote = Some(remote);
        self
    }

    #[must_use]
    pub const fn with_store_poll_interval(mut self, interval: Duration) -> Self {
        self.store_poll_interval = interval;
        self
    }
}

/// Multi-channel snapshot fan-out with last-writer-wins acceptance.
///
/// Lifecycle: construct, [`start`](Self::start) to attach listeners,
/// [`publish`](Self::publish) local snapshots, [`stop`](Self::stop) to
/// detach. `start` and `stop` are both idempotent.
pub struct RealtimeSyncClient {
    ctx: SyncContext,
    gate: Arc<Mutex<SnapshotGate>>,
    on_snapshot: SnapshotCallback,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RealtimeSyncClient {
    /// Create a stopped client; `on_snapshot` receives accepted snapshots.
    pub fn new(ctx: SyncContext, on_snapshot: impl Fn(Snapshot) + Send + Sync + 'static) -> Self {
        let gate = Arc::new(Mutex::new(SnapshotGate::new(ctx.client_id.clone())));
        Self {
            ctx,
            gate,
            on_snapshot: Arc::new(on_snapshot),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The local client identity.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.ctx.client_id
    }

    /// The highest timestamp accepted or published so far.
    pub fn last_seen(&self) -> i64 {
        self.gate.lock().map_or(0, |gate| gate.last_seen())
    }

    /// Attach all channel listeners.
    ///
    /// Initializes the acceptance watermark from the persisted snapshot so
    /// a restart does not re-accept state the client has already applied.
    pub async fn start(&self) {
        {
            let tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if !tasks.is_empty() {
                return;
            }
        }

        if let Some(persisted) = self.ctx.cache.load_snapshot().await {
            if let Ok(mut gate) = self.gate.lock() {
                gate.advance(persisted.updated_at);
            }
        }

        let mut spawned = vec![
            self.spawn_listener(self.ctx.local_bus.subscribe()),
            self.spawn_store_watcher(),
        ];
        if let Some(remote) = &self.ctx.remote {
            spawned.push(self.spawn_listener(remote.subscribe()));
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.extend(spawned);
        tracing::debug!(client_id = %self.ctx.client_id, "Realtime sync client started");
    }

    /// Detach every channel listener. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Publish a locally created snapshot on every available channel.
    ///
    /// The watermark advances first, so the publisher can never re-accept
    /// its own write when a channel echoes it back. Persisting to the
    /// durable store is itself one of the delivery paths: other processes
    /// observe it through their store watcher.
    pub async fn publish(&self, snapshot: &Snapshot) {
        if let Ok(mut gate) = self.gate.lock() {
            gate.advance(snapshot.updated_at);
        }

        self.ctx.cache.save_snapshot(snapshot).await;

        if let Err(error) = self.ctx.local_bus.publish(snapshot).await {
            tracing::warn!(%error, "In-process publish failed");
        }
        if let Some(remote) = &self.ctx.remote {
            if let Err(error) = remote.publish(snapshot).await {
                tracing::warn!(%error, "Cross-device publish failed");
            }
        }
    }

    fn spawn_listener(&self, mut subscription: Box<dyn SnapshotSubscription>) -> JoinHandle<()> {
        let gate = Arc::clone(&self.gate);
        let callback = Arc::clone(&self.on_snapshot);
        tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                let accepted = gate
                    .lock()
                    .ok()
                    .and_then(|mut gate| gate.admit(snapshot));
                if let Some(snapshot) = accepted {
                    callback(snapshot);
                }
            }
        })
    }

    fn spawn_store_watcher(&self) -> JoinHandle<()> {
        let gate = Arc::clone(&self.gate);
        let callback = Arc::clone(&self.on_snapshot);
        let cache = Arc::clone(&self.ctx.cache);
        let interval = self.ctx.store_poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(snapshot) = cache.load_snapshot().await else {
                    continue;
                };
                let accepted = gate
                    .lock()
                    .ok()
                    .and_then(|mut gate| gate.admit(snapshot));
                if let Some(snapshot) = accepted {
                    callback(snapshot);
                }
            }
        })
    }
}

impl Drop for RealtimeSyncClient {
    fn drop(&mut self) {
        self.stop();
    }
}
