//! Reconciliation loop
//!
//! Push-based fan-out misses updates when a client is offline, backgrounded,
//! or the cross-device channel is down. The reconciler copes by periodically
//! pulling authoritative state from the remote gateway, diffing against the
//! last-applied values, and notifying on real changes only. Repeated
//! identical pulls produce zero observable effect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::gateway::RemoteGateway;
use crate::models::{Booking, Candidate, CollectionKind, Notification, SystemConfig, User};
use crate::snapshot::SnapshotPayload;
use crate::sync::ConnectivitySignal;

/// Cadence of the periodic pull.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(12);

/// Minimum spacing between notifications for the same collection.
///
/// Prevents notification storms when the loop runs every few seconds while
/// remote data is being actively edited by several users.
pub const NOTICE_COOLDOWN: Duration = Duration::from_secs(60);

/// Read side of the remote backend, injected so tests can use an in-memory
/// fake instead of HTTP.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Whether a remote backend is configured at all.
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_bookings(&self) -> Vec<Booking>;
    async fn fetch_candidates(&self) -> Vec<Candidate>;
    async fn fetch_users(&self) -> Vec<User>;
    async fn fetch_notifications(&self) -> Vec<Notification>;
    async fn fetch_config(&self) -> Option<SystemConfig>;
}

#[async_trait]
impl RemoteSource for RemoteGateway {
    fn is_configured(&self) -> bool {
        Self::is_configured(self)
    }

    async fn fetch_bookings(&self) -> Vec<Booking> {
        Self::fetch_bookings(self).await
    }

    async fn fetch_candidates(&self) -> Vec<Candidate> {
        Self::fetch_candidates(self).await
    }

    async fn fetch_users(&self) -> Vec<User> {
        Self::fetch_users(self).await
    }

    async fn fetch_notifications(&self) -> Vec<Notification> {
        Self::fetch_notifications(self).await
    }

    async fn fetch_config(&self) -> Option<SystemConfig> {
        Self::fetch_config(self).await
    }
}

/// Outcome of one reconciliation tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Tick skipped entirely (offline or no backend configured)
    pub skipped: bool,
    /// Collections whose remote value differed from the applied one
    pub changed: Vec<CollectionKind>,
    /// Notifications that passed the cooldown gate
    pub notices: Vec<String>,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Rate limiter for change notifications, per collection.
#[derive(Debug)]
struct CooldownGate {
    window: Duration,
    last: HashMap<CollectionKind, Instant>,
}

impl CooldownGate {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Whether a notification for this collection may fire now; records
    /// the emission when permitted.
    fn permit(&mut self, kind: CollectionKind) -> bool {
        let now = Instant::now();
        if self
            .last
            .get(&kind)
            .is_some_and(|at| now.duration_since(*at) < self.window)
        {
            return false;
        }
        self.last.insert(kind, now);
        true
    }
}

/// Callback invoked with the full payload after any collection changed.
pub type ChangeCallback = Arc<dyn Fn(SnapshotPayload) + Send + Sync>;
/// Callback invoked with each cooldown-gated notification text.
pub type NoticeCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Periodic pull-based corrector for missed fan-out deliveries.
pub struct Reconciler {
    source: Arc<dyn RemoteSource>,
    connectivity: Arc<dyn ConnectivitySignal>,
    on_change: ChangeCallback,
    on_notice: NoticeCallback,
    interval: Duration,
    applied: Mutex<SnapshotPayload>,
    cooldowns: Mutex<CooldownGate>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        connectivity: Arc<dyn ConnectivitySignal>,
        on_change: impl Fn(SnapshotPayload) + Send + Sync + 'static,
        on_notice: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            connectivity,
            on_change: Arc::new(on_change),
            on_notice: Arc::new(on_notice),
            interval: RECONCILE_INTERVAL,
            applied: Mutex::new(SnapshotPayload::default()),
            cooldowns: Mutex::new(CooldownGate::new(NOTICE_COOLDOWN)),
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the notification cooldown window (tests use a tiny one).
    #[must_use]
    pub fn with_cooldown(self, window: Duration) -> Self {
        if let Ok(mut cooldowns) = self.cooldowns.lock() {
            *cooldowns = CooldownGate::new(window);
        }
        self
    }

    /// Seed the last-applied state, e.g. from the initial snapshot, so the
    /// first tick does not report everything as changed.
    pub fn seed(&self, payload: SnapshotPayload) {
        if let Ok(mut applied) = self.applied.lock() {
            *applied = payload;
        }
    }

    /// Run one pull-diff-apply cycle.
    pub async fn tick(&self) -> TickReport {
        if !self.connectivity.is_online() || !self.source.is_configured() {
            return TickReport::skipped();
        }

        let (bookings, candidates, users, notifications, config) = tokio::join!(
            self.source.fetch_bookings(),
            self.source.fetch_candidates(),
            self.source.fetch_users(),
            self.source.fetch_notifications(),
            self.source.fetch_config(),
        );

        let mut report = TickReport::default();
        let updated = {
            let Ok(mut applied) = self.applied.lock() else {
                return report;
            };

            if bookings != applied.bookings {
                report.changed.push(CollectionKind::Bookings);
                applied.bookings = bookings;
            }
            if candidates != applied.candidates {
                report.changed.push(CollectionKind::Candidates);
                applied.candidates = candidates;
            }
            if users != applied.users {
                report.changed.push(CollectionKind::Users);
                applied.users = users;
            }
            if notifications != applied.notifications {
                report.changed.push(CollectionKind::Notifications);
                applied.notifications = notifications;
            }
            // An absent config means "no remote data", not "reset to default".
            if let Some(config) = config {
                if config != applied.system_config {
                    report.changed.push(CollectionKind::SystemConfig);
                    applied.system_config = config;
                }
            }

            if report.changed.is_empty() {
                None
            } else {
                Some(applied.clone())
            }
        };

        if let Some(payload) = updated {
            for kind in &report.changed {
                let permitted = self
                    .cooldowns
                    .lock()
                    .is_ok_and(|mut gate| gate.permit(*kind));
                if permitted {
                    let text = notice_text(*kind, &payload);
                    (self.on_notice)(text.clone());
                    report.notices.push(text);
                }
            }
            tracing::debug!(changed = report.changed.len(), "Reconciliation applied remote changes");
            (self.on_change)(payload);
        }

        report
    }

    /// Start the repeating task. The first pull is immediate; ticks are
    /// skipped while offline, and an offline-to-online transition triggers
    /// an immediate pull rather than waiting out the interval.
    pub fn start(self: &Arc<Self>) -> ReconcilerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let this = Arc::clone(self);

        let task = tokio::spawn(async move {
            let poll = this.interval.min(Duration::from_secs(1));
            let mut was_online = false;
            let mut next_due = Instant::now();

            loop {
                let online = this.connectivity.is_online();
                if online && (!was_online || Instant::now() >= next_due) {
                    this.tick().await;
                    next_due = Instant::now() + this.interval;
                }
                was_online = online;

                tokio::select! {
                    () = tokio::time::sleep(poll) => {}
                    _ = stop_rx.changed() => break,
                }
            }
        });

        ReconcilerHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Handle for a running reconciliation task; dropping it does not stop the
/// task, calling [`stop`](Self::stop) does.
pub struct ReconcilerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Cancel pending and future ticks.
    pub fn stop(self) {
        self.stop.send(true).ok();
        self.task.abort();
    }
}

fn notice_text(kind: CollectionKind, payload: &SnapshotPayload) -> String {
    match kind {
        CollectionKind::Bookings => format!(
            "Booking calendar updated ({} entries)",
            payload.bookings.len()
        ),
        CollectionKind::Candidates => format!(
            "Candidate registry updated ({} entries)",
            payload.candidates.len()
        ),
        CollectionKind::Users => format!(
            "User directory updated ({} entries)",
            payload.users.len()
        ),
        CollectionKind::Notifications => format!(
            "Notifications updated ({} entries)",
            payload.notifications.len()
        ),
        CollectionKind::SystemConfig => "System configuration updated".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::sync::StaticConnectivity;

    #[derive(Default)]
    struct FakeSource {
        configured: bool,
        bookings: Mutex<Vec<Booking>>,
        candidates: Mutex<Vec<Candidate>>,
        users: Mutex<Vec<User>>,
        notifications: Mutex<Vec<Notification>>,
        config: Mutex<Option<SystemConfig>>,
    }

    impl FakeSource {
        fn configured() -> Self {
            Self {
                configured: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RemoteSource for FakeSource {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn fetch_bookings(&self) -> Vec<Booking> {
            self.bookings.lock().unwrap().clone()
        }

        async fn fetch_candidates(&self) -> Vec<Candidate> {
            self.candidates.lock().unwrap().clone()
        }

        async fn fetch_users(&self) -> Vec<User> {
            self.users.lock().unwrap().clone()
        }

        async fn fetch_notifications(&self) -> Vec<Notification> {
            self.notifications.lock().unwrap().clone()
        }

        async fn fetch_config(&self) -> Option<SystemConfig> {
            self.config.lock().unwrap().clone()
        }
    }

    fn reconciler(
        source: Arc<FakeSource>,
        online: bool,
    ) -> (Arc<Reconciler>, Arc<Mutex<Vec<String>>>) {
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        let recon = Reconciler::new(
            source,
            Arc::new(StaticConnectivity::new(online)),
            |_payload| {},
            move |text| sink.lock().unwrap().push(text),
        );
        (Arc::new(recon), notices)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_applies_remote_changes_once() {
        let source = Arc::new(FakeSource::configured());
        *source.candidates.lock().unwrap() =
            vec![Candidate::new("Ada", "ada@example.com", "Engineer")];
        *source.users.lock().unwrap() =
            vec![User::new("Grace", "grace@example.com", UserRole::Admin)];

        let (recon, notices) = reconciler(Arc::clone(&source), true);

        let first = recon.tick().await;
        assert!(!first.skipped);
        assert_eq!(
            first.changed,
            vec![CollectionKind::Candidates, CollectionKind::Users]
        );
        assert_eq!(first.notices.len(), 2);

        // Second tick with no intervening remote change: zero mutations,
        // zero notifications.
        let second = recon.tick().await;
        assert!(second.changed.is_empty());
        assert!(second.notices.is_empty());
        assert_eq!(notices.lock().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_skips_while_offline() {
        let source = Arc::new(FakeSource::configured());
        *source.bookings.lock().unwrap() = vec![Booking::new("c1", "Interview")];

        let (recon, notices) = reconciler(source, false);
        let report = recon.tick().await;
        assert!(report.skipped);
        assert!(notices.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_skips_without_backend() {
        let source = Arc::new(FakeSource::default()); // not configured
        let (recon, _notices) = reconciler(source, true);
        assert!(recon.tick().await.skipped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cooldown_suppresses_notification_storms() {
        let source = Arc::new(FakeSource::configured());
        *source.bookings.lock().unwrap() = vec![Booking::new("c1", "Interview")];

        let (recon, notices) = reconciler(Arc::clone(&source), true);

        let first = recon.tick().await;
        assert_eq!(first.notices.len(), 1);

        // Remote keeps changing within the cooldown window: state is still
        // applied, but no second notification fires.
        source
            .bookings
            .lock()
            .unwrap()
            .push(Booking::new("c2", "Second round"));
        let second = recon.tick().await;
        assert_eq!(second.changed, vec![CollectionKind::Bookings]);
        assert!(second.notices.is_empty());
        assert_eq!(notices.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seeded_state_is_not_reported_as_change() {
        let source = Arc::new(FakeSource::configured());
        let candidates = vec![Candidate::new("Ada", "ada@example.com", "Engineer")];
        *source.candidates.lock().unwrap() = candidates.clone();

        let (recon, _notices) = reconciler(source, true);
        recon.seed(SnapshotPayload {
            candidates,
            ..SnapshotPayload::default()
        });

        let report = recon.tick().await;
        assert!(report.changed.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn absent_remote_config_leaves_applied_config_alone() {
        let source = Arc::new(FakeSource::configured());
        let custom = SystemConfig {
            org_name: "Acme".to_string(),
            ..SystemConfig::default()
        };
        let (recon, _notices) = reconciler(source, true);
        recon.seed(SnapshotPayload {
            system_config: custom.clone(),
            ..SnapshotPayload::default()
        });

        recon.tick().await;
        assert_eq!(recon.applied.lock().unwrap().system_config, custom);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn handle_stops_the_loop() {
        let source = Arc::new(FakeSource::configured());
        let (recon, _notices) = reconciler(source, true);

        let handle = recon.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
    }
}
