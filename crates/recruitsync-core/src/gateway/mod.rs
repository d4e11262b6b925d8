//! Remote data gateway
//!
//! Translates between the application's entity shapes and the hosted
//! backend's row schema, exposing fetch/sync pairs per entity kind. Fetch
//! failures are logged and reported as "no remote data" (an empty list) so
//! the reconciliation loop stays resilient; push failures surface as
//! errors so the outbox can retain items for retry.
//!
//! With no backend configured, every function is an immediate no-op: the
//! whole system runs in fully local, single-device mode with zero behavior
//! change to callers.

mod rows;

pub use rows::{BookingRow, CandidateRow, ConfigRow, NotificationRow, UserRow};

use std::collections::HashSet;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Booking, Candidate, Notification, SystemConfig, User};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const HTTP_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Backend base URL (e.g. `https://api.example.com`)
    pub base_url: Option<String>,
    /// Bearer token sent with every request
    pub api_key: Option<String>,
}

impl GatewayConfig {
    /// Create a configured gateway config.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            api_key: Some(api_key.into()),
        }
    }

    /// A config with no backend; every gateway call becomes a no-op.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            base_url: None,
            api_key: None,
        }
    }

    /// Whether backend credentials are present and plausible.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        normalize_text_option(self.base_url.clone()).is_some_and(|url| is_http_url(&url))
    }
}

/// Per-entity fetch/upsert client against the hosted backend.
pub struct RemoteGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl RemoteGateway {
    /// Build a gateway from the given config.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { config, client })
    }

    /// Whether a remote backend is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn endpoint(&self, path: &str) -> Option<String> {
        let base = normalize_text_option(self.config.base_url.clone())?;
        if !is_http_url(&base) {
            return None;
        }
        Some(format!("{}/{path}", base.trim_end_matches('/')))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match normalize_text_option(self.config.api_key.clone()) {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Fetch all rows of a table. Errors are logged, not thrown; callers
    /// treat "empty" and "remote down" identically.
    async fn fetch_rows<R: DeserializeOwned>(&self, table: &str) -> Vec<R> {
        let Some(url) = self.endpoint(table) else {
            return Vec::new();
        };

        let result = async {
            let response = self.authorize(self.client.get(&url)).send().await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Gateway(format!(
                    "GET {table} returned HTTP {status}: {}",
                    compact_text(&body)
                )));
            }
            Ok(response.json::<Vec<R>>().await?)
        }
        .await;

        match result {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(%error, table, "Remote fetch failed, treating as no remote data");
                Vec::new()
            }
        }
    }

    /// Upsert rows keyed by primary id. No-op when unconfigured.
    async fn upsert_rows<R: Serialize>(&self, table: &str, rows: &[R]) -> Result<()> {
        let Some(url) = self.endpoint(&format!("{table}/upsert")) else {
            return Ok(());
        };
        if rows.is_empty() {
            return Ok(());
        }

        let response = self.authorize(self.client.post(&url)).json(rows).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!(
                "upsert {table} returned HTTP {status}: {}",
                compact_text(&body)
            )));
        }
        Ok(())
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<()> {
        let Some(url) = self.endpoint(&format!("{table}/{id}")) else {
            return Ok(());
        };

        let response = self.authorize(self.client.delete(&url)).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(Error::Gateway(format!(
                "delete {table}/{id} returned HTTP {status}"
            )));
        }
        Ok(())
    }

    pub async fn fetch_bookings(&self) -> Vec<Booking> {
        self.fetch_rows::<BookingRow>("bookings")
            .await
            .into_iter()
            .map(Booking::from)
            .collect()
    }

    /// Additive sync: upserts every row, never deletes remote rows absent
    /// from the list. Booking history must not vanish on a partial sync.
    pub async fn sync_bookings(&self, bookings: &[Booking]) -> Result<()> {
        let rows: Vec<BookingRow> = bookings.iter().map(BookingRow::from).collect();
        self.upsert_rows("bookings", &rows).await
    }

    pub async fn fetch_candidates(&self) -> Vec<Candidate> {
        self.fetch_rows::<CandidateRow>("candidates")
            .await
            .into_iter()
            .map(Candidate::from)
            .collect()
    }

    /// Additive sync, same rationale as bookings.
    pub async fn sync_candidates(&self, candidates: &[Candidate]) -> Result<()> {
        let rows: Vec<CandidateRow> = candidates.iter().map(CandidateRow::from).collect();
        self.upsert_rows("candidates", &rows).await
    }

    pub async fn fetch_users(&self) -> Vec<User> {
        self.fetch_rows::<UserRow>("users")
            .await
            .into_iter()
            .map(User::from)
            .collect()
    }

    /// Authoritative directory sync: upserts the given list, then deletes
    /// remote rows whose id is absent from it. User accounts are centrally
    /// administered and must not accumulate orphans.
    pub async fn sync_users(&self, users: &[User]) -> Result<()> {
        if !self.is_configured() {
            return Ok(());
        }

        let rows: Vec<UserRow> = users.iter().map(UserRow::from).collect();
        self.upsert_rows("users", &rows).await?;

        let remote_ids: Vec<String> = self
            .fetch_rows::<UserRow>("users")
            .await
            .into_iter()
            .map(|row| row.id)
            .collect();

        for id in directory_deletes(&remote_ids, users) {
            self.delete_row("users", &id).await?;
        }
        Ok(())
    }

    pub async fn fetch_notifications(&self) -> Vec<Notification> {
        self.fetch_rows::<NotificationRow>("notifications")
            .await
            .into_iter()
            .map(Notification::from)
            .collect()
    }

    /// Fetch the config singleton. `None` when unconfigured, missing, or on
    /// any error.
    pub async fn fetch_config(&self) -> Option<SystemConfig> {
        self.fetch_rows::<ConfigRow>("system_config")
            .await
            .into_iter()
            .find(|row| row.id == crate::models::CONFIG_SINGLETON_ID)
            .map(SystemConfig::from)
    }

    /// Upsert the config singleton row (fixed id).
    pub async fn sync_config(&self, config: &SystemConfig) -> Result<()> {
        self.upsert_rows("system_config", &[ConfigRow::from(config)])
            .await
    }
}

/// Remote directory ids that must be deleted to make the directory match
/// the local list.
///
/// Pure planning function for the destructive half of user sync; candidate
/// and booking sync have no analogue by design.
#[must_use]
pub fn directory_deletes(remote_ids: &[String], local: &[User]) -> Vec<String> {
    let keep: HashSet<&str> = local.iter().map(|user| user.id.as_str()).collect();
    remote_ids
        .iter()
        .filter(|id| !keep.contains(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            full_name: format!("User {id}"),
            email: format!("{id}@example.com"),
            role: UserRole::Recruiter,
            active: true,
        }
    }

    #[test]
    fn gateway_config_detects_configuration() {
        assert!(!GatewayConfig::disabled().is_configured());
        assert!(!GatewayConfig::new("", "key").is_configured());
        assert!(!GatewayConfig::new("api.example.com", "key").is_configured());
        assert!(GatewayConfig::new("https://api.example.com", "key").is_configured());
    }

    #[test]
    fn directory_deletes_targets_only_missing_ids() {
        let remote = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let local = vec![user("u1"), user("u3")];
        assert_eq!(directory_deletes(&remote, &local), vec!["u2".to_string()]);
    }

    #[test]
    fn directory_deletes_empty_when_directory_matches() {
        let remote = vec!["u1".to_string()];
        let local = vec![user("u1")];
        assert!(directory_deletes(&remote, &local).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unconfigured_gateway_is_a_no_op() {
        let gateway = RemoteGateway::new(GatewayConfig::disabled()).unwrap();
        assert!(!gateway.is_configured());

        assert!(gateway.fetch_bookings().await.is_empty());
        assert!(gateway.fetch_candidates().await.is_empty());
        assert!(gateway.fetch_users().await.is_empty());
        assert!(gateway.fetch_notifications().await.is_empty());
        assert!(gateway.fetch_config().await.is_none());

        // Destructive and additive sync alike: immediate Ok, no I/O.
        gateway.sync_bookings(&[]).await.unwrap();
        gateway.sync_candidates(&[]).await.unwrap();
        gateway.sync_users(&[user("u1")]).await.unwrap();
        gateway.sync_config(&SystemConfig::default()).await.unwrap();
    }
}
