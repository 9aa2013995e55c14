//! Analytics summary
//!
//! Counts over contents and approvals, cached for the configured TTL.
//! Every content or approval mutation calls [`invalidate`].

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{ApprovalRepository, ContentRepository};
use crate::models::{ApprovalStatus, ContentStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const SUMMARY_KEY: &str = "analytics:summary";
const ANALYTICS_PATTERN: &str = "analytics:*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_contents: i64,
    /// Every content status, zero when unused
    pub contents_by_status: BTreeMap<String, i64>,
    /// Every approval status, zero when unused
    pub approvals_by_status: BTreeMap<String, i64>,
    /// Reviewers with at least one pending approval
    pub active_reviewers: i64,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalyticsService {
    contents: Arc<dyn ContentRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    cache: Arc<Cache>,
}

impl AnalyticsService {
    pub fn new(
        contents: Arc<dyn ContentRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            contents,
            approvals,
            cache,
        }
    }

    pub async fn summary(&self) -> Result<AnalyticsSummary> {
        if let Some(cached) = self.cache.get::<AnalyticsSummary>(SUMMARY_KEY).await.ok().flatten() {
            return Ok(cached);
        }

        let since = self.cache.generation();
        let summary = self.compute().await?;
        self.store(&summary, since).await;
        Ok(summary)
    }

    async fn compute(&self) -> Result<AnalyticsSummary> {
        let mut contents_by_status: BTreeMap<String, i64> =
            ContentStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect();
        let mut total_contents = 0;
        for (status, count) in self
            .contents
            .count_by_status()
            .await
            .context("Failed to count contents")?
        {
            total_contents += count;
            contents_by_status.insert(status.to_string(), count);
        }

        let mut approvals_by_status: BTreeMap<String, i64> =
            ApprovalStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect();
        for (status, count) in self
            .approvals
            .count_by_status()
            .await
            .context("Failed to count approvals")?
        {
            approvals_by_status.insert(status.to_string(), count);
        }

        let summary = AnalyticsSummary {
            total_contents,
            contents_by_status,
            approvals_by_status,
            active_reviewers: self
                .approvals
                .count_reviewers_with_pending()
                .await
                .context("Failed to count active reviewers")?,
            generated_at: Utc::now(),
        };
        Ok(summary)
    }

    /// Cache `summary` unless a write invalidated analytics after `since`
    async fn store(&self, summary: &AnalyticsSummary, since: u64) {
        match self
            .cache
            .set_unless_invalidated(SUMMARY_KEY, summary, self.cache.default_ttl(), since)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Analytics invalidated while computing; not cached"),
            Err(e) => tracing::warn!("Failed to cache analytics summary: {}", e),
        }
    }
}

/// Drop cached analytics after a write
pub async fn invalidate(cache: &Cache) {
    if let Err(e) = cache.delete_pattern(ANALYTICS_PATTERN).await {
        tracing::warn!("Failed to invalidate analytics cache: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{SqlxApprovalRepository, SqlxContentRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup() -> (AnalyticsService, DynDatabasePool, Arc<Cache>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let cache = create_cache(&CacheConfig::default());
        let service = AnalyticsService::new(
            SqlxContentRepository::boxed(pool.clone()),
            SqlxApprovalRepository::boxed(pool.clone()),
            cache.clone(),
        );
        (service, pool, cache)
    }

    async fn seed(pool: &DynDatabasePool) {
        let now = Utc::now();
        let sqlite = pool.as_sqlite().unwrap();
        for id in 1..=2 {
            sqlx::query(
                "INSERT INTO users (id, subject, username, email, role, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, 'reviewer', ?, ?)",
            )
            .bind(id)
            .bind(format!("s{}", id))
            .bind(format!("u{}", id))
            .bind(format!("u{}@example.com", id))
            .bind(now)
            .bind(now)
            .execute(sqlite)
            .await
            .unwrap();
        }
        for (id, status) in [(1, "in_review"), (2, "in_review"), (3, "draft")] {
            sqlx::query(
                "INSERT INTO contents (id, slug, title, body, body_html, status, author_id, \
                 version, created_at, updated_at) VALUES (?, ?, 'T', '', '', ?, 1, 1, ?, ?)",
            )
            .bind(id)
            .bind(format!("c{}", id))
            .bind(status)
            .bind(now)
            .bind(now)
            .execute(sqlite)
            .await
            .unwrap();
        }
        for (content_id, reviewer_id, status) in [(1, 1, "pending"), (2, 1, "approved"), (2, 2, "pending")] {
            sqlx::query(
                "INSERT INTO approvals (content_id, reviewer_id, status, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(content_id)
            .bind(reviewer_id)
            .bind(status)
            .bind(now)
            .bind(now)
            .execute(sqlite)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let (service, pool, _cache) = setup().await;
        seed(&pool).await;

        let summary = service.summary().await.unwrap();
        assert_eq!(summary.total_contents, 3);
        assert_eq!(summary.contents_by_status["in_review"], 2);
        assert_eq!(summary.contents_by_status["draft"], 1);
        assert_eq!(summary.contents_by_status["published"], 0);
        assert_eq!(summary.approvals_by_status["pending"], 2);
        assert_eq!(summary.approvals_by_status["approved"], 1);
        assert_eq!(summary.approvals_by_status["rejected"], 0);
        assert_eq!(summary.active_reviewers, 2);
    }

    #[tokio::test]
    async fn test_summary_is_cached_until_invalidated() {
        let (service, pool, cache) = setup().await;
        let empty = service.summary().await.unwrap();
        assert_eq!(empty.total_contents, 0);

        seed(&pool).await;
        let cached = service.summary().await.unwrap();
        assert_eq!(cached.total_contents, 0);

        invalidate(&cache).await;
        let fresh = service.summary().await.unwrap();
        assert_eq!(fresh.total_contents, 3);
    }

    #[tokio::test]
    async fn test_summary_invalidated_mid_computation_is_not_cached() {
        let (service, pool, cache) = setup().await;

        let since = cache.generation();
        let stale = service.compute().await.unwrap();
        seed(&pool).await;
        invalidate(&cache).await;
        service.store(&stale, since).await;

        assert!(cache.get::<AnalyticsSummary>(SUMMARY_KEY).await.unwrap().is_none());
        let fresh = service.summary().await.unwrap();
        assert_eq!(fresh.total_contents, 3);
    }
}
