//! Approval repository
//!
//! At most one approval exists per (content, reviewer); writes go through
//! [`ApprovalRepository::upsert`] so repeated invitations or bulk verdicts
//! update the existing row.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Approval, ApprovalStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Approval repository trait
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<Approval>>;

    async fn get_for_reviewer(&self, content_id: i64, reviewer_id: i64)
        -> Result<Option<Approval>>;

    /// All approvals of a content item, oldest first
    async fn list_by_content(&self, content_id: i64) -> Result<Vec<Approval>>;

    /// Pending approvals assigned to a reviewer, oldest first
    async fn list_pending_for_reviewer(&self, reviewer_id: i64) -> Result<Vec<Approval>>;

    /// Insert the approval for (content, reviewer) or overwrite its status and comment
    async fn upsert(
        &self,
        content_id: i64,
        reviewer_id: i64,
        status: ApprovalStatus,
        comment: Option<&str>,
    ) -> Result<Approval>;

    /// Record a verdict on an existing approval
    async fn update_verdict(
        &self,
        id: i64,
        status: ApprovalStatus,
        comment: Option<&str>,
    ) -> Result<bool>;

    /// Number of approvals per status
    async fn count_by_status(&self) -> Result<Vec<(ApprovalStatus, i64)>>;

    /// Distinct reviewers with at least one pending approval
    async fn count_reviewers_with_pending(&self) -> Result<i64>;
}

/// SQLx-based approval repository implementation
pub struct SqlxApprovalRepository {
    pool: DynDatabasePool,
}

impl SqlxApprovalRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ApprovalRepository> {
        Arc::new(Self::new(pool))
    }
}

const APPROVAL_COLUMNS: &str =
    "id, content_id, reviewer_id, status, comment, created_at, updated_at";

#[async_trait]
impl ApprovalRepository for SqlxApprovalRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Approval>> {
        let sql = format!("SELECT {} FROM approvals WHERE id = ?", APPROVAL_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get approval")?
                .map(|r| row_to_approval_sqlite(&r))
                .transpose(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get approval")?
                .map(|r| row_to_approval_mysql(&r))
                .transpose(),
        }
    }

    async fn get_for_reviewer(
        &self,
        content_id: i64,
        reviewer_id: i64,
    ) -> Result<Option<Approval>> {
        let sql = format!(
            "SELECT {} FROM approvals WHERE content_id = ? AND reviewer_id = ?",
            APPROVAL_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(content_id)
                .bind(reviewer_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get approval for reviewer")?
                .map(|r| row_to_approval_sqlite(&r))
                .transpose(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(content_id)
                .bind(reviewer_id)
                .fetch_optional(pool)
                .await
                .context("Failed to get approval for reviewer")?
                .map(|r| row_to_approval_mysql(&r))
                .transpose(),
        }
    }

    async fn list_by_content(&self, content_id: i64) -> Result<Vec<Approval>> {
        let sql = format!(
            "SELECT {} FROM approvals WHERE content_id = ? ORDER BY id",
            APPROVAL_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(content_id)
                .fetch_all(pool)
                .await
                .context("Failed to list approvals")?
                .iter()
                .map(row_to_approval_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(content_id)
                .fetch_all(pool)
                .await
                .context("Failed to list approvals")?
                .iter()
                .map(row_to_approval_mysql)
                .collect(),
        }
    }

    async fn list_pending_for_reviewer(&self, reviewer_id: i64) -> Result<Vec<Approval>> {
        let sql = format!(
            "SELECT {} FROM approvals WHERE reviewer_id = ? AND status = 'pending' ORDER BY id",
            APPROVAL_COLUMNS
        );
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(reviewer_id)
                .fetch_all(pool)
                .await
                .context("Failed to list pending approvals")?
                .iter()
                .map(row_to_approval_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(reviewer_id)
                .fetch_all(pool)
                .await
                .context("Failed to list pending approvals")?
                .iter()
                .map(row_to_approval_mysql)
                .collect(),
        }
    }

    async fn upsert(
        &self,
        content_id: i64,
        reviewer_id: i64,
        status: ApprovalStatus,
        comment: Option<&str>,
    ) -> Result<Approval> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => {
                upsert_approval_sqlite(pool, content_id, reviewer_id, status, comment).await?
            }
            Backend::Mysql(pool) => {
                upsert_approval_mysql(pool, content_id, reviewer_id, status, comment).await?
            }
        }

        self.get_for_reviewer(content_id, reviewer_id)
            .await?
            .context("Approval missing after upsert")
    }

    async fn update_verdict(
        &self,
        id: i64,
        status: ApprovalStatus,
        comment: Option<&str>,
    ) -> Result<bool> {
        let sql = "UPDATE approvals SET status = ?, comment = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(status.to_string())
                .bind(comment)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update approval")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(status.to_string())
                .bind(comment)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update approval")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count_by_status(&self) -> Result<Vec<(ApprovalStatus, i64)>> {
        let sql = "SELECT status, COUNT(*) AS count FROM approvals GROUP BY status";
        let pairs: Vec<(String, i64)> = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await
                .context("Failed to count approvals by status")?
                .iter()
                .map(|r| (r.get("status"), r.get("count")))
                .collect(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await
                .context("Failed to count approvals by status")?
                .iter()
                .map(|r| (r.get("status"), r.get("count")))
                .collect(),
        };

        pairs
            .into_iter()
            .map(|(status, count)| {
                let status = ApprovalStatus::from_str(&status)
                    .with_context(|| format!("Invalid approval status in database: {}", status))?;
                Ok((status, count))
            })
            .collect()
    }

    async fn count_reviewers_with_pending(&self) -> Result<i64> {
        let sql = "SELECT COUNT(DISTINCT reviewer_id) AS count FROM approvals WHERE status = 'pending'";
        let count = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count active reviewers")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count active reviewers")?
                .get("count"),
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_approval_sqlite(
    pool: &SqlitePool,
    content_id: i64,
    reviewer_id: i64,
    status: ApprovalStatus,
    comment: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO approvals (content_id, reviewer_id, status, comment, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (content_id, reviewer_id) DO UPDATE SET
            status = excluded.status,
            comment = excluded.comment,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(content_id)
    .bind(reviewer_id)
    .bind(status.to_string())
    .bind(comment)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert approval")?;

    Ok(())
}

fn row_to_approval_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Approval> {
    let status_str: String = row.get("status");
    let status = ApprovalStatus::from_str(&status_str)
        .with_context(|| format!("Invalid approval status in database: {}", status_str))?;

    Ok(Approval {
        id: row.get("id"),
        content_id: row.get("content_id"),
        reviewer_id: row.get("reviewer_id"),
        status,
        comment: row.get("comment"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_approval_mysql(
    pool: &MySqlPool,
    content_id: i64,
    reviewer_id: i64,
    status: ApprovalStatus,
    comment: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO approvals (content_id, reviewer_id, status, comment, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            status = VALUES(status),
            comment = VALUES(comment),
            updated_at = VALUES(updated_at)
        "#,
    )
    .bind(content_id)
    .bind(reviewer_id)
    .bind(status.to_string())
    .bind(comment)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert approval")?;

    Ok(())
}

fn row_to_approval_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Approval> {
    let status_str: String = row.get("status");
    let status = ApprovalStatus::from_str(&status_str)
        .with_context(|| format!("Invalid approval status in database: {}", status_str))?;

    Ok(Approval {
        id: row.get("id"),
        content_id: row.get("content_id"),
        reviewer_id: row.get("reviewer_id"),
        status,
        comment: row.get("comment"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (SqlxApprovalRepository, DynDatabasePool) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let now = Utc::now();
        let sqlite = pool.as_sqlite().expect("sqlite pool");
        for id in 1..=3 {
            sqlx::query(
                "INSERT INTO users (id, subject, username, email, role, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, 'reviewer', ?, ?)",
            )
            .bind(id)
            .bind(format!("sub{}", id))
            .bind(format!("user{}", id))
            .bind(format!("user{}@example.com", id))
            .bind(now)
            .bind(now)
            .execute(sqlite)
            .await
            .expect("Failed to insert user");
        }
        for id in 1..=2 {
            sqlx::query(
                "INSERT INTO contents (id, slug, title, body, body_html, status, author_id, \
                 version, created_at, updated_at) VALUES (?, ?, 'T', '', '', 'in_review', 1, 1, ?, ?)",
            )
            .bind(id)
            .bind(format!("c{}", id))
            .bind(now)
            .bind(now)
            .execute(sqlite)
            .await
            .expect("Failed to insert content");
        }

        (SqlxApprovalRepository::new(pool.clone()), pool)
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_row_per_reviewer() {
        let (repo, _pool) = setup().await;
        let first = repo.upsert(1, 2, ApprovalStatus::Pending, None).await.unwrap();
        let second = repo
            .upsert(1, 2, ApprovalStatus::Rejected, Some("typos"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, ApprovalStatus::Rejected);
        assert_eq!(second.comment.as_deref(), Some("typos"));
        assert_eq!(repo.list_by_content(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_verdict() {
        let (repo, _pool) = setup().await;
        let approval = repo.upsert(1, 2, ApprovalStatus::Pending, None).await.unwrap();

        assert!(repo
            .update_verdict(approval.id, ApprovalStatus::Approved, Some("lgtm"))
            .await
            .unwrap());
        assert!(!repo
            .update_verdict(999, ApprovalStatus::Approved, None)
            .await
            .unwrap());

        let fetched = repo.get_by_id(approval.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_pending_queries_and_counts() {
        let (repo, _pool) = setup().await;
        repo.upsert(1, 2, ApprovalStatus::Pending, None).await.unwrap();
        repo.upsert(2, 2, ApprovalStatus::Pending, None).await.unwrap();
        repo.upsert(1, 3, ApprovalStatus::Approved, None).await.unwrap();

        assert_eq!(repo.list_pending_for_reviewer(2).await.unwrap().len(), 2);
        assert!(repo.list_pending_for_reviewer(3).await.unwrap().is_empty());
        assert_eq!(repo.count_reviewers_with_pending().await.unwrap(), 1);

        let mut counts = repo.count_by_status().await.unwrap();
        counts.sort_by_key(|(status, _)| status.to_string());
        assert_eq!(
            counts,
            vec![(ApprovalStatus::Approved, 1), (ApprovalStatus::Pending, 2)]
        );
    }

    #[tokio::test]
    async fn test_approvals_cascade_with_content() {
        let (repo, pool) = setup().await;
        repo.upsert(1, 2, ApprovalStatus::Pending, None).await.unwrap();
        pool.execute("DELETE FROM contents WHERE id = 1").await.unwrap();
        assert!(repo.list_by_content(1).await.unwrap().is_empty());
    }
}
