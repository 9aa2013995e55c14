//! Content repository
//!
//! Storage for content items, including filtered listing, search and the
//! per-status counts used by analytics.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Content, ContentFilter, ContentStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Content repository trait
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert new content, returning it with its assigned ID
    async fn create(&self, content: &Content) -> Result<Content>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Content>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Content>>;

    /// Persist edited fields (title, slug, body, body_html, assignee, version)
    async fn update(&self, content: &Content) -> Result<bool>;

    /// Set the workflow status. `published_at` is written as given.
    async fn update_status(
        &self,
        id: i64,
        status: ContentStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Filtered page of content, newest first, with the total match count
    async fn list(&self, filter: &ContentFilter, params: &ListParams)
        -> Result<(Vec<Content>, i64)>;

    /// Number of content items per status. Statuses with no content are omitted.
    async fn count_by_status(&self) -> Result<Vec<(ContentStatus, i64)>>;
}

/// SQLx-based content repository implementation
pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn create(&self, content: &Content) -> Result<Content> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_content_sqlite(pool, content).await,
            Backend::Mysql(pool) => create_content_mysql(pool, content).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Content>> {
        let sql = format!("SELECT {} FROM contents WHERE id = ?", CONTENT_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get content by ID")?
                .map(|r| row_to_content_sqlite(&r))
                .transpose(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get content by ID")?
                .map(|r| row_to_content_mysql(&r))
                .transpose(),
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Content>> {
        let sql = format!("SELECT {} FROM contents WHERE slug = ?", CONTENT_COLUMNS);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get content by slug")?
                .map(|r| row_to_content_sqlite(&r))
                .transpose(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
                .context("Failed to get content by slug")?
                .map(|r| row_to_content_mysql(&r))
                .transpose(),
        }
    }

    async fn update(&self, content: &Content) -> Result<bool> {
        let sql = r#"
            UPDATE contents
            SET title = ?, slug = ?, body = ?, body_html = ?, assignee_id = ?,
                version = ?, updated_at = ?
            WHERE id = ?
        "#;
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&content.title)
                .bind(&content.slug)
                .bind(&content.body)
                .bind(&content.body_html)
                .bind(content.assignee_id)
                .bind(content.version)
                .bind(content.updated_at)
                .bind(content.id)
                .execute(pool)
                .await
                .context("Failed to update content")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&content.title)
                .bind(&content.slug)
                .bind(&content.body)
                .bind(&content.body_html)
                .bind(content.assignee_id)
                .bind(content.version)
                .bind(content.updated_at)
                .bind(content.id)
                .execute(pool)
                .await
                .context("Failed to update content")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ContentStatus,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let sql = "UPDATE contents SET status = ?, published_at = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(status.to_string())
                .bind(published_at)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update content status")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(status.to_string())
                .bind(published_at)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update content status")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM contents WHERE id = ?";
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete content")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete content")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list(
        &self,
        filter: &ContentFilter,
        params: &ListParams,
    ) -> Result<(Vec<Content>, i64)> {
        let clause = FilterClause::from_filter(filter);
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_contents_sqlite(pool, &clause, params).await,
            Backend::Mysql(pool) => list_contents_mysql(pool, &clause, params).await,
        }
    }

    async fn count_by_status(&self) -> Result<Vec<(ContentStatus, i64)>> {
        let sql = "SELECT status, COUNT(*) AS count FROM contents GROUP BY status";
        let pairs: Vec<(String, i64)> = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await
                .context("Failed to count contents by status")?
                .iter()
                .map(|r| (r.get("status"), r.get("count")))
                .collect(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await
                .context("Failed to count contents by status")?
                .iter()
                .map(|r| (r.get("status"), r.get("count")))
                .collect(),
        };

        pairs
            .into_iter()
            .map(|(status, count)| {
                let status = ContentStatus::from_str(&status)
                    .with_context(|| format!("Invalid content status in database: {}", status))?;
                Ok((status, count))
            })
            .collect()
    }
}

const CONTENT_COLUMNS: &str = "id, slug, title, body, body_html, status, author_id, assignee_id, \
     version, published_at, created_at, updated_at";

const INSERT_CONTENT: &str = r#"
    INSERT INTO contents (slug, title, body, body_html, status, author_id, assignee_id,
                          version, published_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// WHERE clause for a content filter, with its bind values in order
struct FilterClause {
    sql: String,
    status: Option<String>,
    author_id: Option<i64>,
    pattern: Option<String>,
}

impl FilterClause {
    fn from_filter(filter: &ContentFilter) -> Self {
        let mut conditions = Vec::new();
        if filter.status.is_some() {
            conditions.push("status = ?");
        }
        if filter.author_id.is_some() {
            conditions.push("author_id = ?");
        }
        let pattern = filter
            .search_term()
            .map(|term| format!("%{}%", escape_like(&term)));
        if pattern.is_some() {
            conditions.push("(LOWER(title) LIKE ? ESCAPE '!' OR LOWER(body) LIKE ? ESCAPE '!')");
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        Self {
            sql,
            status: filter.status.map(|s| s.to_string()),
            author_id: filter.author_id,
            pattern,
        }
    }
}

/// Escape LIKE wildcards so the term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_content_sqlite(pool: &SqlitePool, content: &Content) -> Result<Content> {
    let result = sqlx::query(INSERT_CONTENT)
        .bind(&content.slug)
        .bind(&content.title)
        .bind(&content.body)
        .bind(&content.body_html)
        .bind(content.status.to_string())
        .bind(content.author_id)
        .bind(content.assignee_id)
        .bind(content.version)
        .bind(content.published_at)
        .bind(content.created_at)
        .bind(content.updated_at)
        .execute(pool)
        .await
        .context("Failed to create content")?;

    Ok(Content {
        id: result.last_insert_rowid(),
        ..content.clone()
    })
}

fn bind_filter_sqlite<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    clause: &'q FilterClause,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    if let Some(status) = &clause.status {
        query = query.bind(status);
    }
    if let Some(author_id) = clause.author_id {
        query = query.bind(author_id);
    }
    if let Some(pattern) = &clause.pattern {
        query = query.bind(pattern).bind(pattern);
    }
    query
}

async fn list_contents_sqlite(
    pool: &SqlitePool,
    clause: &FilterClause,
    params: &ListParams,
) -> Result<(Vec<Content>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM contents {}", clause.sql);
    let total: i64 = bind_filter_sqlite(sqlx::query(&count_sql), clause)
        .fetch_one(pool)
        .await
        .context("Failed to count contents")?
        .get("count");

    let sql = format!(
        "SELECT {} FROM contents {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        CONTENT_COLUMNS, clause.sql
    );
    let rows = bind_filter_sqlite(sqlx::query(&sql), clause)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list contents")?;

    let items = rows.iter().map(row_to_content_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((items, total))
}

fn row_to_content_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Content> {
    let status_str: String = row.get("status");
    let status = ContentStatus::from_str(&status_str)
        .with_context(|| format!("Invalid content status in database: {}", status_str))?;

    Ok(Content {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        body: row.get("body"),
        body_html: row.get("body_html"),
        status,
        author_id: row.get("author_id"),
        assignee_id: row.get("assignee_id"),
        version: row.get("version"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_content_mysql(pool: &MySqlPool, content: &Content) -> Result<Content> {
    let result = sqlx::query(INSERT_CONTENT)
        .bind(&content.slug)
        .bind(&content.title)
        .bind(&content.body)
        .bind(&content.body_html)
        .bind(content.status.to_string())
        .bind(content.author_id)
        .bind(content.assignee_id)
        .bind(content.version)
        .bind(content.published_at)
        .bind(content.created_at)
        .bind(content.updated_at)
        .execute(pool)
        .await
        .context("Failed to create content")?;

    Ok(Content {
        id: result.last_insert_id() as i64,
        ..content.clone()
    })
}

fn bind_filter_mysql<'q>(
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    clause: &'q FilterClause,
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    if let Some(status) = &clause.status {
        query = query.bind(status);
    }
    if let Some(author_id) = clause.author_id {
        query = query.bind(author_id);
    }
    if let Some(pattern) = &clause.pattern {
        query = query.bind(pattern).bind(pattern);
    }
    query
}

async fn list_contents_mysql(
    pool: &MySqlPool,
    clause: &FilterClause,
    params: &ListParams,
) -> Result<(Vec<Content>, i64)> {
    let count_sql = format!("SELECT COUNT(*) AS count FROM contents {}", clause.sql);
    let total: i64 = bind_filter_mysql(sqlx::query(&count_sql), clause)
        .fetch_one(pool)
        .await
        .context("Failed to count contents")?
        .get("count");

    let sql = format!(
        "SELECT {} FROM contents {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        CONTENT_COLUMNS, clause.sql
    );
    let rows = bind_filter_mysql(sqlx::query(&sql), clause)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list contents")?;

    let items = rows.iter().map(row_to_content_mysql).collect::<Result<Vec<_>>>()?;
    Ok((items, total))
}

fn row_to_content_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Content> {
    let status_str: String = row.get("status");
    let status = ContentStatus::from_str(&status_str)
        .with_context(|| format!("Invalid content status in database: {}", status_str))?;

    Ok(Content {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        body: row.get("body"),
        body_html: row.get("body_html"),
        status,
        author_id: row.get("author_id"),
        assignee_id: row.get("assignee_id"),
        version: row.get("version"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
