//! User repository
//!
//! Users are keyed by the identity provider's `subject`. Copydesk never
//! stores credentials.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, ProvisionUserInput, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user, returning it with its assigned ID
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_subject(&self, subject: &str) -> Result<Option<User>>;

    /// Create the user for `subject`, or refresh its profile fields.
    ///
    /// The role is only taken from the input when the user is first created.
    async fn upsert_by_subject(&self, input: &ProvisionUserInput) -> Result<User>;

    /// List users ordered by ID, with the total count
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Change a user's role. Returns false if the user does not exist.
    async fn update_role(&self, id: i64, role: UserRole) -> Result<bool>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_sqlite(pool, UserKey::Id(id)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, UserKey::Id(id)).await,
        }
    }

    async fn get_by_subject(&self, subject: &str) -> Result<Option<User>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_user_sqlite(pool, UserKey::Subject(subject)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, UserKey::Subject(subject)).await,
        }
    }

    async fn upsert_by_subject(&self, input: &ProvisionUserInput) -> Result<User> {
        if let Some(existing) = self.get_by_subject(&input.subject).await? {
            let now = Utc::now();
            let sql = r#"
                UPDATE users SET username = ?, email = ?, display_name = ?, updated_at = ?
                WHERE id = ?
            "#;
            match self.pool.backend()? {
                Backend::Sqlite(pool) => {
                    sqlx::query(sql)
                        .bind(&input.username)
                        .bind(&input.email)
                        .bind(&input.display_name)
                        .bind(now)
                        .bind(existing.id)
                        .execute(pool)
                        .await
                        .context("Failed to refresh user profile")?;
                }
                Backend::Mysql(pool) => {
                    sqlx::query(sql)
                        .bind(&input.username)
                        .bind(&input.email)
                        .bind(&input.display_name)
                        .bind(now)
                        .bind(existing.id)
                        .execute(pool)
                        .await
                        .context("Failed to refresh user profile")?;
                }
            }
            return Ok(User {
                username: input.username.clone(),
                email: input.email.clone(),
                display_name: input.display_name.clone(),
                updated_at: now,
                ..existing
            });
        }

        let mut user = User::new(
            input.subject.clone(),
            input.username.clone(),
            input.email.clone(),
            input.role,
        );
        user.display_name = input.display_name.clone();
        self.create(&user).await
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_users_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_users_mysql(pool, params).await,
        }
    }

    async fn update_role(&self, id: i64, role: UserRole) -> Result<bool> {
        let sql = "UPDATE users SET role = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(role.to_string())
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update user role")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(role.to_string())
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update user role")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

const USER_COLUMNS: &str =
    "id, subject, username, email, display_name, role, created_at, updated_at";

/// Lookup key for a single user
#[derive(Clone, Copy)]
enum UserKey<'a> {
    Id(i64),
    Subject(&'a str),
}

impl UserKey<'_> {
    fn select_sql(&self) -> String {
        let column = match self {
            UserKey::Id(_) => "id",
            UserKey::Subject(_) => "subject",
        };
        format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (subject, username, email, display_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.subject)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(user.role.to_string())
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_sqlite(pool: &SqlitePool, key: UserKey<'_>) -> Result<Option<User>> {
    let sql = key.select_sql();
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Subject(subject) => query.bind(subject),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.map(|r| row_to_user_sqlite(&r)).transpose()
}

async fn list_users_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<(Vec<User>, i64)> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user_sqlite).collect::<Result<Vec<_>>>()?;
    Ok((users, total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        subject: row.get("subject"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (subject, username, email, display_name, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.subject)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(user.role.to_string())
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn get_user_mysql(pool: &MySqlPool, key: UserKey<'_>) -> Result<Option<User>> {
    let sql = key.select_sql();
    let query = sqlx::query(&sql);
    let query = match key {
        UserKey::Id(id) => query.bind(id),
        UserKey::Subject(subject) => query.bind(subject),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.map(|r| row_to_user_mysql(&r)).transpose()
}

async fn list_users_mysql(pool: &MySqlPool, params: &ListParams) -> Result<(Vec<User>, i64)> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user_mysql).collect::<Result<Vec<_>>>()?;
    Ok((users, total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        subject: row.get("subject"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn provision(subject: &str, role: UserRole) -> ProvisionUserInput {
        ProvisionUserInput {
            subject: subject.to_string(),
            username: format!("{}-name", subject),
            email: format!("{}@example.com", subject),
            display_name: None,
            role,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_test_repo().await;
        let user = User::new(
            "sub-1".to_string(),
            "alice".to_string(),
            "alice@example.com".to_string(),
            UserRole::Reviewer,
        );
        let created = repo.create(&user).await.unwrap();
        assert!(created.id > 0);

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.username, "alice");
        assert_eq!(fetched.role, UserRole::Reviewer);

        let by_subject = repo.get_by_subject("sub-1").await.unwrap().unwrap();
        assert_eq!(by_subject.id, created.id);
        assert!(repo.get_by_subject("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_refreshes_profile_but_keeps_role() {
        let repo = setup_test_repo().await;
        let first = repo
            .upsert_by_subject(&provision("sub-9", UserRole::Editor))
            .await
            .unwrap();
        assert_eq!(first.role, UserRole::Editor);

        let mut again = provision("sub-9", UserRole::Author);
        again.email = "changed@example.com".to_string();
        let second = repo.upsert_by_subject(&again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.email, "changed@example.com");
        assert_eq!(second.role, UserRole::Editor);

        let stored = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "changed@example.com");
    }

    #[tokio::test]
    async fn test_list_and_update_role() {
        let repo = setup_test_repo().await;
        for i in 0..3 {
            repo.upsert_by_subject(&provision(&format!("s{}", i), UserRole::Author))
                .await
                .unwrap();
        }

        let (users, total) = repo.list(&ListParams::new(1, 2)).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(users.len(), 2);

        assert!(repo.update_role(users[0].id, UserRole::Admin).await.unwrap());
        assert!(!repo.update_role(999, UserRole::Admin).await.unwrap());
        let updated = repo.get_by_id(users[0].id).await.unwrap().unwrap();
        assert!(updated.is_admin());
    }
}
