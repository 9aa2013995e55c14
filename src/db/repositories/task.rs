//! Task repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::Task;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Task repository trait
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> Result<Task>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Task>>;

    /// Tasks of a project grouped by column, each column in board order
    async fn list_by_project(&self, project_id: i64) -> Result<Vec<Task>>;

    /// Tasks in one column ordered by status_order, then id
    async fn list_by_column(&self, column_id: i64) -> Result<Vec<Task>>;

    /// Persist every mutable field, including column and status_order
    async fn update(&self, task: &Task) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based task repository implementation
pub struct SqlxTaskRepository {
    pool: DynDatabasePool,
}

impl SqlxTaskRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TaskRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_where(&self, predicate: &str, key: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY column_id, status_order, id",
            TASK_COLUMNS, predicate
        );
        let tasks = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(key)
                .fetch_all(pool)
                .await
                .context("Failed to query tasks")?
                .iter()
                .map(row_to_task_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(key)
                .fetch_all(pool)
                .await
                .context("Failed to query tasks")?
                .iter()
                .map(row_to_task_mysql)
                .collect(),
        };
        Ok(tasks)
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create(&self, task: &Task) -> Result<Task> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_task_sqlite(pool, task).await,
            Backend::Mysql(pool) => create_task_mysql(pool, task).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Task>> {
        Ok(self.fetch_where("id = ?", id).await?.into_iter().next())
    }

    async fn list_by_project(&self, project_id: i64) -> Result<Vec<Task>> {
        self.fetch_where("project_id = ?", project_id).await
    }

    async fn list_by_column(&self, column_id: i64) -> Result<Vec<Task>> {
        self.fetch_where("column_id = ?", column_id).await
    }

    async fn update(&self, task: &Task) -> Result<bool> {
        let sql = r#"
            UPDATE tasks
            SET column_id = ?, list_id = ?, title = ?, description = ?, assignee_id = ?,
                status_order = ?, updated_at = ?
            WHERE id = ?
        "#;
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(task.column_id)
                .bind(task.list_id)
                .bind(&task.title)
                .bind(&task.description)
                .bind(task.assignee_id)
                .bind(task.status_order)
                .bind(task.updated_at)
                .bind(task.id)
                .execute(pool)
                .await
                .context("Failed to update task")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(task.column_id)
                .bind(task.list_id)
                .bind(&task.title)
                .bind(&task.description)
                .bind(task.assignee_id)
                .bind(task.status_order)
                .bind(task.updated_at)
                .bind(task.id)
                .execute(pool)
                .await
                .context("Failed to update task")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM tasks WHERE id = ?";
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete task")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete task")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

const TASK_COLUMNS: &str = "id, project_id, column_id, list_id, title, description, \
     assignee_id, status_order, created_at, updated_at";

const INSERT_TASK: &str = r#"
    INSERT INTO tasks (project_id, column_id, list_id, title, description, assignee_id,
                       status_order, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_task_sqlite(pool: &SqlitePool, task: &Task) -> Result<Task> {
    let result = sqlx::query(INSERT_TASK)
        .bind(task.project_id)
        .bind(task.column_id)
        .bind(task.list_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assignee_id)
        .bind(task.status_order)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(pool)
        .await
        .context("Failed to create task")?;

    Ok(Task {
        id: result.last_insert_rowid(),
        ..task.clone()
    })
}

fn row_to_task_sqlite(row: &sqlx::sqlite::SqliteRow) -> Task {
    Task {
        id: row.get("id"),
        project_id: row.get("project_id"),
        column_id: row.get("column_id"),
        list_id: row.get("list_id"),
        title: row.get("title"),
        description: row.get("description"),
        assignee_id: row.get("assignee_id"),
        status_order: row.get("status_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_task_mysql(pool: &MySqlPool, task: &Task) -> Result<Task> {
    let result = sqlx::query(INSERT_TASK)
        .bind(task.project_id)
        .bind(task.column_id)
        .bind(task.list_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assignee_id)
        .bind(task.status_order)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(pool)
        .await
        .context("Failed to create task")?;

    Ok(Task {
        id: result.last_insert_id() as i64,
        ..task.clone()
    })
}

fn row_to_task_mysql(row: &sqlx::mysql::MySqlRow) -> Task {
    Task {
        id: row.get("id"),
        project_id: row.get("project_id"),
        column_id: row.get("column_id"),
        list_id: row.get("list_id"),
        title: row.get("title"),
        description: row.get("description"),
        assignee_id: row.get("assignee_id"),
        status_order: row.get("status_order"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{BoardRepository, SqlxBoardRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Column, Project};
    use chrono::Utc;

    struct Fixture {
        repo: SqlxTaskRepository,
        project_id: i64,
        todo: i64,
        done: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let board = SqlxBoardRepository::new(pool.clone());
        let now = Utc::now();
        let project = board
            .create_project(&Project {
                id: 0,
                name: "p".to_string(),
                description: None,
                position: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for (name, position) in [("todo", 0), ("done", 1000)] {
            let column = board
                .create_column(&Column {
                    id: 0,
                    project_id: project.id,
                    name: name.to_string(),
                    position,
                    created_at: now,
                })
                .await
                .unwrap();
            ids.push(column.id);
        }
        Fixture {
            repo: SqlxTaskRepository::new(pool),
            project_id: project.id,
            todo: ids[0],
            done: ids[1],
        }
    }

    fn task(f: &Fixture, column_id: i64, title: &str, status_order: i64) -> Task {
        let now = Utc::now();
        Task {
            id: 0,
            project_id: f.project_id,
            column_id,
            list_id: None,
            title: title.to_string(),
            description: None,
            assignee_id: None,
            status_order,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_by_column_orders_by_key_then_id() {
        let f = setup().await;
        let b = f.repo.create(&task(&f, f.todo, "b", 1000)).await.unwrap();
        let a = f.repo.create(&task(&f, f.todo, "a", 0)).await.unwrap();
        let c = f.repo.create(&task(&f, f.todo, "c", 1000)).await.unwrap();
        f.repo.create(&task(&f, f.done, "elsewhere", 0)).await.unwrap();

        let ids: Vec<i64> = f
            .repo
            .list_by_column(f.todo)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(f.repo.list_by_project(f.project_id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_update_moves_between_columns() {
        let f = setup().await;
        let mut t = f.repo.create(&task(&f, f.todo, "t", 0)).await.unwrap();
        t.column_id = f.done;
        t.status_order = -1000;
        assert!(f.repo.update(&t).await.unwrap());

        assert!(f.repo.list_by_column(f.todo).await.unwrap().is_empty());
        let moved = f.repo.get_by_id(t.id).await.unwrap().unwrap();
        assert_eq!(moved.column_id, f.done);
        assert_eq!(moved.status_order, -1000);

        assert!(f.repo.delete(t.id).await.unwrap());
        assert!(f.repo.get_by_id(t.id).await.unwrap().is_none());
    }
}
