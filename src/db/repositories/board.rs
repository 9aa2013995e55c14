//! Board repository
//!
//! Projects plus the two per-project groupings: columns (status lanes) and
//! task lists. Columns and lists share a table shape and the same queries.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Column, Project, TaskList};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Board repository trait
#[async_trait]
pub trait BoardRepository: Send + Sync {
    async fn create_project(&self, project: &Project) -> Result<Project>;
    async fn get_project(&self, id: i64) -> Result<Option<Project>>;
    /// All projects ordered by position, then id
    async fn list_projects(&self) -> Result<Vec<Project>>;
    /// Persist name, description and position
    async fn update_project(&self, project: &Project) -> Result<bool>;
    async fn delete_project(&self, id: i64) -> Result<bool>;

    async fn create_column(&self, column: &Column) -> Result<Column>;
    async fn get_column(&self, id: i64) -> Result<Option<Column>>;
    async fn list_columns(&self, project_id: i64) -> Result<Vec<Column>>;
    async fn update_column(&self, column: &Column) -> Result<bool>;
    async fn delete_column(&self, id: i64) -> Result<bool>;

    async fn create_list(&self, list: &TaskList) -> Result<TaskList>;
    async fn get_list(&self, id: i64) -> Result<Option<TaskList>>;
    async fn list_lists(&self, project_id: i64) -> Result<Vec<TaskList>>;
    async fn update_list(&self, list: &TaskList) -> Result<bool>;
    async fn delete_list(&self, id: i64) -> Result<bool>;
}

/// SQLx-based board repository implementation
pub struct SqlxBoardRepository {
    pool: DynDatabasePool,
}

impl SqlxBoardRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BoardRepository> {
        Arc::new(Self::new(pool))
    }

    async fn insert_group(&self, table: GroupTable, group: &GroupRow) -> Result<i64> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => insert_group_sqlite(pool, table, group).await,
            Backend::Mysql(pool) => insert_group_mysql(pool, table, group).await,
        }
    }

    async fn get_group(&self, table: GroupTable, id: i64) -> Result<Option<GroupRow>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => get_group_sqlite(pool, table, id).await,
            Backend::Mysql(pool) => get_group_mysql(pool, table, id).await,
        }
    }

    async fn list_groups(&self, table: GroupTable, project_id: i64) -> Result<Vec<GroupRow>> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => list_groups_sqlite(pool, table, project_id).await,
            Backend::Mysql(pool) => list_groups_mysql(pool, table, project_id).await,
        }
    }

    async fn update_group(&self, table: GroupTable, group: &GroupRow) -> Result<bool> {
        let sql = format!("UPDATE {} SET name = ?, position = ? WHERE id = ?", table.name());
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(&group.name)
                .bind(group.position)
                .bind(group.id)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to update {}", table.name()))?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(&group.name)
                .bind(group.position)
                .bind(group.id)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to update {}", table.name()))?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table);
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to delete from {}", table))?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to delete from {}", table))?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

/// Tables holding per-project groupings
#[derive(Debug, Clone, Copy)]
enum GroupTable {
    Columns,
    Lists,
}

impl GroupTable {
    fn name(&self) -> &'static str {
        match self {
            GroupTable::Columns => "board_columns",
            GroupTable::Lists => "task_lists",
        }
    }
}

/// Row shape shared by columns and lists
#[derive(Debug, Clone)]
struct GroupRow {
    id: i64,
    project_id: i64,
    name: String,
    position: i64,
    created_at: DateTime<Utc>,
}

impl From<&Column> for GroupRow {
    fn from(c: &Column) -> Self {
        Self {
            id: c.id,
            project_id: c.project_id,
            name: c.name.clone(),
            position: c.position,
            created_at: c.created_at,
        }
    }
}

impl From<&TaskList> for GroupRow {
    fn from(l: &TaskList) -> Self {
        Self {
            id: l.id,
            project_id: l.project_id,
            name: l.name.clone(),
            position: l.position,
            created_at: l.created_at,
        }
    }
}

impl From<GroupRow> for Column {
    fn from(g: GroupRow) -> Self {
        Column {
            id: g.id,
            project_id: g.project_id,
            name: g.name,
            position: g.position,
            created_at: g.created_at,
        }
    }
}

impl From<GroupRow> for TaskList {
    fn from(g: GroupRow) -> Self {
        TaskList {
            id: g.id,
            project_id: g.project_id,
            name: g.name,
            position: g.position,
            created_at: g.created_at,
        }
    }
}

#[async_trait]
impl BoardRepository for SqlxBoardRepository {
    async fn create_project(&self, project: &Project) -> Result<Project> {
        match self.pool.backend()? {
            Backend::Sqlite(pool) => create_project_sqlite(pool, project).await,
            Backend::Mysql(pool) => create_project_mysql(pool, project).await,
        }
    }

    async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS);
        let project = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get project")?
                .map(|r| row_to_project_sqlite(&r)),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get project")?
                .map(|r| row_to_project_mysql(&r)),
        };
        Ok(project)
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let sql = format!("SELECT {} FROM projects ORDER BY position, id", PROJECT_COLUMNS);
        let projects = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .context("Failed to list projects")?
                .iter()
                .map(row_to_project_sqlite)
                .collect(),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .context("Failed to list projects")?
                .iter()
                .map(row_to_project_mysql)
                .collect(),
        };
        Ok(projects)
    }

    async fn update_project(&self, project: &Project) -> Result<bool> {
        let sql = "UPDATE projects SET name = ?, description = ?, position = ?, updated_at = ? WHERE id = ?";
        let affected = match self.pool.backend()? {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&project.name)
                .bind(&project.description)
                .bind(project.position)
                .bind(project.updated_at)
                .bind(project.id)
                .execute(pool)
                .await
                .context("Failed to update project")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&project.name)
                .bind(&project.description)
                .bind(project.position)
                .bind(project.updated_at)
                .bind(project.id)
                .execute(pool)
                .await
                .context("Failed to update project")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete_project(&self, id: i64) -> Result<bool> {
        self.delete_by_id("projects", id).await
    }

    async fn create_column(&self, column: &Column) -> Result<Column> {
        let id = self.insert_group(GroupTable::Columns, &column.into()).await?;
        Ok(Column { id, ..column.clone() })
    }

    async fn get_column(&self, id: i64) -> Result<Option<Column>> {
        Ok(self.get_group(GroupTable::Columns, id).await?.map(Column::from))
    }

    async fn list_columns(&self, project_id: i64) -> Result<Vec<Column>> {
        let rows = self.list_groups(GroupTable::Columns, project_id).await?;
        Ok(rows.into_iter().map(Column::from).collect())
    }

    async fn update_column(&self, column: &Column) -> Result<bool> {
        self.update_group(GroupTable::Columns, &column.into()).await
    }

    async fn delete_column(&self, id: i64) -> Result<bool> {
        self.delete_by_id(GroupTable::Columns.name(), id).await
    }

    async fn create_list(&self, list: &TaskList) -> Result<TaskList> {
        let id = self.insert_group(GroupTable::Lists, &list.into()).await?;
        Ok(TaskList { id, ..list.clone() })
    }

    async fn get_list(&self, id: i64) -> Result<Option<TaskList>> {
        Ok(self.get_group(GroupTable::Lists, id).await?.map(TaskList::from))
    }

    async fn list_lists(&self, project_id: i64) -> Result<Vec<TaskList>> {
        let rows = self.list_groups(GroupTable::Lists, project_id).await?;
        Ok(rows.into_iter().map(TaskList::from).collect())
    }

    async fn update_list(&self, list: &TaskList) -> Result<bool> {
        self.update_group(GroupTable::Lists, &list.into()).await
    }

    async fn delete_list(&self, id: i64) -> Result<bool> {
        self.delete_by_id(GroupTable::Lists.name(), id).await
    }
}

const PROJECT_COLUMNS: &str = "id, name, description, position, created_at, updated_at";

const INSERT_PROJECT: &str = r#"
    INSERT INTO projects (name, description, position, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?)
"#;

fn group_select(table: GroupTable, predicate: &str) -> String {
    format!(
        "SELECT id, project_id, name, position, created_at FROM {} WHERE {}",
        table.name(),
        predicate
    )
}

fn group_insert(table: GroupTable) -> String {
    format!(
        "INSERT INTO {} (project_id, name, position, created_at) VALUES (?, ?, ?, ?)",
        table.name()
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_project_sqlite(pool: &SqlitePool, project: &Project) -> Result<Project> {
    let result = sqlx::query(INSERT_PROJECT)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.position)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(pool)
        .await
        .context("Failed to create project")?;

    Ok(Project {
        id: result.last_insert_rowid(),
        ..project.clone()
    })
}

fn row_to_project_sqlite(row: &sqlx::sqlite::SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        position: row.get("position"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn insert_group_sqlite(pool: &SqlitePool, table: GroupTable, group: &GroupRow) -> Result<i64> {
    let result = sqlx::query(&group_insert(table))
        .bind(group.project_id)
        .bind(&group.name)
        .bind(group.position)
        .bind(group.created_at)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert into {}", table.name()))?;
    Ok(result.last_insert_rowid())
}

async fn get_group_sqlite(pool: &SqlitePool, table: GroupTable, id: i64) -> Result<Option<GroupRow>> {
    let row = sqlx::query(&group_select(table, "id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get from {}", table.name()))?;
    Ok(row.map(|r| row_to_group_sqlite(&r)))
}

async fn list_groups_sqlite(
    pool: &SqlitePool,
    table: GroupTable,
    project_id: i64,
) -> Result<Vec<GroupRow>> {
    let sql = format!("{} ORDER BY position, id", group_select(table, "project_id = ?"));
    let rows = sqlx::query(&sql)
        .bind(project_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list {}", table.name()))?;
    Ok(rows.iter().map(row_to_group_sqlite).collect())
}

fn row_to_group_sqlite(row: &sqlx::sqlite::SqliteRow) -> GroupRow {
    GroupRow {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_project_mysql(pool: &MySqlPool, project: &Project) -> Result<Project> {
    let result = sqlx::query(INSERT_PROJECT)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.position)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(pool)
        .await
        .context("Failed to create project")?;

    Ok(Project {
        id: result.last_insert_id() as i64,
        ..project.clone()
    })
}

fn row_to_project_mysql(row: &sqlx::mysql::MySqlRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        position: row.get("position"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn insert_group_mysql(pool: &MySqlPool, table: GroupTable, group: &GroupRow) -> Result<i64> {
    let result = sqlx::query(&group_insert(table))
        .bind(group.project_id)
        .bind(&group.name)
        .bind(group.position)
        .bind(group.created_at)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert into {}", table.name()))?;
    Ok(result.last_insert_id() as i64)
}

async fn get_group_mysql(pool: &MySqlPool, table: GroupTable, id: i64) -> Result<Option<GroupRow>> {
    let row = sqlx::query(&group_select(table, "id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get from {}", table.name()))?;
    Ok(row.map(|r| row_to_group_mysql(&r)))
}

async fn list_groups_mysql(
    pool: &MySqlPool,
    table: GroupTable,
    project_id: i64,
) -> Result<Vec<GroupRow>> {
    let sql = format!("{} ORDER BY position, id", group_select(table, "project_id = ?"));
    let rows = sqlx::query(&sql)
        .bind(project_id)
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list {}", table.name()))?;
    Ok(rows.iter().map(row_to_group_mysql).collect())
}

fn row_to_group_mysql(row: &sqlx::mysql::MySqlRow) -> GroupRow {
    GroupRow {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    }
}
