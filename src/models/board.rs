//! Project board models
//!
//! Projects, columns, lists and tasks all carry a gapped integer position.
//! Siblings are listed by position, then id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status lane of a project board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Named task group inside a project, independent of columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub column_id: i64,
    pub list_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<i64>,
    /// Position within the column
    pub status_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Create or rename a column or list
#[derive(Debug, Clone, Deserialize)]
pub struct NameInput {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskInput {
    pub column_id: i64,
    #[serde(default)]
    pub list_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub list_id: Option<i64>,
    pub assignee_id: Option<i64>,
}

/// Reorder request. `dest_index` is the slot among the siblings once the
/// moved entity is taken out; out-of-range values are clamped.
#[derive(Debug, Clone, Deserialize)]
pub struct MoveInput {
    pub dest_index: i64,
    /// Destination column, tasks only
    #[serde(default)]
    pub column_id: Option<i64>,
}
