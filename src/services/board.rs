//! Project board service
//!
//! CRUD and reordering for projects, columns, lists and tasks. New entities
//! are appended after their siblings; a move computes one fresh key from the
//! destination neighbours and leaves every sibling untouched.

use crate::db::repositories::{BoardRepository, TaskRepository, UserRepository};
use crate::models::{
    Column, CreateProjectInput, CreateTaskInput, MoveInput, NameInput, Project, Task, TaskList,
    UpdateProjectInput, UpdateTaskInput, User,
};
use crate::services::ordering::{append_order, compute_next_status_order};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_NAME_LEN: usize = 255;

/// Error types for board service operations
#[derive(Debug, thiserror::Error)]
pub enum BoardServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct BoardService {
    board: Arc<dyn BoardRepository>,
    tasks: Arc<dyn TaskRepository>,
    users: Arc<dyn UserRepository>,
}

impl BoardService {
    pub fn new(
        board: Arc<dyn BoardRepository>,
        tasks: Arc<dyn TaskRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self { board, tasks, users }
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Vec<Project>, BoardServiceError> {
        Ok(self.board.list_projects().await.context("Failed to list projects")?)
    }

    pub async fn get_project(&self, id: i64) -> Result<Project, BoardServiceError> {
        self.board
            .get_project(id)
            .await
            .context("Failed to get project")?
            .ok_or_else(|| BoardServiceError::NotFound(format!("project {}", id)))
    }

    pub async fn create_project(
        &self,
        input: CreateProjectInput,
    ) -> Result<Project, BoardServiceError> {
        let name = validate_name(&input.name)?;
        let siblings = self.project_keys(None).await?;
        let now = Utc::now();

        let project = self
            .board
            .create_project(&Project {
                id: 0,
                name,
                description: normalize(input.description),
                position: append_order(&siblings),
                created_at: now,
                updated_at: now,
            })
            .await
            .context("Failed to create project")?;
        tracing::info!(project_id = project.id, "Project created");
        Ok(project)
    }

    pub async fn update_project(
        &self,
        id: i64,
        input: UpdateProjectInput,
    ) -> Result<Project, BoardServiceError> {
        let mut project = self.get_project(id).await?;
        if let Some(name) = input.name {
            project.name = validate_name(&name)?;
        }
        if input.description.is_some() {
            project.description = normalize(input.description);
        }
        project.updated_at = Utc::now();

        self.board
            .update_project(&project)
            .await
            .context("Failed to update project")?;
        Ok(project)
    }

    /// Delete a project with its columns, lists and tasks
    pub async fn delete_project(&self, actor: &User, id: i64) -> Result<(), BoardServiceError> {
        if !actor.is_editor() {
            return Err(BoardServiceError::Forbidden(
                "only editors can delete projects".to_string(),
            ));
        }
        if !self.board.delete_project(id).await.context("Failed to delete project")? {
            return Err(BoardServiceError::NotFound(format!("project {}", id)));
        }
        tracing::info!(project_id = id, actor = actor.id, "Project deleted");
        Ok(())
    }

    pub async fn move_project(&self, id: i64, input: MoveInput) -> Result<Project, BoardServiceError> {
        let mut project = self.get_project(id).await?;
        let siblings = self.project_keys(Some(id)).await?;
        project.position = compute_next_status_order(&siblings, input.dest_index);
        project.updated_at = Utc::now();

        self.board
            .update_project(&project)
            .await
            .context("Failed to move project")?;
        tracing::debug!(project_id = id, position = project.position, "Project moved");
        Ok(project)
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    pub async fn list_columns(&self, project_id: i64) -> Result<Vec<Column>, BoardServiceError> {
        self.get_project(project_id).await?;
        Ok(self
            .board
            .list_columns(project_id)
            .await
            .context("Failed to list columns")?)
    }

    pub async fn get_column(&self, id: i64) -> Result<Column, BoardServiceError> {
        self.board
            .get_column(id)
            .await
            .context("Failed to get column")?
            .ok_or_else(|| BoardServiceError::NotFound(format!("column {}", id)))
    }

    pub async fn create_column(
        &self,
        project_id: i64,
        input: NameInput,
    ) -> Result<Column, BoardServiceError> {
        let name = validate_name(&input.name)?;
        let siblings: Vec<i64> = self
            .list_columns(project_id)
            .await?
            .iter()
            .map(|c| c.position)
            .collect();

        Ok(self
            .board
            .create_column(&Column {
                id: 0,
                project_id,
                name,
                position: append_order(&siblings),
                created_at: Utc::now(),
            })
            .await
            .context("Failed to create column")?)
    }

    pub async fn rename_column(&self, id: i64, input: NameInput) -> Result<Column, BoardServiceError> {
        let mut column = self.get_column(id).await?;
        column.name = validate_name(&input.name)?;
        self.board
            .update_column(&column)
            .await
            .context("Failed to update column")?;
        Ok(column)
    }

    /// Delete a column and the tasks in it
    pub async fn delete_column(&self, id: i64) -> Result<(), BoardServiceError> {
        if !self.board.delete_column(id).await.context("Failed to delete column")? {
            return Err(BoardServiceError::NotFound(format!("column {}", id)));
        }
        Ok(())
    }

    pub async fn move_column(&self, id: i64, input: MoveInput) -> Result<Column, BoardServiceError> {
        let mut column = self.get_column(id).await?;
        let siblings: Vec<i64> = self
            .board
            .list_columns(column.project_id)
            .await
            .context("Failed to list columns")?
            .iter()
            .filter(|c| c.id != id)
            .map(|c| c.position)
            .collect();
        column.position = compute_next_status_order(&siblings, input.dest_index);

        self.board
            .update_column(&column)
            .await
            .context("Failed to move column")?;
        Ok(column)
    }

    // ------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------

    pub async fn list_lists(&self, project_id: i64) -> Result<Vec<TaskList>, BoardServiceError> {
        self.get_project(project_id).await?;
        Ok(self
            .board
            .list_lists(project_id)
            .await
            .context("Failed to list task lists")?)
    }

    pub async fn get_list(&self, id: i64) -> Result<TaskList, BoardServiceError> {
        self.board
            .get_list(id)
            .await
            .context("Failed to get task list")?
            .ok_or_else(|| BoardServiceError::NotFound(format!("list {}", id)))
    }

    pub async fn create_list(
        &self,
        project_id: i64,
        input: NameInput,
    ) -> Result<TaskList, BoardServiceError> {
        let name = validate_name(&input.name)?;
        let siblings: Vec<i64> = self
            .list_lists(project_id)
            .await?
            .iter()
            .map(|l| l.position)
            .collect();

        Ok(self
            .board
            .create_list(&TaskList {
                id: 0,
                project_id,
                name,
                position: append_order(&siblings),
                created_at: Utc::now(),
            })
            .await
            .context("Failed to create task list")?)
    }

    pub async fn rename_list(&self, id: i64, input: NameInput) -> Result<TaskList, BoardServiceError> {
        let mut list = self.get_list(id).await?;
        list.name = validate_name(&input.name)?;
        self.board
            .update_list(&list)
            .await
            .context("Failed to update task list")?;
        Ok(list)
    }

    /// Delete a list. Its tasks stay on the board without a list.
    pub async fn delete_list(&self, id: i64) -> Result<(), BoardServiceError> {
        if !self.board.delete_list(id).await.context("Failed to delete task list")? {
            return Err(BoardServiceError::NotFound(format!("list {}", id)));
        }
        Ok(())
    }

    pub async fn move_list(&self, id: i64, input: MoveInput) -> Result<TaskList, BoardServiceError> {
        let mut list = self.get_list(id).await?;
        let siblings: Vec<i64> = self
            .board
            .list_lists(list.project_id)
            .await
            .context("Failed to list task lists")?
            .iter()
            .filter(|l| l.id != id)
            .map(|l| l.position)
            .collect();
        list.position = compute_next_status_order(&siblings, input.dest_index);

        self.board
            .update_list(&list)
            .await
            .context("Failed to move task list")?;
        Ok(list)
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>, BoardServiceError> {
        self.get_project(project_id).await?;
        Ok(self
            .tasks
            .list_by_project(project_id)
            .await
            .context("Failed to list tasks")?)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task, BoardServiceError> {
        self.tasks
            .get_by_id(id)
            .await
            .context("Failed to get task")?
            .ok_or_else(|| BoardServiceError::NotFound(format!("task {}", id)))
    }

    pub async fn create_task(
        &self,
        project_id: i64,
        input: CreateTaskInput,
    ) -> Result<Task, BoardServiceError> {
        let title = validate_name(&input.title)?;
        self.get_project(project_id).await?;
        self.column_in(project_id, input.column_id).await?;
        if let Some(list_id) = input.list_id {
            self.list_in(project_id, list_id).await?;
        }
        if let Some(assignee_id) = input.assignee_id {
            self.assignee(assignee_id).await?;
        }

        let siblings = self.task_keys(input.column_id, None).await?;
        let now = Utc::now();
        let task = self
            .tasks
            .create(&Task {
                id: 0,
                project_id,
                column_id: input.column_id,
                list_id: input.list_id,
                title,
                description: normalize(input.description),
                assignee_id: input.assignee_id,
                status_order: append_order(&siblings),
                created_at: now,
                updated_at: now,
            })
            .await
            .context("Failed to create task")?;
        tracing::debug!(task_id = task.id, project_id, "Task created");
        Ok(task)
    }

    pub async fn update_task(
        &self,
        id: i64,
        input: UpdateTaskInput,
    ) -> Result<Task, BoardServiceError> {
        let mut task = self.get_task(id).await?;
        if let Some(title) = input.title {
            task.title = validate_name(&title)?;
        }
        if input.description.is_some() {
            task.description = normalize(input.description);
        }
        if let Some(list_id) = input.list_id {
            self.list_in(task.project_id, list_id).await?;
            task.list_id = Some(list_id);
        }
        if let Some(assignee_id) = input.assignee_id {
            self.assignee(assignee_id).await?;
            task.assignee_id = Some(assignee_id);
        }
        task.updated_at = Utc::now();

        self.tasks.update(&task).await.context("Failed to update task")?;
        Ok(task)
    }

    pub async fn delete_task(&self, id: i64) -> Result<(), BoardServiceError> {
        if !self.tasks.delete(id).await.context("Failed to delete task")? {
            return Err(BoardServiceError::NotFound(format!("task {}", id)));
        }
        Ok(())
    }

    /// Move a task within its column, or into another column of the same
    /// project when `column_id` is given.
    pub async fn move_task(&self, id: i64, input: MoveInput) -> Result<Task, BoardServiceError> {
        let mut task = self.get_task(id).await?;
        let column_id = input.column_id.unwrap_or(task.column_id);
        if column_id != task.column_id {
            self.column_in(task.project_id, column_id).await?;
        }

        let siblings = self.task_keys(column_id, Some(id)).await?;
        task.column_id = column_id;
        task.status_order = compute_next_status_order(&siblings, input.dest_index);
        task.updated_at = Utc::now();

        self.tasks.update(&task).await.context("Failed to move task")?;
        tracing::debug!(
            task_id = id,
            column_id,
            status_order = task.status_order,
            "Task moved"
        );
        Ok(task)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn project_keys(&self, except: Option<i64>) -> Result<Vec<i64>, BoardServiceError> {
        Ok(self
            .board
            .list_projects()
            .await
            .context("Failed to list projects")?
            .iter()
            .filter(|p| Some(p.id) != except)
            .map(|p| p.position)
            .collect())
    }

    async fn task_keys(&self, column_id: i64, except: Option<i64>) -> Result<Vec<i64>, BoardServiceError> {
        Ok(self
            .tasks
            .list_by_column(column_id)
            .await
            .context("Failed to list tasks")?
            .iter()
            .filter(|t| Some(t.id) != except)
            .map(|t| t.status_order)
            .collect())
    }

    async fn column_in(&self, project_id: i64, column_id: i64) -> Result<Column, BoardServiceError> {
        let column = self.get_column(column_id).await?;
        if column.project_id != project_id {
            return Err(BoardServiceError::ValidationError(format!(
                "column {} does not belong to project {}",
                column_id, project_id
            )));
        }
        Ok(column)
    }

    async fn list_in(&self, project_id: i64, list_id: i64) -> Result<TaskList, BoardServiceError> {
        let list = self.get_list(list_id).await?;
        if list.project_id != project_id {
            return Err(BoardServiceError::ValidationError(format!(
                "list {} does not belong to project {}",
                list_id, project_id
            )));
        }
        Ok(list)
    }

    async fn assignee(&self, user_id: i64) -> Result<User, BoardServiceError> {
        self.users
            .get_by_id(user_id)
            .await
            .context("Failed to get assignee")?
            .ok_or_else(|| BoardServiceError::ValidationError(format!("unknown assignee {}", user_id)))
    }
}

fn validate_name(name: &str) -> Result<String, BoardServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BoardServiceError::ValidationError(
            "name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(BoardServiceError::ValidationError(format!(
            "name cannot exceed {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn normalize(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
