//! Content service
//!
//! Authoring side of the workflow: create, edit, delete, withdraw and
//! publish. Review submission and verdicts live in
//! [`ApprovalService`](crate::services::approval::ApprovalService); both
//! share the same per-content [`KeyedLocks`].

use crate::cache::Cache;
use crate::db::repositories::ContentRepository;
use crate::models::{
    Content, ContentFilter, ContentStatus, CreateContentInput, ListParams, PagedResult,
    UpdateContentInput, User,
};
use crate::services::analytics;
use crate::services::markdown::MarkdownRenderer;
use crate::services::notification::NotificationService;
use crate::services::workflow::KeyedLocks;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_TITLE_LEN: usize = 255;
const MAX_SLUG_SUFFIX: u32 = 100;

/// Error types for content service operations
#[derive(Debug, thiserror::Error)]
pub enum ContentServiceError {
    #[error("Content not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The content's status does not allow the operation
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Content slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ContentService {
    repo: Arc<dyn ContentRepository>,
    locks: Arc<KeyedLocks>,
    cache: Arc<Cache>,
    notifications: Arc<NotificationService>,
    renderer: MarkdownRenderer,
}

impl ContentService {
    pub fn new(
        repo: Arc<dyn ContentRepository>,
        locks: Arc<KeyedLocks>,
        cache: Arc<Cache>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            locks,
            cache,
            notifications,
            renderer: MarkdownRenderer::new(),
        }
    }

    /// Create a draft owned by `author`
    pub async fn create(
        &self,
        author: &User,
        input: CreateContentInput,
    ) -> Result<Content, ContentServiceError> {
        let title = validate_title(&input.title)?;

        let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(explicit) => {
                let slug = validate_slug(explicit)?;
                if self.slug_taken(&slug, None).await? {
                    return Err(ContentServiceError::DuplicateSlug(slug));
                }
                slug
            }
            None => self.unique_slug(&generate_slug(&title)).await?,
        };

        let now = Utc::now();
        let content = Content {
            id: 0,
            slug,
            title,
            body_html: self.renderer.render(&input.body),
            body: input.body,
            status: ContentStatus::Draft,
            author_id: author.id,
            assignee_id: input.assignee_id,
            version: 1,
            published_at: None,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&content).await.context("Failed to create content")?;
        analytics::invalidate(&self.cache).await;
        tracing::info!(content_id = created.id, author_id = author.id, "Content created");
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Content, ContentServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get content")?
            .ok_or(ContentServiceError::NotFound(id))
    }

    /// Filtered, paginated listing, newest first
    pub async fn list(
        &self,
        filter: &ContentFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Content>, ContentServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list contents")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Case-insensitive search over title and body. A blank query is rejected.
    pub async fn search(
        &self,
        query: &str,
        status: Option<ContentStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Content>, ContentServiceError> {
        if query.trim().is_empty() {
            return Err(ContentServiceError::ValidationError(
                "search query cannot be empty".to_string(),
            ));
        }
        let filter = ContentFilter {
            status,
            author_id: None,
            q: Some(query.to_string()),
        };
        self.list(&filter, params).await
    }

    /// Edit content. Bumps the version.
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateContentInput,
    ) -> Result<Content, ContentServiceError> {
        let _guard = self.locks.lock(id).await;
        let mut content = self.get(id).await?;

        if !actor.can_edit(content.author_id) {
            return Err(ContentServiceError::Forbidden(
                "only the author or an editor can edit this content".to_string(),
            ));
        }
        if !content.status.is_editable(actor.is_editor()) {
            return Err(ContentServiceError::InvalidTransition(format!(
                "content in status '{}' cannot be edited",
                content.status
            )));
        }

        if let Some(title) = input.title {
            content.title = validate_title(&title)?;
        }
        if let Some(slug) = input.slug {
            let slug = validate_slug(&slug)?;
            if slug != content.slug && self.slug_taken(&slug, Some(id)).await? {
                return Err(ContentServiceError::DuplicateSlug(slug));
            }
            content.slug = slug;
        }
        if let Some(body) = input.body {
            content.body_html = self.renderer.render(&body);
            content.body = body;
        }
        if input.assignee_id.is_some() {
            content.assignee_id = input.assignee_id;
        }
        content.version += 1;
        content.updated_at = Utc::now();

        self.repo.update(&content).await.context("Failed to update content")?;
        tracing::debug!(content_id = id, version = content.version, "Content updated");
        Ok(content)
    }

    /// Delete content and, by cascade, its approvals
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), ContentServiceError> {
        let _guard = self.locks.lock(id).await;
        let content = self.get(id).await?;

        if !actor.can_edit(content.author_id) {
            return Err(ContentServiceError::Forbidden(
                "only the author or an editor can delete this content".to_string(),
            ));
        }
        if content.status == ContentStatus::Published && !actor.is_editor() {
            return Err(ContentServiceError::Forbidden(
                "published content can only be deleted by an editor".to_string(),
            ));
        }

        self.repo.delete(id).await.context("Failed to delete content")?;
        analytics::invalidate(&self.cache).await;
        tracing::info!(content_id = id, actor = actor.id, "Content deleted");
        Ok(())
    }

    /// Pull content out of review back to draft. Approvals are kept and reset
    /// on the next submission.
    pub async fn withdraw(&self, actor: &User, id: i64) -> Result<Content, ContentServiceError> {
        let _guard = self.locks.lock(id).await;
        let content = self.get(id).await?;

        if !actor.can_edit(content.author_id) {
            return Err(ContentServiceError::Forbidden(
                "only the author or an editor can withdraw this content".to_string(),
            ));
        }
        if !content.status.can_withdraw() {
            return Err(ContentServiceError::InvalidTransition(format!(
                "content in status '{}' cannot be withdrawn",
                content.status
            )));
        }

        self.set_status(content, ContentStatus::Draft).await
    }

    /// Publish approved content
    pub async fn publish(&self, actor: &User, id: i64) -> Result<Content, ContentServiceError> {
        if !actor.is_editor() {
            return Err(ContentServiceError::Forbidden(
                "only editors can publish".to_string(),
            ));
        }

        let _guard = self.locks.lock(id).await;
        let content = self.get(id).await?;
        if !content.status.can_publish() {
            return Err(ContentServiceError::InvalidTransition(format!(
                "only approved content can be published (status is '{}')",
                content.status
            )));
        }

        let published = self.set_status(content, ContentStatus::Published).await?;
        self.notifications.published(&published).await;
        Ok(published)
    }

    async fn set_status(
        &self,
        mut content: Content,
        status: ContentStatus,
    ) -> Result<Content, ContentServiceError> {
        let now = Utc::now();
        if status == ContentStatus::Published {
            content.published_at = Some(now);
        }
        self.repo
            .update_status(content.id, status, content.published_at)
            .await
            .context("Failed to update content status")?;
        tracing::info!(content_id = content.id, from = %content.status, to = %status, "Content status changed");

        content.status = status;
        content.updated_at = now;
        analytics::invalidate(&self.cache).await;
        Ok(content)
    }

    async fn slug_taken(&self, slug: &str, except: Option<i64>) -> Result<bool, ContentServiceError> {
        let existing = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to check slug uniqueness")?;
        Ok(existing.is_some_and(|c| Some(c.id) != except))
    }

    /// `base`, or `base-2`, `base-3`, ... whichever is free first
    async fn unique_slug(&self, base: &str) -> Result<String, ContentServiceError> {
        let base = if base.is_empty() { "content" } else { base };
        if !self.slug_taken(base, None).await? {
            return Ok(base.to_string());
        }
        for n in 2..=MAX_SLUG_SUFFIX {
            let candidate = format!("{}-{}", base, n);
            if !self.slug_taken(&candidate, None).await? {
                return Ok(candidate);
            }
        }
        let random = uuid::Uuid::new_v4().simple().to_string();
        Ok(format!("{}-{}", base, &random[..8]))
    }
}

fn validate_title(title: &str) -> Result<String, ContentServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ContentServiceError::ValidationError(
            "title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ContentServiceError::ValidationError(format!(
            "title cannot exceed {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_slug(slug: &str) -> Result<String, ContentServiceError> {
    let slug = slug.trim();
    let valid = !slug.is_empty()
        && slug.len() <= MAX_TITLE_LEN
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || !c.is_ascii());
    if !valid {
        return Err(ContentServiceError::ValidationError(format!(
            "invalid slug: '{}'",
            slug
        )));
    }
    Ok(slug.to_string())
}

/// Generate a URL slug from a title.
///
/// Lowercases ASCII, keeps non-ASCII letters, turns every other run of
/// separators into a single hyphen.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
