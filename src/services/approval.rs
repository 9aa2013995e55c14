//! Approval service
//!
//! Review rounds, verdicts and the aggregation that drives a content item's
//! status while it is in review. Every step that writes an approval and then
//! re-derives the content status runs under the content's [`KeyedLocks`]
//! entry, so verdicts on the same content never interleave.

use crate::cache::Cache;
use crate::db::repositories::{ApprovalRepository, ContentRepository, UserRepository};
use crate::models::{
    Approval, ApprovalStatus, BulkApprovalInput, BulkApprovalResult, BulkFailure, Content,
    ContentStatus, User, VerdictInput,
};
use crate::services::analytics;
use crate::services::notification::NotificationService;
use crate::services::workflow::{aggregate_status, KeyedLocks};
use anyhow::Context;
use futures::future::join_all;
use std::sync::Arc;

/// Error types for approval service operations
#[derive(Debug, thiserror::Error)]
pub enum ApprovalServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ApprovalService {
    contents: Arc<dyn ContentRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    users: Arc<dyn UserRepository>,
    locks: Arc<KeyedLocks>,
    cache: Arc<Cache>,
    notifications: Arc<NotificationService>,
}

impl ApprovalService {
    pub fn new(
        contents: Arc<dyn ContentRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        users: Arc<dyn UserRepository>,
        locks: Arc<KeyedLocks>,
        cache: Arc<Cache>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            contents,
            approvals,
            users,
            locks,
            cache,
            notifications,
        }
    }

    /// Start a review round.
    ///
    /// Every existing approval of the content goes back to pending, each
    /// named reviewer gets a pending approval and the content moves to
    /// `in_review`.
    pub async fn submit_for_review(
        &self,
        actor: &User,
        content_id: i64,
        reviewer_ids: &[i64],
    ) -> Result<Vec<Approval>, ApprovalServiceError> {
        let reviewer_ids = dedup(reviewer_ids);
        if reviewer_ids.is_empty() {
            return Err(ApprovalServiceError::ValidationError(
                "at least one reviewer is required".to_string(),
            ));
        }

        let _guard = self.locks.lock(content_id).await;
        let content = self.content(content_id).await?;

        if !actor.can_edit(content.author_id) {
            return Err(ApprovalServiceError::Forbidden(
                "only the author or an editor can submit this content".to_string(),
            ));
        }
        if !content.status.can_submit() {
            return Err(ApprovalServiceError::InvalidTransition(format!(
                "content in status '{}' cannot be submitted for review",
                content.status
            )));
        }

        let mut reviewers = Vec::with_capacity(reviewer_ids.len());
        for id in reviewer_ids {
            reviewers.push(self.reviewer(id, &content).await?);
        }

        let existing = self
            .approvals
            .list_by_content(content_id)
            .await
            .context("Failed to list approvals")?;
        for approval in existing {
            self.approvals
                .upsert(content_id, approval.reviewer_id, ApprovalStatus::Pending, None)
                .await
                .context("Failed to reset approval")?;
        }
        for reviewer in &reviewers {
            self.approvals
                .upsert(content_id, reviewer.id, ApprovalStatus::Pending, None)
                .await
                .context("Failed to create approval")?;
        }

        self.contents
            .update_status(content_id, ContentStatus::InReview, content.published_at)
            .await
            .context("Failed to update content status")?;
        analytics::invalidate(&self.cache).await;
        tracing::info!(
            content_id,
            reviewers = reviewers.len(),
            "Content submitted for review"
        );

        for reviewer in &reviewers {
            self.notifications.review_requested(&content, reviewer).await;
        }

        Ok(self
            .approvals
            .list_by_content(content_id)
            .await
            .context("Failed to list approvals")?)
    }

    /// Add a reviewer to content, or send an existing one back to pending
    pub async fn invite_reviewer(
        &self,
        actor: &User,
        content_id: i64,
        reviewer_id: i64,
    ) -> Result<Approval, ApprovalServiceError> {
        if !actor.is_editor() {
            return Err(ApprovalServiceError::Forbidden(
                "only editors can invite reviewers".to_string(),
            ));
        }

        let _guard = self.locks.lock(content_id).await;
        let content = self.content(content_id).await?;
        if content.status == ContentStatus::Published {
            return Err(ApprovalServiceError::InvalidTransition(
                "published content cannot be reviewed".to_string(),
            ));
        }
        let reviewer = self.reviewer(reviewer_id, &content).await?;

        let approval = self
            .approvals
            .upsert(content_id, reviewer.id, ApprovalStatus::Pending, None)
            .await
            .context("Failed to create approval")?;
        tracing::info!(content_id, reviewer_id, "Reviewer invited");

        self.reaggregate(content_id).await?;
        analytics::invalidate(&self.cache).await;
        self.notifications.review_requested(&content, &reviewer).await;
        Ok(approval)
    }

    /// Record a verdict on an approval and re-derive the content status
    pub async fn submit_verdict(
        &self,
        actor: &User,
        approval_id: i64,
        input: VerdictInput,
    ) -> Result<Approval, ApprovalServiceError> {
        let comment = validate_verdict(input.status, input.comment.as_deref())?;
        let approval = self.get(approval_id).await?;

        if approval.reviewer_id != actor.id && !actor.is_admin() {
            return Err(ApprovalServiceError::Forbidden(
                "this approval is assigned to another reviewer".to_string(),
            ));
        }

        let _guard = self.locks.lock(approval.content_id).await;
        self.approvals
            .update_verdict(approval_id, input.status, comment)
            .await
            .context("Failed to record verdict")?;
        tracing::info!(
            approval_id,
            content_id = approval.content_id,
            verdict = %input.status,
            "Verdict recorded"
        );

        self.reaggregate(approval.content_id).await?;
        analytics::invalidate(&self.cache).await;
        self.get(approval_id).await
    }

    /// Re-derive and persist the status of `content_id` from its approvals.
    ///
    /// Returns the new status when it changed.
    pub async fn update_content_status_based_on_approvals(
        &self,
        content_id: i64,
    ) -> Result<Option<ContentStatus>, ApprovalServiceError> {
        let _guard = self.locks.lock(content_id).await;
        self.reaggregate(content_id).await
    }

    /// Apply the same verdict as the acting editor to many content items.
    ///
    /// Items are processed concurrently and independently; one failing item
    /// does not affect the others.
    pub async fn bulk_action(
        &self,
        actor: &User,
        input: BulkApprovalInput,
    ) -> Result<BulkApprovalResult, ApprovalServiceError> {
        if !actor.is_editor() {
            return Err(ApprovalServiceError::Forbidden(
                "only editors can run bulk actions".to_string(),
            ));
        }
        let verdict = input.action.verdict();
        let comment = validate_verdict(verdict, input.comment.as_deref())?;
        let ids = dedup(&input.content_ids);
        if ids.is_empty() {
            return Err(ApprovalServiceError::ValidationError(
                "content_ids cannot be empty".to_string(),
            ));
        }

        let outcomes = join_all(
            ids.iter()
                .map(|&id| self.bulk_one(actor, id, verdict, comment)),
        )
        .await;

        let mut result = BulkApprovalResult::default();
        for (content_id, outcome) in ids.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => result.succeeded.push(content_id),
                Err(e) => {
                    tracing::debug!(content_id, error = %e, "Bulk item failed");
                    result.failed.push(BulkFailure {
                        content_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        analytics::invalidate(&self.cache).await;
        tracing::info!(
            action = ?input.action,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Bulk approval finished"
        );
        Ok(result)
    }

    pub async fn get(&self, id: i64) -> Result<Approval, ApprovalServiceError> {
        self.approvals
            .get_by_id(id)
            .await
            .context("Failed to get approval")?
            .ok_or_else(|| ApprovalServiceError::NotFound(format!("approval {}", id)))
    }

    pub async fn list_for_content(
        &self,
        content_id: i64,
    ) -> Result<Vec<Approval>, ApprovalServiceError> {
        self.content(content_id).await?;
        Ok(self
            .approvals
            .list_by_content(content_id)
            .await
            .context("Failed to list approvals")?)
    }

    /// Pending approvals assigned to `actor`
    pub async fn list_mine(&self, actor: &User) -> Result<Vec<Approval>, ApprovalServiceError> {
        Ok(self
            .approvals
            .list_pending_for_reviewer(actor.id)
            .await
            .context("Failed to list pending approvals")?)
    }

    async fn bulk_one(
        &self,
        actor: &User,
        content_id: i64,
        verdict: ApprovalStatus,
        comment: Option<&str>,
    ) -> Result<(), ApprovalServiceError> {
        let _guard = self.locks.lock(content_id).await;
        let content = self.content(content_id).await?;
        if !content.status.is_review_phase() {
            return Err(ApprovalServiceError::InvalidTransition(format!(
                "content in status '{}' is not under review",
                content.status
            )));
        }
        self.reviewer(actor.id, &content).await?;

        self.approvals
            .upsert(content_id, actor.id, verdict, comment)
            .await
            .context("Failed to record verdict")?;
        self.reaggregate(content_id).await?;
        Ok(())
    }

    /// Caller must hold the content's lock
    async fn reaggregate(
        &self,
        content_id: i64,
    ) -> Result<Option<ContentStatus>, ApprovalServiceError> {
        let content = self.content(content_id).await?;
        if !content.status.is_review_phase() {
            return Ok(None);
        }

        let approvals = self
            .approvals
            .list_by_content(content_id)
            .await
            .context("Failed to list approvals")?;
        let statuses: Vec<ApprovalStatus> = approvals.iter().map(|a| a.status).collect();

        let Some(status) = aggregate_status(&statuses) else {
            return Ok(None);
        };
        if status == content.status {
            return Ok(None);
        }

        self.contents
            .update_status(content_id, status, content.published_at)
            .await
            .context("Failed to update content status")?;
        tracing::info!(content_id, from = %content.status, to = %status, "Aggregated status changed");

        self.notifications.status_changed(&content, status).await;
        Ok(Some(status))
    }

    async fn content(&self, id: i64) -> Result<Content, ApprovalServiceError> {
        self.contents
            .get_by_id(id)
            .await
            .context("Failed to get content")?
            .ok_or_else(|| ApprovalServiceError::NotFound(format!("content {}", id)))
    }

    async fn reviewer(&self, id: i64, content: &Content) -> Result<User, ApprovalServiceError> {
        let user = self
            .users
            .get_by_id(id)
            .await
            .context("Failed to get reviewer")?
            .ok_or_else(|| ApprovalServiceError::NotFound(format!("user {}", id)))?;
        if !user.can_review() {
            return Err(ApprovalServiceError::ValidationError(format!(
                "user {} cannot review content",
                user.username
            )));
        }
        if user.id == content.author_id {
            return Err(ApprovalServiceError::ValidationError(
                "authors cannot review their own content".to_string(),
            ));
        }
        Ok(user)
    }
}

/// Only approve and reject are verdicts; a rejection needs a reason
fn validate_verdict(
    status: ApprovalStatus,
    comment: Option<&str>,
) -> Result<Option<&str>, ApprovalServiceError> {
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    match status {
        ApprovalStatus::Pending => Err(ApprovalServiceError::ValidationError(
            "verdict must be 'approved' or 'rejected'".to_string(),
        )),
        ApprovalStatus::Rejected if comment.is_none() => Err(
            ApprovalServiceError::ValidationError("a rejection requires a comment".to_string()),
        ),
        _ => Ok(comment),
    }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
