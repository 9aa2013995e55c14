//! Workflow notifications
//!
//! Turns workflow events into emails on the [`EmailQueue`]. Lookup failures
//! are logged and swallowed; a missed notification never fails the request
//! that caused it.

use crate::db::repositories::UserRepository;
use crate::models::{Content, ContentStatus, User};
use crate::services::email::{EmailQueue, OutgoingEmail, Priority};
use crate::services::markdown::MarkdownRenderer;
use std::sync::Arc;

const EXCERPT_CHARS: usize = 280;

pub struct NotificationService {
    queue: Arc<EmailQueue>,
    users: Arc<dyn UserRepository>,
    renderer: MarkdownRenderer,
}

impl NotificationService {
    pub fn new(queue: Arc<EmailQueue>, users: Arc<dyn UserRepository>) -> Self {
        Self {
            queue,
            users,
            renderer: MarkdownRenderer::new(),
        }
    }

    /// A reviewer was asked to review content
    pub async fn review_requested(&self, content: &Content, reviewer: &User) {
        let body = format!(
            "Hi {},\n\nYou have been asked to review \"{}\".\n\n{}\n",
            reviewer.label(),
            content.title,
            self.renderer.excerpt(&content.body, EXCERPT_CHARS)
        );
        self.queue
            .enqueue(
                OutgoingEmail {
                    to: reviewer.email.clone(),
                    subject: format!("Review requested: {}", content.title),
                    body,
                },
                Priority::Normal,
            )
            .await;
    }

    /// The aggregated review status of an author's content changed
    pub async fn status_changed(&self, content: &Content, status: ContentStatus) {
        let Some(author) = self.author_of(content).await else {
            return;
        };
        let verdict = match status {
            ContentStatus::Approved => "has been approved by all reviewers",
            ContentStatus::Rejected => "was rejected by a reviewer",
            _ => return,
        };
        self.queue
            .enqueue(
                OutgoingEmail {
                    to: author.email.clone(),
                    subject: format!("\"{}\" is now {}", content.title, status),
                    body: format!("Hi {},\n\n\"{}\" {}.\n", author.label(), content.title, verdict),
                },
                Priority::High,
            )
            .await;
    }

    /// An author's content went live
    pub async fn published(&self, content: &Content) {
        let Some(author) = self.author_of(content).await else {
            return;
        };
        self.queue
            .enqueue(
                OutgoingEmail {
                    to: author.email.clone(),
                    subject: format!("Published: {}", content.title),
                    body: format!(
                        "Hi {},\n\n\"{}\" is now published at /{}.\n",
                        author.label(),
                        content.title,
                        content.slug
                    ),
                },
                Priority::Low,
            )
            .await;
    }

    async fn author_of(&self, content: &Content) -> Option<User> {
        match self.users.get_by_id(content.author_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                tracing::warn!("Author {} of content {} not found", content.author_id, content.id);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to load author for content {}: {}", content.id, e);
                None
            }
        }
    }
}
