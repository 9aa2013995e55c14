//! Content model
//!
//! A content item moves through `draft -> in_review -> approved|rejected ->
//! published`. While it is in the review phase its status is derived from
//! the approvals recorded against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub slug: String,
    pub title: String,
    /// Markdown source
    pub body: String,
    /// Rendered HTML of `body`
    pub body_html: String,
    pub status: ContentStatus,
    pub author_id: i64,
    pub assignee_id: Option<i64>,
    /// Incremented on every edit
    pub version: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    #[default]
    Draft,
    InReview,
    Approved,
    Rejected,
    Published,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 5] = [
        ContentStatus::Draft,
        ContentStatus::InReview,
        ContentStatus::Approved,
        ContentStatus::Rejected,
        ContentStatus::Published,
    ];

    /// Statuses driven by approvals
    pub fn is_review_phase(&self) -> bool {
        matches!(
            self,
            ContentStatus::InReview | ContentStatus::Approved | ContentStatus::Rejected
        )
    }

    /// Whether the body may be edited. Editors can still fix content under review.
    pub fn is_editable(&self, by_editor: bool) -> bool {
        match self {
            ContentStatus::Draft | ContentStatus::Rejected => true,
            ContentStatus::InReview => by_editor,
            ContentStatus::Approved | ContentStatus::Published => false,
        }
    }

    pub fn can_submit(&self) -> bool {
        matches!(self, ContentStatus::Draft | ContentStatus::Rejected)
    }

    pub fn can_withdraw(&self) -> bool {
        self.is_review_phase()
    }

    pub fn can_publish(&self) -> bool {
        *self == ContentStatus::Approved
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentStatus::Draft => "draft",
            ContentStatus::InReview => "in_review",
            ContentStatus::Approved => "approved",
            ContentStatus::Rejected => "rejected",
            ContentStatus::Published => "published",
        };
        f.write_str(s)
    }
}

impl FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(ContentStatus::Draft),
            "in_review" => Ok(ContentStatus::InReview),
            "approved" => Ok(ContentStatus::Approved),
            "rejected" => Ok(ContentStatus::Rejected),
            "published" => Ok(ContentStatus::Published),
            _ => Err(anyhow::anyhow!("Invalid content status: {}", s)),
        }
    }
}

/// Input for creating content
#[derive(Debug, Clone, Deserialize)]
pub struct CreateContentInput {
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Generated from the title when absent
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<i64>,
}

/// Input for updating content. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateContentInput {
    pub title: Option<String>,
    pub body: Option<String>,
    pub slug: Option<String>,
    pub assignee_id: Option<i64>,
}

/// Filters for listing content
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentFilter {
    pub status: Option<ContentStatus>,
    pub author_id: Option<i64>,
    /// Case-insensitive substring matched against title and body
    pub q: Option<String>,
}

impl ContentFilter {
    /// Lowercased, trimmed search term, if any
    pub fn search_term(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}
