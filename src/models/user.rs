//! User model
//!
//! Users are provisioned by the external identity provider; Copydesk only
//! stores the profile fields and the role it authorizes against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user known to Copydesk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Stable identifier assigned by the identity provider
    pub subject: String,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(subject: String, username: String, email: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            subject,
            username,
            email,
            display_name: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Check if the user is an editor (or higher)
    pub fn is_editor(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Editor)
    }

    /// Check if the user can review content. Editors review too.
    pub fn can_review(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Editor | UserRole::Reviewer)
    }

    /// Admins and editors can edit any content; everyone else only their own.
    pub fn can_edit(&self, author_id: i64) -> bool {
        self.is_editor() || self.id == author_id
    }

    /// Name shown in notifications
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// User role for authorization.
///
/// - Admin: full access, including user management
/// - Editor: edits any content, routes reviews, publishes
/// - Reviewer: records verdicts on content assigned to them
/// - Author: writes and submits own content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Editor,
    Reviewer,
    #[default]
    Author,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Editor => write!(f, "editor"),
            UserRole::Reviewer => write!(f, "reviewer"),
            UserRole::Author => write!(f, "author"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "editor" => Ok(UserRole::Editor),
            "reviewer" => Ok(UserRole::Reviewer),
            "author" => Ok(UserRole::Author),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Profile pushed by the identity provider when it opens a session
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionUserInput {
    pub subject: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}
