//! User service
//!
//! Session issuance on behalf of the identity provider, session validation
//! for every authenticated request, and admin user management.

use crate::config::AuthConfig;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{ListParams, PagedResult, ProvisionUserInput, Session, User, UserRole};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// The caller is not the identity provider
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Session handed back to the identity provider
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    provider_secret: Option<String>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            provider_secret: auth.provider_secret.clone().filter(|s| !s.is_empty()),
            session_ttl: Duration::hours(auth.session_ttl_hours.max(1)),
        }
    }

    /// Upsert the user described by the identity provider and open a session.
    ///
    /// Refused unless `presented_secret` matches the configured provider secret.
    pub async fn open_session(
        &self,
        presented_secret: Option<&str>,
        input: ProvisionUserInput,
    ) -> Result<IssuedSession, UserServiceError> {
        let expected = self.provider_secret.as_deref().ok_or_else(|| {
            UserServiceError::Unauthorized("session issuance is not configured".to_string())
        })?;
        match presented_secret {
            Some(presented) if secret_matches(presented, expected) => {}
            _ => {
                return Err(UserServiceError::Unauthorized(
                    "invalid provider secret".to_string(),
                ))
            }
        }

        validate_profile(&input)?;

        let user = self
            .user_repo
            .upsert_by_subject(&input)
            .await
            .context("Failed to provision user")?;
        let session = Session::issue(user.id, self.session_ttl);
        self.session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        tracing::info!(user_id = user.id, subject = %user.subject, "Session opened");
        Ok(IssuedSession {
            token: session.id,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Resolve a session token to its user. Expired sessions are deleted.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Delete every expired session
    pub async fn purge_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let removed = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to purge sessions")?;
        if removed > 0 {
            tracing::info!("Purged {} expired session(s)", removed);
        }
        Ok(removed)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound(id))
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self.user_repo.list(params).await.context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Change a user's role. Admins cannot change their own role.
    pub async fn set_role(
        &self,
        actor: &User,
        user_id: i64,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        if actor.id == user_id {
            return Err(UserServiceError::ValidationError(
                "cannot change your own role".to_string(),
            ));
        }
        let updated = self
            .user_repo
            .update_role(user_id, role)
            .await
            .context("Failed to update role")?;
        if !updated {
            return Err(UserServiceError::NotFound(user_id));
        }
        tracing::info!(actor = actor.id, user_id, role = %role, "Role changed");
        self.get_by_id(user_id).await
    }
}

fn validate_profile(input: &ProvisionUserInput) -> Result<(), UserServiceError> {
    if input.subject.trim().is_empty() {
        return Err(UserServiceError::ValidationError("subject is required".to_string()));
    }
    if input.username.trim().is_empty() {
        return Err(UserServiceError::ValidationError("username is required".to_string()));
    }
    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(format!(
            "invalid email: {}",
            input.email
        )));
    }
    Ok(())
}

fn secret_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
