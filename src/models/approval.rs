//! Approval model
//!
//! One approval per (content, reviewer) pair records that reviewer's verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A reviewer's verdict on a content item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: i64,
    pub content_id: i64,
    pub reviewer_id: i64,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 3] = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
    ];
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid approval status: {}", s)),
        }
    }
}

/// Verdict submitted by a reviewer
#[derive(Debug, Clone, Deserialize)]
pub struct VerdictInput {
    pub status: ApprovalStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Request to invite a reviewer onto content
#[derive(Debug, Clone, Deserialize)]
pub struct InviteReviewerInput {
    pub reviewer_id: i64,
}

/// Bulk action over several content items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkApprovalAction {
    Approve,
    Reject,
}

impl BulkApprovalAction {
    pub fn verdict(&self) -> ApprovalStatus {
        match self {
            BulkApprovalAction::Approve => ApprovalStatus::Approved,
            BulkApprovalAction::Reject => ApprovalStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkApprovalInput {
    pub action: BulkApprovalAction,
    pub content_ids: Vec<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Per-item outcome of a bulk action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkApprovalResult {
    pub succeeded: Vec<i64>,
    pub failed: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkFailure {
    pub content_id: i64,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_status_parse() {
        for status in ApprovalStatus::ALL {
            assert_eq!(ApprovalStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert_eq!(ApprovalStatus::from_str("APPROVED").unwrap(), ApprovalStatus::Approved);
        assert!(ApprovalStatus::from_str("maybe").is_err());
    }

    #[test]
    fn test_bulk_action_maps_to_verdict() {
        assert_eq!(BulkApprovalAction::Approve.verdict(), ApprovalStatus::Approved);
        assert_eq!(BulkApprovalAction::Reject.verdict(), ApprovalStatus::Rejected);
    }

    #[test]
    fn test_bulk_input_deserialize() {
        let input: BulkApprovalInput =
            serde_json::from_str(r#"{"action":"reject","content_ids":[1,2],"comment":"no"}"#)
                .unwrap();
        assert_eq!(input.action, BulkApprovalAction::Reject);
        assert_eq!(input.content_ids, vec![1, 2]);
        assert_eq!(input.comment.as_deref(), Some("no"));
    }
}
