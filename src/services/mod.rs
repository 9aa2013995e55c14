//! Services layer - Business logic
//!
//! Services implement the workflow rules, coordinate repositories, the cache
//! and the notification queue, and report failures through their own error
//! enums.

pub mod analytics;
pub mod approval;
pub mod board;
pub mod content;
pub mod email;
pub mod markdown;
pub mod notification;
pub mod ordering;
pub mod user;
pub mod workflow;

pub use analytics::{AnalyticsService, AnalyticsSummary};
pub use approval::{ApprovalService, ApprovalServiceError};
pub use board::{BoardService, BoardServiceError};
pub use content::{generate_slug, ContentService, ContentServiceError};
pub use email::{create_mailer, EmailQueue, Mailer, OutgoingEmail, Priority};
pub use markdown::MarkdownRenderer;
pub use notification::NotificationService;
pub use ordering::{append_order, compute_next_status_order, ORDER_STEP};
pub use user::{IssuedSession, UserService, UserServiceError};
pub use workflow::{aggregate_status, KeyedLocks};
