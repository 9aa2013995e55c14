//! Database repositories
//!
//! One repository per entity family. Each is a trait plus an `Sqlx*`
//! implementation that runs the SQLite or MySQL variant of every query.

pub mod approval;
pub mod board;
pub mod content;
pub mod session;
pub mod task;
pub mod user;

pub use approval::{ApprovalRepository, SqlxApprovalRepository};
pub use board::{BoardRepository, SqlxBoardRepository};
pub use content::{ContentRepository, SqlxContentRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use task::{SqlxTaskRepository, TaskRepository};
pub use user::{SqlxUserRepository, UserRepository};
