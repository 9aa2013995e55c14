//! Data models

pub mod approval;
pub mod board;
pub mod content;
pub mod pagination;
pub mod session;
pub mod user;

pub use approval::*;
pub use board::*;
pub use content::*;
pub use pagination::*;
pub use session::*;
pub use user::*;
