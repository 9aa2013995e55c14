//! Database layer
//!
//! Database abstraction for Copydesk. Two backends are supported:
//! - SQLite (default, single-file deployment)
//! - MySQL (shared deployments)
//!
//! ```ignore
//! use copydesk::config::DatabaseConfig;
//! use copydesk::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};
