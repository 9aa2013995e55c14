//! Copydesk - role-based content review with an approval workflow
//!
//! Authors write content, reviewers record verdicts, and the aggregated
//! verdicts drive each item's status. A project board with gapped ordering
//! keys ships alongside.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
