//! Persistence layer for the entity manager.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Compilation of entity queries into parameterized SQL
//! - Store implementations of the domain's persistence ports

pub mod context;
pub mod db;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;
pub mod sql;

pub use context::PgDataContext;
pub use db::{create_pool, run_migrations, DatabaseConfig};
pub use repositories::{PgStore, PgTable, PgUserDirectory};
