//! Persistence layer for the edge fleet controller.
//!
//! This crate contains:
//! - Database connection management and schema migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - The PostgreSQL store and filesystem content store used by the engine

pub mod content;
pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use content::FsContentStore;
pub use db::{create_pool, run_migrations, DatabaseConfig};
pub use store::{PgEdgeStore, PgStoreTx};
