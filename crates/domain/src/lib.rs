//! Domain layer for the edge fleet controller.
//!
//! This crate contains:
//! - Domain models (Endpoint, EdgeGroup, EdgeResource, EdgeAsyncCommand)
//! - Store, content and tunnel interfaces, with in-memory implementations
//! - Membership resolution, reconciliation and command dispatch
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod store;
