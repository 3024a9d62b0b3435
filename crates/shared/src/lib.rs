//! Shared utilities and common types for the edge fleet controller.
//!
//! This crate provides common functionality used across all other crates:
//! - Set algebra over identifier sets (tags, memberships, command targets)
//! - Content digests and encoding for command payloads
//! - Common validation logic

pub mod crypto;
pub mod set;
pub mod validation;
