//! HTTP route handlers.

pub mod commands;
pub mod edge_groups;
pub mod endpoint_groups;
pub mod endpoints;
pub mod health;
pub mod reconcile;
pub mod resources;
pub mod tags;
