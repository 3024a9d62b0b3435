//! Repository implementations for database operations.
//!
//! Repositories are stateless and run every query on a connection supplied
//! by the caller, which lets one store transaction span many of them.

pub mod edge_async_command;
pub mod edge_group;
pub mod edge_resource;
pub mod endpoint;
pub mod endpoint_group;
pub mod endpoint_relation;
pub mod tag;

pub use edge_async_command::{EdgeAsyncCommandRepository, NewCommandRow};
pub use edge_group::EdgeGroupRepository;
pub use edge_resource::{EdgeResourceRepository, EdgeResourceRow};
pub use endpoint::{EndpointRepository, EndpointRow};
pub use endpoint_group::EndpointGroupRepository;
pub use endpoint_relation::EndpointRelationRepository;
pub use tag::TagRepository;
