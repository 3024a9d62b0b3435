//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod edge_async_command;
pub mod edge_group;
pub mod edge_resource;
pub mod endpoint;
pub mod endpoint_group;
pub mod endpoint_relation;
pub mod tag;

pub use edge_async_command::EdgeAsyncCommandEntity;
pub use edge_group::{EdgeGroupEntity, SelectorColumns};
pub use edge_resource::EdgeResourceEntity;
pub use endpoint::EndpointEntity;
pub use endpoint_group::EndpointGroupEntity;
pub use endpoint_relation::EndpointRelationEntity;
pub use tag::TagEntity;
