//! Domain models for the edge fleet controller.

pub mod command;
pub mod edge_group;
pub mod endpoint;
pub mod endpoint_group;
pub mod ids;
pub mod relation;
pub mod resource;
pub mod tag;

pub use command::{
    AcknowledgeCommandsRequest, CommandEnvelope, CommandOperation, ConfigCommandValue,
    EdgeAsyncCommand, EnqueueCommandRequest, JobCommandValue, RemovalValue, StackCommandValue,
};
pub use edge_group::{EdgeGroup, EdgeGroupRequest, GroupSelector, MatchMode};
pub use endpoint::{
    Endpoint, EndpointKind, EndpointStatus, RegisterEndpointRequest, UpdateEndpointRequest,
};
pub use endpoint_group::{
    CreateEndpointGroupRequest, EndpointGroup, UpdateEndpointGroupTagsRequest,
    UNASSIGNED_GROUP_ID,
};
pub use ids::{CommandId, EdgeGroupId, EndpointGroupId, EndpointId, ResourceId, TagId};
pub use relation::EndpointRelation;
pub use resource::{
    ConfigSpec, CreateResourceRequest, DeploymentType, EdgeResource, JobSpec, ResourceKind,
    ResourcePayload, ResourceRef, StackSpec, UpdateResourceRequest,
};
pub use tag::{CreateTagRequest, Tag};
