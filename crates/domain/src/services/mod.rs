//! Engine services.
//!
//! Pure resolution lives in `tag_membership`, `group_membership` and
//! `relation_projector`. Everything that touches a transaction goes through
//! `reconciliation`, `dispatch` and the `EdgeService` façade.

pub mod command_log;
pub mod dispatch;
pub mod edge_service;
pub mod fan_out;
pub mod group_membership;
pub mod reconciliation;
pub mod relation_projector;
pub mod tag_membership;
pub mod tunnel;

pub use command_log::{collapse_superseded, AgentState};
pub use dispatch::{CommandDispatcher, DispatchOutcome};
pub use edge_service::{EdgeService, EdgeSettings};
pub use fan_out::{fan_out, role_in_use, ClusterError, ClusterReader, FanOutTask, RoleBinding};
pub use group_membership::{
    is_member, resolve_endpoint_groups, resolve_group_members, EndpointGroupIndex,
};
pub use reconciliation::{EndpointDelta, ReconcileReport, ReconcileTrigger, Reconciler};
pub use relation_projector::{related_endpoints, related_resources, Catalog};
pub use tag_membership::{effective_tags, matches_tags};
pub use tunnel::{LiveTunnel, TunnelHandle, TunnelRegistry};
