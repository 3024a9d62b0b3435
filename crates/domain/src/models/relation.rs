//! Device relation record: the persisted baseline of resources believed applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{EndpointId, ResourceId};
use super::resource::{ResourceKind, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRelation {
    pub endpoint_id: EndpointId,
    pub resources: BTreeSet<ResourceRef>,
}

impl EndpointRelation {
    /// An empty relation, created alongside the endpoint.
    pub fn empty(endpoint_id: EndpointId) -> Self {
        Self {
            endpoint_id,
            resources: BTreeSet::new(),
        }
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.resources.contains(resource)
    }

    /// IDs of the related resources of one kind.
    pub fn ids_of(&self, kind: ResourceKind) -> BTreeSet<ResourceId> {
        self.resources
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.id)
            .collect()
    }

    /// Rebuilds a relation from per-kind ID lists, as stored in the database.
    pub fn from_parts(
        endpoint_id: EndpointId,
        stacks: impl IntoIterator<Item = ResourceId>,
        jobs: impl IntoIterator<Item = ResourceId>,
        configs: impl IntoIterator<Item = ResourceId>,
    ) -> Self {
        let resources = stacks
            .into_iter()
            .map(|id| ResourceRef::new(ResourceKind::Stack, id))
            .chain(jobs.into_iter().map(|id| ResourceRef::new(ResourceKind::Job, id)))
            .chain(
                configs
                    .into_iter()
                    .map(|id| ResourceRef::new(ResourceKind::Config, id)),
            )
            .collect();
        Self {
            endpoint_id,
            resources,
        }
    }
}
