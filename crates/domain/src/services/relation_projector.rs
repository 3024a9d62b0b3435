//! Projects group membership onto targetable resources.
//!
//! [`Catalog`] is a snapshot of everything membership depends on, read once
//! inside the current transaction. Nothing in it outlives the transaction.

use std::collections::{BTreeMap, BTreeSet};

use shared::set;

use super::group_membership::{
    resolve_endpoint_groups, resolve_group_members, EndpointGroupIndex,
};
use crate::error::StoreError;
use crate::models::{
    EdgeGroup, EdgeGroupId, EdgeResource, Endpoint, EndpointGroup, EndpointId, ResourceRef,
};
use crate::store::StoreTx;

/// Resources that apply to `endpoint`: those targeting any edge group it belongs to.
///
/// Endpoints that are not edge-eligible get no resources.
pub fn related_resources<'a>(
    endpoint: &Endpoint,
    endpoint_groups: &EndpointGroupIndex,
    edge_groups: impl IntoIterator<Item = &'a EdgeGroup>,
    resources: impl IntoIterator<Item = &'a EdgeResource>,
) -> BTreeSet<ResourceRef> {
    if !endpoint.is_edge_eligible() {
        return BTreeSet::new();
    }

    let memberships = resolve_endpoint_groups(endpoint, edge_groups, endpoint_groups);
    resources
        .into_iter()
        .filter(|resource| set::intersects(&resource.edge_groups, &memberships))
        .map(EdgeResource::reference)
        .collect()
}

/// Endpoints `resource` applies to: the union of its edge groups' members.
///
/// Targeted group IDs that no longer exist contribute nothing.
pub fn related_endpoints(
    resource: &EdgeResource,
    endpoints: &BTreeMap<EndpointId, Endpoint>,
    endpoint_groups: &EndpointGroupIndex,
    edge_groups: &BTreeMap<EdgeGroupId, EdgeGroup>,
) -> BTreeSet<EndpointId> {
    let member_sets: Vec<BTreeSet<EndpointId>> = resource
        .edge_groups
        .iter()
        .filter_map(|id| edge_groups.get(id))
        .map(|group| resolve_group_members(group, endpoints.values(), endpoint_groups))
        .collect();

    set::union(&member_sets)
        .into_iter()
        .filter(|id| endpoints.get(id).is_some_and(Endpoint::is_edge_eligible))
        .collect()
}

/// Snapshot of endpoints, groups and resources within one transaction.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub endpoints: BTreeMap<EndpointId, Endpoint>,
    pub endpoint_groups: EndpointGroupIndex,
    pub edge_groups: BTreeMap<EdgeGroupId, EdgeGroup>,
    pub resources: BTreeMap<ResourceRef, EdgeResource>,
}

impl Catalog {
    pub async fn load(tx: &mut dyn StoreTx) -> Result<Self, StoreError> {
        let endpoints = tx.endpoints().await?;
        let endpoint_groups = tx.endpoint_groups().await?;
        let edge_groups = tx.edge_groups().await?;
        let resources = tx.resources().await?;
        Ok(Self::from_parts(
            endpoints,
            endpoint_groups,
            edge_groups,
            resources,
        ))
    }

    pub fn from_parts(
        endpoints: Vec<Endpoint>,
        endpoint_groups: Vec<EndpointGroup>,
        edge_groups: Vec<EdgeGroup>,
        resources: Vec<EdgeResource>,
    ) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(|e| (e.id, e)).collect(),
            endpoint_groups: endpoint_groups.into_iter().map(|g| (g.id, g)).collect(),
            edge_groups: edge_groups.into_iter().map(|g| (g.id, g)).collect(),
            resources: resources
                .into_iter()
                .map(|r| (r.reference(), r))
                .collect(),
        }
    }

    pub fn members_of(&self, group: &EdgeGroup) -> BTreeSet<EndpointId> {
        resolve_group_members(group, self.endpoints.values(), &self.endpoint_groups)
    }

    pub fn groups_of(&self, endpoint: &Endpoint) -> BTreeSet<EdgeGroupId> {
        resolve_endpoint_groups(endpoint, self.edge_groups.values(), &self.endpoint_groups)
    }

    pub fn related_resources(&self, endpoint: &Endpoint) -> BTreeSet<ResourceRef> {
        related_resources(
            endpoint,
            &self.endpoint_groups,
            self.edge_groups.values(),
            self.resources.values(),
        )
    }

    pub fn related_endpoints(&self, resource: &EdgeResource) -> BTreeSet<EndpointId> {
        related_endpoints(
            resource,
            &self.endpoints,
            &self.endpoint_groups,
            &self.edge_groups,
        )
    }

    /// Resources that list `group` among their targets.
    pub fn resources_targeting(&self, group: EdgeGroupId) -> BTreeSet<ResourceRef> {
        self.resources
            .values()
            .filter(|r| r.edge_groups.contains(&group))
            .map(EdgeResource::reference)
            .collect()
    }
}
