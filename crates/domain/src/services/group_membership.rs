//! Edge group membership resolution.
//!
//! Static groups return their stored endpoint list verbatim. Dynamic groups
//! are evaluated on every call: only edge-eligible endpoints are considered,
//! and each is matched against the group's tags together with the tags of
//! its static group.

use std::collections::{BTreeMap, BTreeSet};

use super::tag_membership::matches_tags;
use crate::models::{
    EdgeGroup, EdgeGroupId, Endpoint, EndpointGroup, EndpointGroupId, EndpointId, GroupSelector,
    TagId,
};

/// Static group lookup used to find inherited tags.
pub type EndpointGroupIndex = BTreeMap<EndpointGroupId, EndpointGroup>;

fn inherited_tags(endpoint: &Endpoint, endpoint_groups: &EndpointGroupIndex) -> BTreeSet<TagId> {
    endpoint_groups
        .get(&endpoint.group_id)
        .map(|g| g.tag_ids.clone())
        .unwrap_or_default()
}

/// Whether `endpoint` belongs to `group`.
pub fn is_member(
    group: &EdgeGroup,
    endpoint: &Endpoint,
    endpoint_groups: &EndpointGroupIndex,
) -> bool {
    match &group.selector {
        GroupSelector::Static { endpoints } => endpoints.contains(&endpoint.id),
        GroupSelector::Dynamic { tags, match_mode } => {
            endpoint.is_edge_eligible()
                && matches_tags(
                    &endpoint.tag_ids,
                    &inherited_tags(endpoint, endpoint_groups),
                    tags,
                    *match_mode,
                )
        }
    }
}

/// Resolves the endpoint set of a group.
pub fn resolve_group_members<'a>(
    group: &EdgeGroup,
    endpoints: impl IntoIterator<Item = &'a Endpoint>,
    endpoint_groups: &EndpointGroupIndex,
) -> BTreeSet<EndpointId> {
    match &group.selector {
        GroupSelector::Static { endpoints: members } => members.clone(),
        GroupSelector::Dynamic { .. } => endpoints
            .into_iter()
            .filter(|endpoint| is_member(group, endpoint, endpoint_groups))
            .map(|endpoint| endpoint.id)
            .collect(),
    }
}

/// Inverse query: the edge groups `endpoint` currently belongs to.
pub fn resolve_endpoint_groups<'a>(
    endpoint: &Endpoint,
    edge_groups: impl IntoIterator<Item = &'a EdgeGroup>,
    endpoint_groups: &EndpointGroupIndex,
) -> BTreeSet<EdgeGroupId> {
    edge_groups
        .into_iter()
        .filter(|group| is_member(group, endpoint, endpoint_groups))
        .map(|group| group.id)
        .collect()
}
