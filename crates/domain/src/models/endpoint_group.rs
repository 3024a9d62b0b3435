//! Static endpoint group domain model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::{Validate, ValidationError};

use super::ids::{EndpointGroupId, TagId};

/// The group every endpoint falls back to. Created at store bootstrap and never deleted.
pub const UNASSIGNED_GROUP_ID: EndpointGroupId = EndpointGroupId(1);

/// Upper bound on the tags a static group may carry.
pub const MAX_GROUP_TAGS: usize = 64;

/// The single static group an endpoint belongs to.
///
/// Its tags are inherited by member endpoints when matching dynamic edge groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointGroup {
    pub id: EndpointGroupId,
    pub name: String,
    #[serde(default)]
    pub tag_ids: BTreeSet<TagId>,
}

fn validate_tag_ids(tag_ids: &BTreeSet<TagId>) -> Result<(), ValidationError> {
    if tag_ids.len() > MAX_GROUP_TAGS {
        let mut err = ValidationError::new("too_many_tags");
        err.message = Some(format!("A group may carry at most {} tags", MAX_GROUP_TAGS).into());
        return Err(err);
    }
    if tag_ids.iter().any(|id| id.get() <= 0) {
        let mut err = ValidationError::new("invalid_tag_id");
        err.message = Some("Tag ids must be positive".into());
        return Err(err);
    }
    Ok(())
}

/// Request payload for static group creation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpointGroupRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: String,

    #[serde(default)]
    #[validate(custom(function = "validate_tag_ids"))]
    pub tag_ids: BTreeSet<TagId>,
}

/// Request payload for replacing a static group's tags.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEndpointGroupTagsRequest {
    #[validate(custom(function = "validate_tag_ids"))]
    pub tag_ids: BTreeSet<TagId>,
}
