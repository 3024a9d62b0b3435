//! Tag domain model.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ids::TagId;

/// A label attached to endpoints and static groups, matched by dynamic edge groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Request payload for tag creation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTagRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: String,
}
