//! Static endpoint group entity (database row mapping).

use domain::models::{EndpointGroup, EndpointGroupId, TagId};
use sqlx::FromRow;

/// Database row mapping for the endpoint_groups table.
#[derive(Debug, Clone, FromRow)]
pub struct EndpointGroupEntity {
    pub id: i64,
    pub name: String,
    pub tag_ids: Vec<i64>,
}

impl From<EndpointGroupEntity> for EndpointGroup {
    fn from(entity: EndpointGroupEntity) -> Self {
        Self {
            id: EndpointGroupId(entity.id),
            name: entity.name,
            tag_ids: entity.tag_ids.into_iter().map(TagId).collect(),
        }
    }
}
