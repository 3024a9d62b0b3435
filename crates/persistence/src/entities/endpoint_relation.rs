//! Endpoint relation entity (database row mapping).

use domain::models::{EndpointId, EndpointRelation, ResourceId, ResourceKind};
use sqlx::FromRow;

/// Database row mapping for the endpoint_relations table.
#[derive(Debug, Clone, FromRow)]
pub struct EndpointRelationEntity {
    pub endpoint_id: i64,
    pub stack_ids: Vec<i64>,
    pub job_ids: Vec<i64>,
    pub config_ids: Vec<i64>,
}

impl From<EndpointRelationEntity> for EndpointRelation {
    fn from(entity: EndpointRelationEntity) -> Self {
        EndpointRelation::from_parts(
            EndpointId(entity.endpoint_id),
            entity.stack_ids.into_iter().map(ResourceId),
            entity.job_ids.into_iter().map(ResourceId),
            entity.config_ids.into_iter().map(ResourceId),
        )
    }
}

impl From<&EndpointRelation> for EndpointRelationEntity {
    fn from(relation: &EndpointRelation) -> Self {
        let ids = |kind: ResourceKind| -> Vec<i64> {
            relation.ids_of(kind).into_iter().map(|id| id.get()).collect()
        };
        Self {
            endpoint_id: relation.endpoint_id.get(),
            stack_ids: ids(ResourceKind::Stack),
            job_ids: ids(ResourceKind::Job),
            config_ids: ids(ResourceKind::Config),
        }
    }
}
