//! Targetable resource entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::error::StoreError;
use domain::models::{EdgeGroupId, EdgeResource, ResourceId, ResourceKind, ResourcePayload};
use sqlx::FromRow;

/// Database row mapping for the edge_resources table.
///
/// `payload` holds the kind-tagged [`ResourcePayload`] as JSON; `kind` is
/// duplicated into its own column so lookups by reference stay indexed.
#[derive(Debug, Clone, FromRow)]
pub struct EdgeResourceEntity {
    pub id: i64,
    pub kind: String,
    pub name: String,
    pub edge_group_ids: Vec<i64>,
    pub version: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EdgeResourceEntity> for EdgeResource {
    type Error = StoreError;

    fn try_from(entity: EdgeResourceEntity) -> Result<Self, Self::Error> {
        let kind: ResourceKind = entity.kind.parse().map_err(StoreError::Backend)?;
        let payload: ResourcePayload = serde_json::from_value(entity.payload).map_err(|e| {
            StoreError::Backend(format!("Resource {} has a malformed payload: {}", entity.id, e))
        })?;
        if payload.kind() != kind {
            return Err(StoreError::Backend(format!(
                "Resource {} is stored as {} but its payload is {}",
                entity.id,
                kind,
                payload.kind()
            )));
        }

        Ok(Self {
            id: ResourceId(entity.id),
            name: entity.name,
            edge_groups: entity.edge_group_ids.into_iter().map(EdgeGroupId).collect(),
            version: entity.version,
            payload,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
