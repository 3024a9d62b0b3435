//! Command log entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::error::StoreError;
use domain::models::{CommandEnvelope, CommandId, EdgeAsyncCommand, EndpointId};
use sqlx::FromRow;

/// Database row mapping for the edge_async_commands table.
#[derive(Debug, Clone, FromRow)]
pub struct EdgeAsyncCommandEntity {
    pub id: i64,
    pub endpoint_id: i64,
    pub resource_type: String,
    pub operation: String,
    pub path: String,
    pub value: serde_json::Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EdgeAsyncCommandEntity> for EdgeAsyncCommand {
    type Error = StoreError;

    fn try_from(entity: EdgeAsyncCommandEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CommandId(entity.id),
            endpoint_id: EndpointId(entity.endpoint_id),
            timestamp: entity.created_at,
            envelope: CommandEnvelope {
                resource_type: entity.resource_type.parse().map_err(StoreError::Backend)?,
                operation: entity.operation.parse().map_err(StoreError::Backend)?,
                path: entity.path,
                value: entity.value,
                version: entity.version,
            },
        })
    }
}
