//! Endpoint entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::error::StoreError;
use domain::models::{Endpoint, EndpointGroupId, EndpointId, EndpointKind, TagId};
use sqlx::FromRow;

/// Database row mapping for the endpoints table.
#[derive(Debug, Clone, FromRow)]
pub struct EndpointEntity {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub group_id: i64,
    pub tag_ids: Vec<i64>,
    pub user_trusted: bool,
    pub async_mode: bool,
    pub edge_id: Option<String>,
    pub checkin_interval_secs: Option<i32>,
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EndpointEntity> for Endpoint {
    type Error = StoreError;

    fn try_from(entity: EndpointEntity) -> Result<Self, Self::Error> {
        let kind: EndpointKind = entity.kind.parse().map_err(StoreError::Backend)?;
        let checkin_interval_secs = entity
            .checkin_interval_secs
            .map(u32::try_from)
            .transpose()
            .map_err(|_| {
                StoreError::Backend(format!(
                    "Endpoint {} has a negative check-in interval",
                    entity.id
                ))
            })?;

        Ok(Self {
            id: EndpointId(entity.id),
            name: entity.name,
            kind,
            group_id: EndpointGroupId(entity.group_id),
            tag_ids: entity.tag_ids.into_iter().map(TagId).collect(),
            user_trusted: entity.user_trusted,
            async_mode: entity.async_mode,
            edge_id: entity.edge_id,
            checkin_interval_secs,
            last_checkin_at: entity.last_checkin_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(kind: &str, interval: Option<i32>) -> EndpointEntity {
        EndpointEntity {
            id: 12,
            name: "gateway-12".to_string(),
            kind: kind.to_string(),
            group_id: 1,
            tag_ids: vec![3, 5],
            user_trusted: true,
            async_mode: true,
            edge_id: Some("agent-12".to_string()),
            checkin_interval_secs: interval,
            last_checkin_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_endpoint_conversion() {
        let endpoint = Endpoint::try_from(entity("edge_agent_docker", Some(30))).unwrap();
        assert_eq!(endpoint.kind, EndpointKind::EdgeAgentDocker);
        assert_eq!(endpoint.checkin_interval_secs, Some(30));
        assert!(endpoint.is_edge_eligible());
        assert!(endpoint.tag_ids.contains(&TagId(5)));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = Endpoint::try_from(entity("serial_console", None)).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_negative_interval_is_rejected() {
        assert!(Endpoint::try_from(entity("edge_agent_kubernetes", Some(-1))).is_err());
    }
}
