//! Edge group entity (database row mapping).
//!
//! Both selector shapes share one row: `dynamic` picks which of `tag_ids`
//! and `endpoint_ids` is meaningful.

use domain::models::{EdgeGroup, EdgeGroupId, EndpointId, GroupSelector, MatchMode, TagId};
use sqlx::FromRow;

/// Database row mapping for the edge_groups table.
#[derive(Debug, Clone, FromRow)]
pub struct EdgeGroupEntity {
    pub id: i64,
    pub name: String,
    pub dynamic: bool,
    pub partial_match: bool,
    pub tag_ids: Vec<i64>,
    pub endpoint_ids: Vec<i64>,
}

impl From<EdgeGroupEntity> for EdgeGroup {
    fn from(entity: EdgeGroupEntity) -> Self {
        let selector = if entity.dynamic {
            GroupSelector::Dynamic {
                tags: entity.tag_ids.into_iter().map(TagId).collect(),
                match_mode: MatchMode::from_partial_match(entity.partial_match),
            }
        } else {
            GroupSelector::Static {
                endpoints: entity.endpoint_ids.into_iter().map(EndpointId).collect(),
            }
        };
        Self {
            id: EdgeGroupId(entity.id),
            name: entity.name,
            selector,
        }
    }
}

/// Column values for writing a selector.
pub struct SelectorColumns {
    pub dynamic: bool,
    pub partial_match: bool,
    pub tag_ids: Vec<i64>,
    pub endpoint_ids: Vec<i64>,
}

impl From<&GroupSelector> for SelectorColumns {
    fn from(selector: &GroupSelector) -> Self {
        match selector {
            GroupSelector::Static { endpoints } => Self {
                dynamic: false,
                partial_match: false,
                tag_ids: Vec::new(),
                endpoint_ids: endpoints.iter().map(|id| id.get()).collect(),
            },
            GroupSelector::Dynamic { tags, match_mode } => Self {
                dynamic: true,
                partial_match: match_mode.is_partial(),
                tag_ids: tags.iter().map(|id| id.get()).collect(),
                endpoint_ids: Vec::new(),
            },
        }
    }
}
