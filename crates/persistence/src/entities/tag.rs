//! Tag entity (database row mapping).

use domain::models::{Tag, TagId};
use sqlx::FromRow;

/// Database row mapping for the tags table.
#[derive(Debug, Clone, FromRow)]
pub struct TagEntity {
    pub id: i64,
    pub name: String,
}

impl From<TagEntity> for Tag {
    fn from(entity: TagEntity) -> Self {
        Self {
            id: TagId(entity.id),
            name: entity.name,
        }
    }
}
