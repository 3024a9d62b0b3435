//! Tag repository.

use sqlx::PgConnection;

use crate::entities::TagEntity;
use crate::metrics::QueryTimer;

/// Database operations on tags. Every call runs on the caller's connection.
pub struct TagRepository;

impl TagRepository {
    pub async fn find_all(conn: &mut PgConnection) -> Result<Vec<TagEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_all_tags");
        let result = sqlx::query_as::<_, TagEntity>("SELECT id, name FROM tags ORDER BY id")
            .fetch_all(conn)
            .await;
        timer.record();
        result
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<TagEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_tag_by_id");
        let result = sqlx::query_as::<_, TagEntity>("SELECT id, name FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await;
        timer.record();
        result
    }

    pub async fn insert(conn: &mut PgConnection, name: &str) -> Result<TagEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_tag");
        let result = sqlx::query_as::<_, TagEntity>(
            "INSERT INTO tags (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(conn)
        .await;
        timer.record();
        result
    }

    /// Returns the number of rows deleted.
    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_tag");
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
