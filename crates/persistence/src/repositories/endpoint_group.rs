//! Static endpoint group repository.

use sqlx::PgConnection;

use crate::entities::EndpointGroupEntity;
use crate::metrics::QueryTimer;

/// Database operations on static endpoint groups.
pub struct EndpointGroupRepository;

impl EndpointGroupRepository {
    pub async fn find_all(
        conn: &mut PgConnection,
    ) -> Result<Vec<EndpointGroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_all_endpoint_groups");
        let result = sqlx::query_as::<_, EndpointGroupEntity>(
            "SELECT id, name, tag_ids FROM endpoint_groups ORDER BY id",
        )
        .fetch_all(conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<EndpointGroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_endpoint_group_by_id");
        let result = sqlx::query_as::<_, EndpointGroupEntity>(
            "SELECT id, name, tag_ids FROM endpoint_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await;
        timer.record();
        result
    }

    pub async fn insert(
        conn: &mut PgConnection,
        name: &str,
        tag_ids: &[i64],
    ) -> Result<EndpointGroupEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_endpoint_group");
        let result = sqlx::query_as::<_, EndpointGroupEntity>(
            r#"
            INSERT INTO endpoint_groups (name, tag_ids)
            VALUES ($1, $2)
            RETURNING id, name, tag_ids
            "#,
        )
        .bind(name)
        .bind(tag_ids)
        .fetch_one(conn)
        .await;
        timer.record();
        result
    }

    /// Returns the number of rows updated.
    pub async fn update(
        conn: &mut PgConnection,
        id: i64,
        name: &str,
        tag_ids: &[i64],
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("update_endpoint_group");
        let result = sqlx::query("UPDATE endpoint_groups SET name = $2, tag_ids = $3 WHERE id = $1")
            .bind(id)
            .bind(name)
            .bind(tag_ids)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_endpoint_group");
        let result = sqlx::query("DELETE FROM endpoint_groups WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
