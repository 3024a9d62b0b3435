//! Edge group repository.

use sqlx::PgConnection;

use crate::entities::{EdgeGroupEntity, SelectorColumns};
use crate::metrics::QueryTimer;

/// Database operations on edge groups.
pub struct EdgeGroupRepository;

impl EdgeGroupRepository {
    pub async fn find_all(conn: &mut PgConnection) -> Result<Vec<EdgeGroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_all_edge_groups");
        let result = sqlx::query_as::<_, EdgeGroupEntity>(
            r#"
            SELECT id, name, dynamic, partial_match, tag_ids, endpoint_ids
            FROM edge_groups
            ORDER BY id
            "#,
        )
        .fetch_all(conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<EdgeGroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_edge_group_by_id");
        let result = sqlx::query_as::<_, EdgeGroupEntity>(
            r#"
            SELECT id, name, dynamic, partial_match, tag_ids, endpoint_ids
            FROM edge_groups
            WHERE id = $1
            "#,
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
        selector: &SelectorColumns,
    ) -> Result<EdgeGroupEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_edge_group");
        let result = sqlx::query_as::<_, EdgeGroupEntity>(
            r#"
            INSERT INTO edge_groups (name, dynamic, partial_match, tag_ids, endpoint_ids)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, dynamic, partial_match, tag_ids, endpoint_ids
            "#,
        )
        .bind(name)
        .bind(selector.dynamic)
        .bind(selector.partial_match)
        .bind(&selector.tag_ids)
        .bind(&selector.endpoint_ids)
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
        selector: &SelectorColumns,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("update_edge_group");
        let result = sqlx::query(
            r#"
            UPDATE edge_groups
            SET name = $2, dynamic = $3, partial_match = $4, tag_ids = $5, endpoint_ids = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(selector.dynamic)
        .bind(selector.partial_match)
        .bind(&selector.tag_ids)
        .bind(&selector.endpoint_ids)
        .execute(conn)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_edge_group");
        let result = sqlx::query("DELETE FROM edge_groups WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
