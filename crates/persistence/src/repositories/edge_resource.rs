//! Targetable resource repository.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::entities::EdgeResourceEntity;
use crate::metrics::QueryTimer;

const RESOURCE_COLUMNS: &str =
    "id, kind, name, edge_group_ids, version, payload, created_at, updated_at";

/// Column values written on insert and update.
#[derive(Debug, Clone)]
pub struct EdgeResourceRow<'a> {
    pub kind: &'a str,
    pub name: &'a str,
    pub edge_group_ids: Vec<i64>,
    pub version: i32,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Database operations on edge stacks, jobs and configs.
pub struct EdgeResourceRepository;

impl EdgeResourceRepository {
    pub async fn find_all(
        conn: &mut PgConnection,
    ) -> Result<Vec<EdgeResourceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_all_edge_resources");
        let result = sqlx::query_as::<_, EdgeResourceEntity>(&format!(
            "SELECT {} FROM edge_resources ORDER BY id",
            RESOURCE_COLUMNS
        ))
        .fetch_all(conn)
        .await;
        timer.record();
        result
    }

    pub async fn find(
        conn: &mut PgConnection,
        kind: &str,
        id: i64,
    ) -> Result<Option<EdgeResourceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_edge_resource");
        let result = sqlx::query_as::<_, EdgeResourceEntity>(&format!(
            "SELECT {} FROM edge_resources WHERE id = $1 AND kind = $2",
            RESOURCE_COLUMNS
        ))
        .bind(id)
        .bind(kind)
        .fetch_optional(conn)
        .await;
        timer.record();
        result
    }

    pub async fn insert(
        conn: &mut PgConnection,
        row: &EdgeResourceRow<'_>,
        created_at: DateTime<Utc>,
    ) -> Result<EdgeResourceEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_edge_resource");
        let result = sqlx::query_as::<_, EdgeResourceEntity>(&format!(
            r#"
            INSERT INTO edge_resources (kind, name, edge_group_ids, version, payload,
                                        created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            RESOURCE_COLUMNS
        ))
        .bind(row.kind)
        .bind(row.name)
        .bind(&row.edge_group_ids)
        .bind(row.version)
        .bind(&row.payload)
        .bind(created_at)
        .bind(row.updated_at)
        .fetch_one(conn)
        .await;
        timer.record();
        result
    }

    /// Returns the number of rows updated. The kind of a resource never changes.
    pub async fn update(
        conn: &mut PgConnection,
        id: i64,
        row: &EdgeResourceRow<'_>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("update_edge_resource");
        let result = sqlx::query(
            r#"
            UPDATE edge_resources
            SET name = $3, edge_group_ids = $4, version = $5, payload = $6, updated_at = $7
            WHERE id = $1 AND kind = $2
            "#,
        )
        .bind(id)
        .bind(row.kind)
        .bind(row.name)
        .bind(&row.edge_group_ids)
        .bind(row.version)
        .bind(&row.payload)
        .bind(row.updated_at)
        .execute(conn)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut PgConnection, kind: &str, id: i64) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_edge_resource");
        let result = sqlx::query("DELETE FROM edge_resources WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
