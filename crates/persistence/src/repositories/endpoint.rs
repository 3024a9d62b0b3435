//! Endpoint repository.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::entities::EndpointEntity;
use crate::metrics::QueryTimer;

const ENDPOINT_COLUMNS: &str = "id, name, kind, group_id, tag_ids, user_trusted, async_mode, \
     edge_id, checkin_interval_secs, last_checkin_at, created_at, updated_at";

/// Column values written on insert and update.
#[derive(Debug, Clone)]
pub struct EndpointRow<'a> {
    pub name: &'a str,
    pub kind: &'a str,
    pub group_id: i64,
    pub tag_ids: Vec<i64>,
    pub user_trusted: bool,
    pub async_mode: bool,
    pub edge_id: Option<&'a str>,
    pub checkin_interval_secs: Option<i32>,
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Database operations on endpoints.
pub struct EndpointRepository;

impl EndpointRepository {
    pub async fn find_all(conn: &mut PgConnection) -> Result<Vec<EndpointEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_all_endpoints");
        let result = sqlx::query_as::<_, EndpointEntity>(&format!(
            "SELECT {} FROM endpoints ORDER BY id",
            ENDPOINT_COLUMNS
        ))
        .fetch_all(conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<EndpointEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_endpoint_by_id");
        let result = sqlx::query_as::<_, EndpointEntity>(&format!(
            "SELECT {} FROM endpoints WHERE id = $1",
            ENDPOINT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await;
        timer.record();
        result
    }

    pub async fn insert(
        conn: &mut PgConnection,
        row: &EndpointRow<'_>,
        created_at: DateTime<Utc>,
    ) -> Result<EndpointEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_endpoint");
        let result = sqlx::query_as::<_, EndpointEntity>(&format!(
            r#"
            INSERT INTO endpoints (name, kind, group_id, tag_ids, user_trusted, async_mode,
                                   edge_id, checkin_interval_secs, last_checkin_at,
                                   created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            ENDPOINT_COLUMNS
        ))
        .bind(row.name)
        .bind(row.kind)
        .bind(row.group_id)
        .bind(&row.tag_ids)
        .bind(row.user_trusted)
        .bind(row.async_mode)
        .bind(row.edge_id)
        .bind(row.checkin_interval_secs)
        .bind(row.last_checkin_at)
        .bind(created_at)
        .bind(row.updated_at)
        .fetch_one(conn)
        .await;
        timer.record();
        result
    }

    /// Returns the number of rows updated.
    pub async fn update(
        conn: &mut PgConnection,
        id: i64,
        row: &EndpointRow<'_>,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("update_endpoint");
        let result = sqlx::query(
            r#"
            UPDATE endpoints
            SET name = $2, kind = $3, group_id = $4, tag_ids = $5, user_trusted = $6,
                async_mode = $7, edge_id = $8, checkin_interval_secs = $9,
                last_checkin_at = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(row.name)
        .bind(row.kind)
        .bind(row.group_id)
        .bind(&row.tag_ids)
        .bind(row.user_trusted)
        .bind(row.async_mode)
        .bind(row.edge_id)
        .bind(row.checkin_interval_secs)
        .bind(row.last_checkin_at)
        .bind(row.updated_at)
        .execute(conn)
        .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_endpoint");
        let result = sqlx::query("DELETE FROM endpoints WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
