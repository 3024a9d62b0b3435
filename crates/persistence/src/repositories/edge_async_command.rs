//! Command log repository.
//!
//! The log is append-only: rows are inserted and later deleted by
//! acknowledgement, never updated.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::entities::EdgeAsyncCommandEntity;
use crate::metrics::QueryTimer;

/// Column values of a new log entry.
#[derive(Debug, Clone)]
pub struct NewCommandRow<'a> {
    pub endpoint_id: i64,
    pub resource_type: &'a str,
    pub operation: &'a str,
    pub path: &'a str,
    pub value: &'a serde_json::Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// Database operations on the store-and-forward command log.
pub struct EdgeAsyncCommandRepository;

impl EdgeAsyncCommandRepository {
    pub async fn append(
        conn: &mut PgConnection,
        row: &NewCommandRow<'_>,
    ) -> Result<EdgeAsyncCommandEntity, sqlx::Error> {
        let timer = QueryTimer::new("append_edge_async_command");
        let result = sqlx::query_as::<_, EdgeAsyncCommandEntity>(
            r#"
            INSERT INTO edge_async_commands (endpoint_id, resource_type, operation, path,
                                             value, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, endpoint_id, resource_type, operation, path, value, version, created_at
            "#,
        )
        .bind(row.endpoint_id)
        .bind(row.resource_type)
        .bind(row.operation)
        .bind(row.path)
        .bind(row.value)
        .bind(row.version)
        .bind(row.created_at)
        .fetch_one(conn)
        .await;
        timer.record();
        result
    }

    /// Entries of one endpoint in append order, after `after` when given.
    pub async fn find_pending(
        conn: &mut PgConnection,
        endpoint_id: i64,
        after: Option<i64>,
    ) -> Result<Vec<EdgeAsyncCommandEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_pending_edge_async_commands");
        let result = sqlx::query_as::<_, EdgeAsyncCommandEntity>(
            r#"
            SELECT id, endpoint_id, resource_type, operation, path, value, version, created_at
            FROM edge_async_commands
            WHERE endpoint_id = $1 AND ($2::BIGINT IS NULL OR id > $2)
            ORDER BY id
            "#,
        )
        .bind(endpoint_id)
        .bind(after)
        .fetch_all(conn)
        .await;
        timer.record();
        result
    }

    /// Deletes entries up to and including `up_to`.
    pub async fn acknowledge(
        conn: &mut PgConnection,
        endpoint_id: i64,
        up_to: i64,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("acknowledge_edge_async_commands");
        let result =
            sqlx::query("DELETE FROM edge_async_commands WHERE endpoint_id = $1 AND id <= $2")
                .bind(endpoint_id)
                .bind(up_to)
                .execute(conn)
                .await?;
        timer.record();
        Ok(result.rows_affected())
    }

    pub async fn delete_for_endpoint(
        conn: &mut PgConnection,
        endpoint_id: i64,
    ) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_endpoint_edge_async_commands");
        let result = sqlx::query("DELETE FROM edge_async_commands WHERE endpoint_id = $1")
            .bind(endpoint_id)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
