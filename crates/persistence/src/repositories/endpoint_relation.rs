//! Endpoint relation repository.
//!
//! Reconciliations of the same endpoint serialize on a transaction-scoped
//! advisory lock keyed by the endpoint id. The lock is taken before anything
//! the diff depends on is read, so a waiter sees everything the previous
//! holder committed.

use sqlx::PgConnection;

use crate::entities::EndpointRelationEntity;
use crate::metrics::QueryTimer;

/// Database operations on endpoint relation baselines.
pub struct EndpointRelationRepository;

impl EndpointRelationRepository {
    /// Waits for the reconciliation lock of one endpoint. Released at commit or rollback.
    pub async fn lock(conn: &mut PgConnection, endpoint_id: i64) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("lock_endpoint_relation");
        let result = sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(endpoint_id)
            .execute(conn)
            .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn find_for_update(
        conn: &mut PgConnection,
        endpoint_id: i64,
    ) -> Result<Option<EndpointRelationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_endpoint_relation_for_update");
        let result = sqlx::query_as::<_, EndpointRelationEntity>(
            r#"
            SELECT endpoint_id, stack_ids, job_ids, config_ids
            FROM endpoint_relations
            WHERE endpoint_id = $1
            FOR UPDATE
            "#,
        )
        .bind(endpoint_id)
        .fetch_optional(conn)
        .await;
        timer.record();
        result
    }

    pub async fn find_all(
        conn: &mut PgConnection,
    ) -> Result<Vec<EndpointRelationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_all_endpoint_relations");
        let result = sqlx::query_as::<_, EndpointRelationEntity>(
            r#"
            SELECT endpoint_id, stack_ids, job_ids, config_ids
            FROM endpoint_relations
            ORDER BY endpoint_id
            "#,
        )
        .fetch_all(conn)
        .await;
        timer.record();
        result
    }

    pub async fn upsert(
        conn: &mut PgConnection,
        relation: &EndpointRelationEntity,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_endpoint_relation");
        let result = sqlx::query(
            r#"
            INSERT INTO endpoint_relations (endpoint_id, stack_ids, job_ids, config_ids)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint_id) DO UPDATE SET
                stack_ids = EXCLUDED.stack_ids,
                job_ids = EXCLUDED.job_ids,
                config_ids = EXCLUDED.config_ids
            "#,
        )
        .bind(relation.endpoint_id)
        .bind(&relation.stack_ids)
        .bind(&relation.job_ids)
        .bind(&relation.config_ids)
        .execute(conn)
        .await;
        timer.record();
        result.map(|_| ())
    }

    pub async fn delete(conn: &mut PgConnection, endpoint_id: i64) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_endpoint_relation");
        let result = sqlx::query("DELETE FROM endpoint_relations WHERE endpoint_id = $1")
            .bind(endpoint_id)
            .execute(conn)
            .await?;
        timer.record();
        Ok(result.rows_affected())
    }
}
