//! PostgreSQL implementation of the engine's store interface.
//!
//! One [`PgStoreTx`] wraps one database transaction. Repositories run on its
//! connection, so everything a triggering edit writes commits or rolls back
//! together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::error::StoreError;
use domain::models::{
    CommandEnvelope, CommandId, EdgeAsyncCommand, EdgeGroup, EdgeGroupId, EdgeResource, Endpoint,
    EndpointGroup, EndpointGroupId, EndpointId, EndpointRelation, ResourceRef, Tag, TagId,
};
use domain::store::{EdgeStore, StoreTx};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;

use crate::entities::{EndpointRelationEntity, SelectorColumns};
use crate::repositories::{
    EdgeAsyncCommandRepository, EdgeGroupRepository, EdgeResourceRepository,
    EndpointGroupRepository, EndpointRelationRepository, EndpointRepository, EndpointRow,
    EdgeResourceRow, NewCommandRow, TagRepository,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Maps driver errors onto the store error contract.
fn map_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) | Some(FOREIGN_KEY_VIOLATION) => {
                StoreError::Conflict(db.message().to_string())
            }
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                StoreError::Contention(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        },
        sqlx::Error::RowNotFound => StoreError::not_found("row", "for query"),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Turns a zero row count into `NotFound`.
fn affected(rows: u64, entity: &'static str, id: impl ToString) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::not_found(entity, id))
    } else {
        Ok(())
    }
}

fn ids<T>(values: impl IntoIterator<Item = T>, get: impl Fn(T) -> i64) -> Vec<i64> {
    values.into_iter().map(get).collect()
}

fn interval_column(endpoint: &Endpoint) -> Result<Option<i32>, StoreError> {
    endpoint
        .checkin_interval_secs
        .map(i32::try_from)
        .transpose()
        .map_err(|_| StoreError::Backend("check-in interval out of range".to_string()))
}

fn endpoint_row(endpoint: &Endpoint) -> Result<EndpointRow<'_>, StoreError> {
    Ok(EndpointRow {
        name: &endpoint.name,
        kind: endpoint.kind.as_str(),
        group_id: endpoint.group_id.get(),
        tag_ids: ids(endpoint.tag_ids.iter().copied(), TagId::get),
        user_trusted: endpoint.user_trusted,
        async_mode: endpoint.async_mode,
        edge_id: endpoint.edge_id.as_deref(),
        checkin_interval_secs: interval_column(endpoint)?,
        last_checkin_at: endpoint.last_checkin_at,
        updated_at: endpoint.updated_at,
    })
}

fn resource_row(resource: &EdgeResource) -> Result<EdgeResourceRow<'_>, StoreError> {
    let payload = serde_json::to_value(&resource.payload)
        .map_err(|e| StoreError::Backend(format!("Cannot encode resource payload: {}", e)))?;
    Ok(EdgeResourceRow {
        kind: resource.kind().as_str(),
        name: &resource.name,
        edge_group_ids: ids(resource.edge_groups.iter().copied(), EdgeGroupId::get),
        version: resource.version,
        payload,
        updated_at: resource.updated_at,
    })
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgEdgeStore {
    pool: PgPool,
}

impl PgEdgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EdgeStore for PgEdgeStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_err)?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// An open database transaction. Dropping it rolls back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    // =========================================================================
    // Tags
    // =========================================================================

    async fn tags(&mut self) -> Result<Vec<Tag>, StoreError> {
        let rows = TagRepository::find_all(&mut self.tx).await.map_err(map_err)?;
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn tag(&mut self, id: TagId) -> Result<Tag, StoreError> {
        TagRepository::find_by_id(&mut self.tx, id.get())
            .await
            .map_err(map_err)?
            .map(Tag::from)
            .ok_or_else(|| StoreError::not_found("tag", id))
    }

    async fn create_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        let row = TagRepository::insert(&mut self.tx, name).await.map_err(map_err)?;
        Ok(row.into())
    }

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StoreError> {
        let rows = TagRepository::delete(&mut self.tx, id.get()).await.map_err(map_err)?;
        affected(rows, "tag", id)
    }

    // =========================================================================
    // Static endpoint groups
    // =========================================================================

    async fn endpoint_groups(&mut self) -> Result<Vec<EndpointGroup>, StoreError> {
        let rows = EndpointGroupRepository::find_all(&mut self.tx)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().map(EndpointGroup::from).collect())
    }

    async fn endpoint_group(&mut self, id: EndpointGroupId) -> Result<EndpointGroup, StoreError> {
        EndpointGroupRepository::find_by_id(&mut self.tx, id.get())
            .await
            .map_err(map_err)?
            .map(EndpointGroup::from)
            .ok_or_else(|| StoreError::not_found("endpoint group", id))
    }

    async fn create_endpoint_group(
        &mut self,
        group: EndpointGroup,
    ) -> Result<EndpointGroup, StoreError> {
        let tag_ids = ids(group.tag_ids.iter().copied(), TagId::get);
        let row = EndpointGroupRepository::insert(&mut self.tx, &group.name, &tag_ids)
            .await
            .map_err(map_err)?;
        Ok(row.into())
    }

    async fn update_endpoint_group(&mut self, group: &EndpointGroup) -> Result<(), StoreError> {
        let tag_ids = ids(group.tag_ids.iter().copied(), TagId::get);
        let rows = EndpointGroupRepository::update(&mut self.tx, group.id.get(), &group.name, &tag_ids)
            .await
            .map_err(map_err)?;
        affected(rows, "endpoint group", group.id)
    }

    async fn delete_endpoint_group(&mut self, id: EndpointGroupId) -> Result<(), StoreError> {
        let rows = EndpointGroupRepository::delete(&mut self.tx, id.get())
            .await
            .map_err(map_err)?;
        affected(rows, "endpoint group", id)
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    async fn endpoints(&mut self) -> Result<Vec<Endpoint>, StoreError> {
        EndpointRepository::find_all(&mut self.tx)
            .await
            .map_err(map_err)?
            .into_iter()
            .map(Endpoint::try_from)
            .collect()
    }

    async fn endpoint(&mut self, id: EndpointId) -> Result<Endpoint, StoreError> {
        EndpointRepository::find_by_id(&mut self.tx, id.get())
            .await
            .map_err(map_err)?
            .ok_or_else(|| StoreError::not_found("endpoint", id))?
            .try_into()
    }

    async fn create_endpoint(&mut self, endpoint: Endpoint) -> Result<Endpoint, StoreError> {
        // A missing group is reported as such rather than as a key violation.
        self.endpoint_group(endpoint.group_id).await?;
        let row = endpoint_row(&endpoint)?;
        EndpointRepository::insert(&mut self.tx, &row, endpoint.created_at)
            .await
            .map_err(map_err)?
            .try_into()
    }

    async fn update_endpoint(&mut self, endpoint: &Endpoint) -> Result<(), StoreError> {
        let row = endpoint_row(endpoint)?;
        let rows = EndpointRepository::update(&mut self.tx, endpoint.id.get(), &row)
            .await
            .map_err(map_err)?;
        affected(rows, "endpoint", endpoint.id)
    }

    async fn delete_endpoint(&mut self, id: EndpointId) -> Result<(), StoreError> {
        let rows = EndpointRepository::delete(&mut self.tx, id.get())
            .await
            .map_err(map_err)?;
        affected(rows, "endpoint", id)
    }

    // =========================================================================
    // Edge groups
    // =========================================================================

    async fn edge_groups(&mut self) -> Result<Vec<EdgeGroup>, StoreError> {
        let rows = EdgeGroupRepository::find_all(&mut self.tx)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().map(EdgeGroup::from).collect())
    }

    async fn edge_group(&mut self, id: EdgeGroupId) -> Result<EdgeGroup, StoreError> {
        EdgeGroupRepository::find_by_id(&mut self.tx, id.get())
            .await
            .map_err(map_err)?
            .map(EdgeGroup::from)
            .ok_or_else(|| StoreError::not_found("edge group", id))
    }

    async fn create_edge_group(&mut self, group: EdgeGroup) -> Result<EdgeGroup, StoreError> {
        let selector = SelectorColumns::from(&group.selector);
        let row = EdgeGroupRepository::insert(&mut self.tx, &group.name, &selector)
            .await
            .map_err(map_err)?;
        Ok(row.into())
    }

    async fn update_edge_group(&mut self, group: &EdgeGroup) -> Result<(), StoreError> {
        let selector = SelectorColumns::from(&group.selector);
        let rows = EdgeGroupRepository::update(&mut self.tx, group.id.get(), &group.name, &selector)
            .await
            .map_err(map_err)?;
        affected(rows, "edge group", group.id)
    }

    async fn delete_edge_group(&mut self, id: EdgeGroupId) -> Result<(), StoreError> {
        let rows = EdgeGroupRepository::delete(&mut self.tx, id.get())
            .await
            .map_err(map_err)?;
        affected(rows, "edge group", id)
    }

    // =========================================================================
    // Targetable resources
    // =========================================================================

    async fn resources(&mut self) -> Result<Vec<EdgeResource>, StoreError> {
        EdgeResourceRepository::find_all(&mut self.tx)
            .await
            .map_err(map_err)?
            .into_iter()
            .map(EdgeResource::try_from)
            .collect()
    }

    async fn resource(&mut self, resource: ResourceRef) -> Result<EdgeResource, StoreError> {
        EdgeResourceRepository::find(&mut self.tx, resource.kind.as_str(), resource.id.get())
            .await
            .map_err(map_err)?
            .ok_or_else(|| StoreError::not_found("resource", resource))?
            .try_into()
    }

    async fn create_resource(
        &mut self,
        resource: EdgeResource,
    ) -> Result<EdgeResource, StoreError> {
        let row = resource_row(&resource)?;
        EdgeResourceRepository::insert(&mut self.tx, &row, resource.created_at)
            .await
            .map_err(map_err)?
            .try_into()
    }

    async fn update_resource(&mut self, resource: &EdgeResource) -> Result<(), StoreError> {
        let row = resource_row(resource)?;
        let rows = EdgeResourceRepository::update(&mut self.tx, resource.id.get(), &row)
            .await
            .map_err(map_err)?;
        affected(rows, "resource", resource.reference())
    }

    async fn delete_resource(&mut self, resource: ResourceRef) -> Result<(), StoreError> {
        let rows =
            EdgeResourceRepository::delete(&mut self.tx, resource.kind.as_str(), resource.id.get())
                .await
                .map_err(map_err)?;
        affected(rows, "resource", resource)
    }

    // =========================================================================
    // Device relation records
    // =========================================================================

    async fn lock_endpoints(&mut self, ids: &BTreeSet<EndpointId>) -> Result<(), StoreError> {
        // Ascending order keeps two lockers of overlapping sets from deadlocking.
        for id in ids {
            EndpointRelationRepository::lock(&mut self.tx, id.get())
                .await
                .map_err(map_err)?;
        }
        Ok(())
    }

    async fn endpoint_relation(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<EndpointRelation, StoreError> {
        EndpointRelationRepository::find_for_update(&mut self.tx, endpoint_id.get())
            .await
            .map_err(map_err)?
            .map(EndpointRelation::from)
            .ok_or_else(|| StoreError::not_found("endpoint relation", endpoint_id))
    }

    async fn endpoint_relations(&mut self) -> Result<Vec<EndpointRelation>, StoreError> {
        let rows = EndpointRelationRepository::find_all(&mut self.tx)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().map(EndpointRelation::from).collect())
    }

    async fn put_endpoint_relation(
        &mut self,
        relation: &EndpointRelation,
    ) -> Result<(), StoreError> {
        let row = EndpointRelationEntity::from(relation);
        EndpointRelationRepository::upsert(&mut self.tx, &row)
            .await
            .map_err(map_err)
    }

    async fn delete_endpoint_relation(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<(), StoreError> {
        EndpointRelationRepository::delete(&mut self.tx, endpoint_id.get())
            .await
            .map_err(map_err)?;
        Ok(())
    }

    // =========================================================================
    // Command log
    // =========================================================================

    async fn append_command(
        &mut self,
        endpoint_id: EndpointId,
        envelope: CommandEnvelope,
        timestamp: DateTime<Utc>,
    ) -> Result<EdgeAsyncCommand, StoreError> {
        let row = NewCommandRow {
            endpoint_id: endpoint_id.get(),
            resource_type: envelope.resource_type.as_str(),
            operation: envelope.operation.as_str(),
            path: &envelope.path,
            value: &envelope.value,
            version: envelope.version,
            created_at: timestamp,
        };
        EdgeAsyncCommandRepository::append(&mut self.tx, &row)
            .await
            .map_err(map_err)?
            .try_into()
    }

    async fn pending_commands(
        &mut self,
        endpoint_id: EndpointId,
        after: Option<CommandId>,
    ) -> Result<Vec<EdgeAsyncCommand>, StoreError> {
        EdgeAsyncCommandRepository::find_pending(
            &mut self.tx,
            endpoint_id.get(),
            after.map(CommandId::get),
        )
        .await
        .map_err(map_err)?
        .into_iter()
        .map(EdgeAsyncCommand::try_from)
        .collect()
    }

    async fn acknowledge_commands(
        &mut self,
        endpoint_id: EndpointId,
        up_to: CommandId,
    ) -> Result<u64, StoreError> {
        EdgeAsyncCommandRepository::acknowledge(&mut self.tx, endpoint_id.get(), up_to.get())
            .await
            .map_err(map_err)
    }

    async fn delete_endpoint_commands(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<u64, StoreError> {
        EdgeAsyncCommandRepository::delete_for_endpoint(&mut self.tx, endpoint_id.get())
            .await
            .map_err(map_err)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_err)
    }
}
