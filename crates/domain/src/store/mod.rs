//! Interfaces to the external collaborators the engine consumes.
//!
//! - [`EdgeStore`] / [`StoreTx`]: transactional per-entity reads and writes.
//!   All work for one triggering edit runs inside a single `StoreTx`; dropping
//!   it without [`StoreTx::commit`] rolls everything back.
//! - [`ContentStore`]: stack and script file contents.
//!
//! Create methods ignore the `id` of their input and return the stored record
//! with the identifier assigned by the store.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::error::{ContentError, StoreError};
use crate::models::{
    CommandEnvelope, CommandId, EdgeAsyncCommand, EdgeGroup, EdgeGroupId, EdgeResource, Endpoint,
    EndpointGroup, EndpointGroupId, EndpointId, EndpointRelation, ResourceRef, Tag, TagId,
};

pub use memory::{InMemoryContentStore, InMemoryStore};

/// Opens transactions against the backing store.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

/// One open transaction.
///
/// Two reconciliations touching the same device serialize through
/// [`StoreTx::lock_endpoints`]. Everything read after the lock is granted
/// reflects the work of the transaction that held it before.
#[async_trait]
pub trait StoreTx: Send {
    // Tags
    async fn tags(&mut self) -> Result<Vec<Tag>, StoreError>;
    async fn tag(&mut self, id: TagId) -> Result<Tag, StoreError>;
    async fn create_tag(&mut self, name: &str) -> Result<Tag, StoreError>;
    async fn delete_tag(&mut self, id: TagId) -> Result<(), StoreError>;

    // Static endpoint groups
    async fn endpoint_groups(&mut self) -> Result<Vec<EndpointGroup>, StoreError>;
    async fn endpoint_group(&mut self, id: EndpointGroupId) -> Result<EndpointGroup, StoreError>;
    async fn create_endpoint_group(
        &mut self,
        group: EndpointGroup,
    ) -> Result<EndpointGroup, StoreError>;
    async fn update_endpoint_group(&mut self, group: &EndpointGroup) -> Result<(), StoreError>;
    async fn delete_endpoint_group(&mut self, id: EndpointGroupId) -> Result<(), StoreError>;

    // Endpoints
    async fn endpoints(&mut self) -> Result<Vec<Endpoint>, StoreError>;
    async fn endpoint(&mut self, id: EndpointId) -> Result<Endpoint, StoreError>;
    async fn create_endpoint(&mut self, endpoint: Endpoint) -> Result<Endpoint, StoreError>;
    async fn update_endpoint(&mut self, endpoint: &Endpoint) -> Result<(), StoreError>;
    async fn delete_endpoint(&mut self, id: EndpointId) -> Result<(), StoreError>;

    // Edge groups
    async fn edge_groups(&mut self) -> Result<Vec<EdgeGroup>, StoreError>;
    async fn edge_group(&mut self, id: EdgeGroupId) -> Result<EdgeGroup, StoreError>;
    async fn create_edge_group(&mut self, group: EdgeGroup) -> Result<EdgeGroup, StoreError>;
    async fn update_edge_group(&mut self, group: &EdgeGroup) -> Result<(), StoreError>;
    async fn delete_edge_group(&mut self, id: EdgeGroupId) -> Result<(), StoreError>;

    // Targetable resources
    async fn resources(&mut self) -> Result<Vec<EdgeResource>, StoreError>;
    async fn resource(&mut self, resource: ResourceRef) -> Result<EdgeResource, StoreError>;
    async fn create_resource(&mut self, resource: EdgeResource)
        -> Result<EdgeResource, StoreError>;
    async fn update_resource(&mut self, resource: &EdgeResource) -> Result<(), StoreError>;
    async fn delete_resource(&mut self, resource: ResourceRef) -> Result<(), StoreError>;

    // Device relation records
    /// Blocks until this transaction holds the reconciliation lock of every
    /// endpoint in `ids`. Locks are released when the transaction ends.
    async fn lock_endpoints(&mut self, ids: &BTreeSet<EndpointId>) -> Result<(), StoreError>;
    async fn endpoint_relation(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<EndpointRelation, StoreError>;
    async fn endpoint_relations(&mut self) -> Result<Vec<EndpointRelation>, StoreError>;
    /// Inserts or replaces the relation record of `relation.endpoint_id`.
    async fn put_endpoint_relation(&mut self, relation: &EndpointRelation)
        -> Result<(), StoreError>;
    async fn delete_endpoint_relation(&mut self, endpoint_id: EndpointId)
        -> Result<(), StoreError>;

    // Command log
    async fn append_command(
        &mut self,
        endpoint_id: EndpointId,
        envelope: CommandEnvelope,
        timestamp: DateTime<Utc>,
    ) -> Result<EdgeAsyncCommand, StoreError>;
    /// Un-acknowledged entries of one endpoint in append order, optionally after an id.
    async fn pending_commands(
        &mut self,
        endpoint_id: EndpointId,
        after: Option<CommandId>,
    ) -> Result<Vec<EdgeAsyncCommand>, StoreError>;
    /// Deletes entries up to and including `up_to`. Returns the number removed.
    async fn acknowledge_commands(
        &mut self,
        endpoint_id: EndpointId,
        up_to: CommandId,
    ) -> Result<u64, StoreError>;
    async fn delete_endpoint_commands(&mut self, endpoint_id: EndpointId)
        -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Read access to stack and script files.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError>;
}
