//! In-memory store and content store.
//!
//! Transactions take an exclusive lock on the whole state and work on a copy
//! that is written back on commit, so every transaction is serializable and a
//! dropped transaction leaves no trace. Used by tests and local runs without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ContentStore, EdgeStore, StoreTx};
use crate::error::{ContentError, StoreError};
use crate::models::{
    CommandEnvelope, CommandId, EdgeAsyncCommand, EdgeGroup, EdgeGroupId, EdgeResource, Endpoint,
    EndpointGroup, EndpointGroupId, EndpointId, EndpointRelation, ResourceId, ResourceRef, Tag,
    TagId, UNASSIGNED_GROUP_ID,
};

#[derive(Debug, Clone, Default)]
struct Sequences {
    tag: i64,
    endpoint_group: i64,
    endpoint: i64,
    edge_group: i64,
    resource: i64,
    command: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    sequences: Sequences,
    tags: BTreeMap<TagId, Tag>,
    endpoint_groups: BTreeMap<EndpointGroupId, EndpointGroup>,
    endpoints: BTreeMap<EndpointId, Endpoint>,
    edge_groups: BTreeMap<EdgeGroupId, EdgeGroup>,
    resources: BTreeMap<ResourceId, EdgeResource>,
    relations: BTreeMap<EndpointId, EndpointRelation>,
    commands: Vec<EdgeAsyncCommand>,
}

/// Transactional in-memory store.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates an empty store holding only the "Unassigned" static group.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.sequences.endpoint_group = UNASSIGNED_GROUP_ID.get();
        state.endpoint_groups.insert(
            UNASSIGNED_GROUP_ID,
            EndpointGroup {
                id: UNASSIGNED_GROUP_ID,
                name: "Unassigned".to_string(),
                tag_ids: Default::default(),
            },
        );

        Self {
            state: Arc::new(Mutex::new(state)),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent command append fail, to exercise rollback paths.
    pub fn fail_command_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// All committed command log entries, across endpoints, in append order.
    pub async fn command_log(&self) -> Vec<EdgeAsyncCommand> {
        self.state.lock().await.commands.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EdgeStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_appends: self.fail_appends.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_appends: bool,
}

fn require<'a, K: Ord, V>(
    map: &'a BTreeMap<K, V>,
    key: &K,
    entity: &'static str,
    id: impl ToString,
) -> Result<&'a V, StoreError> {
    map.get(key).ok_or_else(|| StoreError::not_found(entity, id))
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn tags(&mut self) -> Result<Vec<Tag>, StoreError> {
        Ok(self.working.tags.values().cloned().collect())
    }

    async fn tag(&mut self, id: TagId) -> Result<Tag, StoreError> {
        require(&self.working.tags, &id, "tag", id).cloned()
    }

    async fn create_tag(&mut self, name: &str) -> Result<Tag, StoreError> {
        if self.working.tags.values().any(|t| t.name == name) {
            return Err(StoreError::Conflict(format!("tag '{}' already exists", name)));
        }
        let id = TagId(next(&mut self.working.sequences.tag));
        let tag = Tag {
            id,
            name: name.to_string(),
        };
        self.working.tags.insert(id, tag.clone());
        Ok(tag)
    }

    async fn delete_tag(&mut self, id: TagId) -> Result<(), StoreError> {
        self.working
            .tags
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("tag", id))
    }

    async fn endpoint_groups(&mut self) -> Result<Vec<EndpointGroup>, StoreError> {
        Ok(self.working.endpoint_groups.values().cloned().collect())
    }

    async fn endpoint_group(&mut self, id: EndpointGroupId) -> Result<EndpointGroup, StoreError> {
        require(&self.working.endpoint_groups, &id, "endpoint group", id).cloned()
    }

    async fn create_endpoint_group(
        &mut self,
        mut group: EndpointGroup,
    ) -> Result<EndpointGroup, StoreError> {
        group.id = EndpointGroupId(next(&mut self.working.sequences.endpoint_group));
        self.working.endpoint_groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn update_endpoint_group(&mut self, group: &EndpointGroup) -> Result<(), StoreError> {
        require(&self.working.endpoint_groups, &group.id, "endpoint group", group.id)?;
        self.working.endpoint_groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn delete_endpoint_group(&mut self, id: EndpointGroupId) -> Result<(), StoreError> {
        if self.working.endpoints.values().any(|e| e.group_id == id) {
            return Err(StoreError::Conflict(format!(
                "endpoint group {} still has endpoints",
                id
            )));
        }
        self.working
            .endpoint_groups
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("endpoint group", id))
    }

    async fn endpoints(&mut self) -> Result<Vec<Endpoint>, StoreError> {
        Ok(self.working.endpoints.values().cloned().collect())
    }

    async fn endpoint(&mut self, id: EndpointId) -> Result<Endpoint, StoreError> {
        require(&self.working.endpoints, &id, "endpoint", id).cloned()
    }

    async fn create_endpoint(&mut self, mut endpoint: Endpoint) -> Result<Endpoint, StoreError> {
        require(
            &self.working.endpoint_groups,
            &endpoint.group_id,
            "endpoint group",
            endpoint.group_id,
        )?;
        endpoint.id = EndpointId(next(&mut self.working.sequences.endpoint));
        self.working.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint)
    }

    async fn update_endpoint(&mut self, endpoint: &Endpoint) -> Result<(), StoreError> {
        require(&self.working.endpoints, &endpoint.id, "endpoint", endpoint.id)?;
        self.working.endpoints.insert(endpoint.id, endpoint.clone());
        Ok(())
    }

    async fn delete_endpoint(&mut self, id: EndpointId) -> Result<(), StoreError> {
        self.working
            .endpoints
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("endpoint", id))
    }

    async fn edge_groups(&mut self) -> Result<Vec<EdgeGroup>, StoreError> {
        Ok(self.working.edge_groups.values().cloned().collect())
    }

    async fn edge_group(&mut self, id: EdgeGroupId) -> Result<EdgeGroup, StoreError> {
        require(&self.working.edge_groups, &id, "edge group", id).cloned()
    }

    async fn create_edge_group(&mut self, mut group: EdgeGroup) -> Result<EdgeGroup, StoreError> {
        if self.working.edge_groups.values().any(|g| g.name == group.name) {
            return Err(StoreError::Conflict(format!(
                "edge group '{}' already exists",
                group.name
            )));
        }
        group.id = EdgeGroupId(next(&mut self.working.sequences.edge_group));
        self.working.edge_groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn update_edge_group(&mut self, group: &EdgeGroup) -> Result<(), StoreError> {
        require(&self.working.edge_groups, &group.id, "edge group", group.id)?;
        self.working.edge_groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn delete_edge_group(&mut self, id: EdgeGroupId) -> Result<(), StoreError> {
        self.working
            .edge_groups
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("edge group", id))
    }

    async fn resources(&mut self) -> Result<Vec<EdgeResource>, StoreError> {
        Ok(self.working.resources.values().cloned().collect())
    }

    async fn resource(&mut self, resource: ResourceRef) -> Result<EdgeResource, StoreError> {
        self.working
            .resources
            .get(&resource.id)
            .filter(|r| r.kind() == resource.kind)
            .cloned()
            .ok_or_else(|| StoreError::not_found("resource", resource))
    }

    async fn create_resource(
        &mut self,
        mut resource: EdgeResource,
    ) -> Result<EdgeResource, StoreError> {
        resource.id = ResourceId(next(&mut self.working.sequences.resource));
        self.working.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn update_resource(&mut self, resource: &EdgeResource) -> Result<(), StoreError> {
        self.resource(resource.reference()).await?;
        self.working.resources.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn delete_resource(&mut self, resource: ResourceRef) -> Result<(), StoreError> {
        self.resource(resource).await?;
        self.working.resources.remove(&resource.id);
        Ok(())
    }

    async fn lock_endpoints(&mut self, _ids: &BTreeSet<EndpointId>) -> Result<(), StoreError> {
        // The transaction already holds the whole store.
        Ok(())
    }

    async fn endpoint_relation(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<EndpointRelation, StoreError> {
        require(
            &self.working.relations,
            &endpoint_id,
            "endpoint relation",
            endpoint_id,
        )
        .cloned()
    }

    async fn endpoint_relations(&mut self) -> Result<Vec<EndpointRelation>, StoreError> {
        Ok(self.working.relations.values().cloned().collect())
    }

    async fn put_endpoint_relation(
        &mut self,
        relation: &EndpointRelation,
    ) -> Result<(), StoreError> {
        self.working
            .relations
            .insert(relation.endpoint_id, relation.clone());
        Ok(())
    }

    async fn delete_endpoint_relation(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<(), StoreError> {
        self.working.relations.remove(&endpoint_id);
        Ok(())
    }

    async fn append_command(
        &mut self,
        endpoint_id: EndpointId,
        envelope: CommandEnvelope,
        timestamp: DateTime<Utc>,
    ) -> Result<EdgeAsyncCommand, StoreError> {
        if self.fail_appends {
            return Err(StoreError::Backend("command log unavailable".to_string()));
        }
        let command = EdgeAsyncCommand {
            id: CommandId(next(&mut self.working.sequences.command)),
            endpoint_id,
            timestamp,
            envelope,
        };
        self.working.commands.push(command.clone());
        Ok(command)
    }

    async fn pending_commands(
        &mut self,
        endpoint_id: EndpointId,
        after: Option<CommandId>,
    ) -> Result<Vec<EdgeAsyncCommand>, StoreError> {
        Ok(self
            .working
            .commands
            .iter()
            .filter(|c| c.endpoint_id == endpoint_id)
            .filter(|c| after.map_or(true, |after| c.id > after))
            .cloned()
            .collect())
    }

    async fn acknowledge_commands(
        &mut self,
        endpoint_id: EndpointId,
        up_to: CommandId,
    ) -> Result<u64, StoreError> {
        let before = self.working.commands.len();
        self.working
            .commands
            .retain(|c| c.endpoint_id != endpoint_id || c.id > up_to);
        Ok((before - self.working.commands.len()) as u64)
    }

    async fn delete_endpoint_commands(
        &mut self,
        endpoint_id: EndpointId,
    ) -> Result<u64, StoreError> {
        let before = self.working.commands.len();
        self.working.commands.retain(|c| c.endpoint_id != endpoint_id);
        Ok((before - self.working.commands.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

/// Content store backed by a map of path to bytes.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), content.into());
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let files = self
            .files
            .read()
            .map_err(|_| ContentError::Io("content store lock poisoned".to_string()))?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }
}
