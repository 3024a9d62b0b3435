//! Reconciliation engine.
//!
//! Turns an edit into per-endpoint Add / Replace / Remove commands by diffing
//! the persisted relation baseline against a fresh projection. The new
//! baseline is written before anything is dispatched, so a failure anywhere
//! after the diff rolls back with the transaction and the old baseline stays
//! in place for the retry.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use shared::set;

use super::dispatch::CommandDispatcher;
use super::relation_projector::Catalog;
use crate::error::EdgeError;
use crate::models::{
    CommandEnvelope, CommandOperation, EdgeGroupId, EdgeResource, Endpoint, EndpointGroupId,
    EndpointId, EndpointRelation, ResourceRef,
};
use crate::store::StoreTx;

/// Edit that requires reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileTrigger {
    /// An endpoint's static group, tags, trust or kind changed.
    EndpointEdit { endpoint_id: EndpointId },
    /// A static group's tags changed.
    EndpointGroupEdit { endpoint_group_id: EndpointGroupId },
    /// An edge group's selector changed.
    EdgeGroupEdit { edge_group_id: EdgeGroupId },
    /// A resource was created, retargeted or had its content changed.
    ResourceEdit {
        resource: ResourceRef,
        #[serde(default)]
        content_changed: bool,
    },
    /// Every endpoint, e.g. after a tag was deleted.
    All,
}

impl ReconcileTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndpointEdit { .. } => "endpoint_edit",
            Self::EndpointGroupEdit { .. } => "endpoint_group_edit",
            Self::EdgeGroupEdit { .. } => "edge_group_edit",
            Self::ResourceEdit { .. } => "resource_edit",
            Self::All => "all",
        }
    }
}

/// Commands emitted for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDelta {
    pub endpoint_id: EndpointId,
    pub add: BTreeSet<ResourceRef>,
    pub remove: BTreeSet<ResourceRef>,
    pub replace: BTreeSet<ResourceRef>,
}

impl EndpointDelta {
    fn new(endpoint_id: EndpointId) -> Self {
        Self {
            endpoint_id,
            add: BTreeSet::new(),
            remove: BTreeSet::new(),
            replace: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.replace.is_empty()
    }

    pub fn command_count(&self) -> usize {
        self.add.len() + self.remove.len() + self.replace.len()
    }
}

/// Outcome of one reconciliation. Endpoints without changes are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub deltas: Vec<EndpointDelta>,
}

impl ReconcileReport {
    fn from_deltas(deltas: impl IntoIterator<Item = EndpointDelta>) -> Self {
        Self {
            deltas: deltas.into_iter().filter(|d| !d.is_empty()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn command_count(&self) -> usize {
        self.deltas.iter().map(EndpointDelta::command_count).sum()
    }

    pub fn delta_for(&self, endpoint_id: EndpointId) -> Option<&EndpointDelta> {
        self.deltas.iter().find(|d| d.endpoint_id == endpoint_id)
    }
}

/// Envelopes built once per resource and reused for every endpoint.
#[derive(Default)]
struct EnvelopeCache {
    built: HashMap<ResourceRef, CommandEnvelope>,
}

impl EnvelopeCache {
    async fn envelope(
        &mut self,
        dispatcher: &CommandDispatcher,
        resource: &EdgeResource,
        operation: CommandOperation,
    ) -> Result<CommandEnvelope, EdgeError> {
        let reference = resource.reference();
        if !self.built.contains_key(&reference) {
            let envelope = dispatcher.build_envelope(resource, operation).await?;
            self.built.insert(reference, envelope);
        }
        let mut envelope = self
            .built
            .get(&reference)
            .cloned()
            .ok_or_else(|| EdgeError::NotFound(format!("resource {}", reference)))?;
        envelope.operation = operation;
        Ok(envelope)
    }
}

pub struct Reconciler {
    dispatcher: CommandDispatcher,
}

impl Reconciler {
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Reconciles every endpoint affected by `trigger` inside `tx`.
    pub async fn reconcile(
        &self,
        tx: &mut dyn StoreTx,
        trigger: &ReconcileTrigger,
    ) -> Result<ReconcileReport, EdgeError> {
        let (catalog, affected) = self.lock_affected(tx, trigger).await?;
        let mut cache = EnvelopeCache::default();

        let deltas = match trigger {
            ReconcileTrigger::ResourceEdit {
                resource,
                content_changed,
            } => {
                self.reconcile_resource(tx, &catalog, &mut cache, *resource, *content_changed, 0)
                    .await?
            }
            _ => {
                let mut deltas = Vec::with_capacity(affected.len());
                for endpoint_id in affected {
                    let endpoint = catalog.endpoints.get(&endpoint_id).ok_or_else(|| {
                        EdgeError::NotFound(format!("endpoint {} not found", endpoint_id))
                    })?;
                    deltas.push(
                        self.reconcile_endpoint(tx, &catalog, &mut cache, endpoint)
                            .await?,
                    );
                }
                deltas
            }
        };

        let report = ReconcileReport::from_deltas(deltas);
        counter!("edge_reconciliations_total", "trigger" => trigger.as_str()).increment(1);
        tracing::info!(
            trigger = trigger.as_str(),
            endpoints = report.deltas.len(),
            commands = report.command_count(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Emits Remove to every endpoint still holding a resource that has been deleted.
    ///
    /// Must run after the resource is gone from the store.
    pub async fn reconcile_removed(
        &self,
        tx: &mut dyn StoreTx,
        resource: &EdgeResource,
    ) -> Result<ReconcileReport, EdgeError> {
        let trigger = ReconcileTrigger::ResourceEdit {
            resource: resource.reference(),
            content_changed: false,
        };
        let (catalog, _) = self.lock_affected(tx, &trigger).await?;
        let mut cache = EnvelopeCache::default();
        let deltas = self
            .reconcile_resource(
                tx,
                &catalog,
                &mut cache,
                resource.reference(),
                false,
                resource.version,
            )
            .await?;

        let report = ReconcileReport::from_deltas(deltas);
        counter!("edge_reconciliations_total", "trigger" => "resource_delete").increment(1);
        tracing::info!(
            resource = %resource.reference(),
            endpoints = report.deltas.len(),
            "Deleted resource reconciled"
        );
        Ok(report)
    }

    /// Locks every endpoint `trigger` affects and returns a catalog read after
    /// the last lock was granted, together with the affected endpoints.
    ///
    /// A catalog read before the locks may miss an edit committed by the
    /// transaction that held them, so it is reloaded until the affected set
    /// stops growing.
    async fn lock_affected(
        &self,
        tx: &mut dyn StoreTx,
        trigger: &ReconcileTrigger,
    ) -> Result<(Catalog, BTreeSet<EndpointId>), EdgeError> {
        let mut locked = BTreeSet::new();
        loop {
            let catalog = Catalog::load(tx).await?;
            let affected = self.affected(tx, &catalog, trigger).await?;
            let missing = set::difference(&affected, &locked);
            if missing.is_empty() {
                return Ok((catalog, affected));
            }
            tx.lock_endpoints(&missing).await?;
            tracing::trace!(endpoints = missing.len(), "Endpoint locks acquired");
            locked.extend(missing);
        }
    }

    async fn affected(
        &self,
        tx: &mut dyn StoreTx,
        catalog: &Catalog,
        trigger: &ReconcileTrigger,
    ) -> Result<BTreeSet<EndpointId>, EdgeError> {
        let affected = match trigger {
            ReconcileTrigger::EndpointEdit { endpoint_id } => [*endpoint_id].into_iter().collect(),
            ReconcileTrigger::EndpointGroupEdit { endpoint_group_id } => catalog
                .endpoints
                .values()
                .filter(|e| e.group_id == *endpoint_group_id)
                .map(|e| e.id)
                .collect(),
            ReconcileTrigger::EdgeGroupEdit { edge_group_id } => {
                // Current members gain, former members are found through their baseline.
                let targeting = catalog.resources_targeting(*edge_group_id);
                let current = catalog
                    .edge_groups
                    .get(edge_group_id)
                    .map(|group| catalog.members_of(group))
                    .unwrap_or_default();
                let former = holders(tx, |r| set::intersects(&r.resources, &targeting)).await?;
                set::union([&current, &former])
                    .into_iter()
                    .filter(|id| catalog.endpoints.contains_key(id))
                    .collect()
            }
            ReconcileTrigger::All => catalog.endpoints.keys().copied().collect(),
            ReconcileTrigger::ResourceEdit { resource, .. } => {
                let old = holders(tx, |r| r.contains(resource)).await?;
                let new = catalog
                    .resources
                    .get(resource)
                    .map(|r| catalog.related_endpoints(r))
                    .unwrap_or_default();
                set::union([&old, &new])
            }
        };
        Ok(affected)
    }

    /// Device-centric reconciliation of a single endpoint.
    async fn reconcile_endpoint(
        &self,
        tx: &mut dyn StoreTx,
        catalog: &Catalog,
        cache: &mut EnvelopeCache,
        endpoint: &Endpoint,
    ) -> Result<EndpointDelta, EdgeError> {
        let (old, missing) = match tx.endpoint_relation(endpoint.id).await {
            Ok(relation) => (relation.resources, false),
            Err(err) if err.is_not_found() => (BTreeSet::new(), true),
            Err(err) => return Err(err.into()),
        };
        let new = catalog.related_resources(endpoint);

        let mut delta = EndpointDelta::new(endpoint.id);
        delta.add = set::difference(&new, &old);
        delta.remove = set::difference(&old, &new);

        if delta.is_empty() && !missing {
            return Ok(delta);
        }
        tracing::debug!(
            endpoint_id = %endpoint.id,
            add = delta.add.len(),
            remove = delta.remove.len(),
            "Endpoint relation changed"
        );

        tx.put_endpoint_relation(&EndpointRelation {
            endpoint_id: endpoint.id,
            resources: new,
        })
        .await?;

        for reference in &delta.add {
            if let Some(resource) = catalog.resources.get(reference) {
                let envelope = cache
                    .envelope(&self.dispatcher, resource, CommandOperation::Add)
                    .await?;
                self.dispatcher.dispatch(tx, endpoint, envelope).await?;
            }
        }
        for reference in &delta.remove {
            let version = catalog.resources.get(reference).map_or(0, |r| r.version);
            let envelope = CommandDispatcher::removal_envelope(*reference, version)?;
            self.dispatcher.dispatch(tx, endpoint, envelope).await?;
        }

        Ok(delta)
    }

    /// Resource-centric reconciliation: diff the endpoint sets of one resource.
    ///
    /// Endpoints in both sets get a Replace when the content changed, never a
    /// Remove followed by an Add.
    async fn reconcile_resource(
        &self,
        tx: &mut dyn StoreTx,
        catalog: &Catalog,
        cache: &mut EnvelopeCache,
        reference: ResourceRef,
        content_changed: bool,
        removed_version: i32,
    ) -> Result<Vec<EndpointDelta>, EdgeError> {
        let old = holders(tx, |r| r.contains(&reference)).await?;
        let resource = catalog.resources.get(&reference);
        let new = resource
            .map(|r| catalog.related_endpoints(r))
            .unwrap_or_default();

        let add = set::difference(&new, &old);
        let remove = set::difference(&old, &new);
        let replace = if content_changed {
            set::intersection([&old, &new])
        } else {
            BTreeSet::new()
        };
        tracing::debug!(
            resource = %reference,
            add = add.len(),
            remove = remove.len(),
            replace = replace.len(),
            "Resource targets changed"
        );

        let mut deltas: BTreeMap<EndpointId, EndpointDelta> = BTreeMap::new();

        // Baselines first, one locked read per endpoint.
        for endpoint_id in add.iter().chain(remove.iter()) {
            let mut relation = match tx.endpoint_relation(*endpoint_id).await {
                Ok(relation) => relation,
                Err(err) if err.is_not_found() => EndpointRelation::empty(*endpoint_id),
                Err(err) => return Err(err.into()),
            };
            let delta = deltas
                .entry(*endpoint_id)
                .or_insert_with(|| EndpointDelta::new(*endpoint_id));
            if add.contains(endpoint_id) {
                relation.resources.insert(reference);
                delta.add.insert(reference);
            } else {
                relation.resources.remove(&reference);
                delta.remove.insert(reference);
            }
            tx.put_endpoint_relation(&relation).await?;
        }
        for endpoint_id in &replace {
            deltas
                .entry(*endpoint_id)
                .or_insert_with(|| EndpointDelta::new(*endpoint_id))
                .replace
                .insert(reference);
        }

        for delta in deltas.values() {
            let Some(endpoint) = catalog.endpoints.get(&delta.endpoint_id) else {
                continue;
            };
            let operation = if !delta.add.is_empty() {
                CommandOperation::Add
            } else if !delta.replace.is_empty() {
                CommandOperation::Replace
            } else {
                CommandOperation::Remove
            };
            let envelope = match (operation, resource) {
                (CommandOperation::Remove, _) | (_, None) => {
                    let version = resource.map_or(removed_version, |r| r.version);
                    CommandDispatcher::removal_envelope(reference, version)?
                }
                (_, Some(resource)) => {
                    cache
                        .envelope(&self.dispatcher, resource, operation)
                        .await?
                }
            };
            self.dispatcher.dispatch(tx, endpoint, envelope).await?;
        }

        Ok(deltas.into_values().collect())
    }
}

/// Endpoints whose persisted baseline satisfies `filter`.
async fn holders(
    tx: &mut dyn StoreTx,
    filter: impl Fn(&EndpointRelation) -> bool,
) -> Result<BTreeSet<EndpointId>, EdgeError> {
    Ok(tx
        .endpoint_relations()
        .await?
        .into_iter()
        .filter(|r| filter(r))
        .map(|r| r.endpoint_id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConfigSpec, DeploymentType, EdgeGroup, EndpointKind, GroupSelector, MatchMode, ResourceId,
        ResourcePayload, StackSpec, TagId, UNASSIGNED_GROUP_ID,
    };
    use crate::services::tunnel::TunnelRegistry;
    use crate::store::{EdgeStore, InMemoryContentStore, InMemoryStore};
    use chrono::Utc;
    use std::sync::Arc;

    struct Fixture {
        store: InMemoryStore,
        reconciler: Reconciler,
        content: Arc<InMemoryContentStore>,
    }

    fn fixture() -> Fixture {
        let content = Arc::new(InMemoryContentStore::new());
        content.put("stacks/web/compose.yml", "services: {}");
        let dispatcher =
            CommandDispatcher::new(Arc::new(TunnelRegistry::new(8)), content.clone());
        Fixture {
            store: InMemoryStore::new(),
            reconciler: Reconciler::new(dispatcher),
            content,
        }
    }

    fn new_endpoint(tags: &[i64]) -> Endpoint {
        let now = Utc::now();
        Endpoint {
            id: EndpointId(0),
            name: "edge".to_string(),
            kind: EndpointKind::EdgeAgentDocker,
            group_id: UNASSIGNED_GROUP_ID,
            tag_ids: tags.iter().copied().map(TagId).collect(),
            user_trusted: true,
            async_mode: true,
            edge_id: None,
            checkin_interval_secs: None,
            last_checkin_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_stack(groups: &[EdgeGroupId]) -> EdgeResource {
        let now = Utc::now();
        EdgeResource {
            id: ResourceId(0),
            name: "web".to_string(),
            edge_groups: groups.iter().copied().collect(),
            version: 1,
            payload: ResourcePayload::Stack(StackSpec {
                project_path: "stacks/web".to_string(),
                entry_file: "compose.yml".to_string(),
                deployment_type: DeploymentType::Compose,
            }),
            created_at: now,
            updated_at: now,
        }
    }

    /// One tag, one dynamic group on it, one stack targeting the group, one untagged endpoint.
    async fn seed(store: &InMemoryStore) -> (Endpoint, EdgeGroup, EdgeResource) {
        let mut tx = store.begin().await.unwrap();
        let tag = tx.create_tag("site-a").await.unwrap();
        let group = tx
            .create_edge_group(EdgeGroup {
                id: EdgeGroupId(0),
                name: "site-a".to_string(),
                selector: GroupSelector::Dynamic {
                    tags: [tag.id].into_iter().collect(),
                    match_mode: MatchMode::Partial,
                },
            })
            .await
            .unwrap();
        let stack = tx.create_resource(new_stack(&[group.id])).await.unwrap();
        let endpoint = tx.create_endpoint(new_endpoint(&[])).await.unwrap();
        tx.put_endpoint_relation(&EndpointRelation::empty(endpoint.id))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (endpoint, group, stack)
    }

    async fn tag_endpoint(store: &InMemoryStore, endpoint: &Endpoint, tags: &[i64]) {
        let mut tx = store.begin().await.unwrap();
        let mut updated = tx.endpoint(endpoint.id).await.unwrap();
        updated.tag_ids = tags.iter().copied().map(TagId).collect();
        tx.update_endpoint(&updated).await.unwrap();
        tx.commit().await.unwrap();
    }

    async fn run(
        fixture: &Fixture,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileReport, EdgeError> {
        let mut tx = fixture.store.begin().await.unwrap();
        let report = fixture.reconciler.reconcile(tx.as_mut(), &trigger).await?;
        tx.commit().await.unwrap();
        Ok(report)
    }

    async fn relation_of(store: &InMemoryStore, endpoint_id: EndpointId) -> BTreeSet<ResourceRef> {
        let mut tx = store.begin().await.unwrap();
        tx.endpoint_relation(endpoint_id).await.unwrap().resources
    }

    #[tokio::test]
    async fn test_join_emits_single_add() {
        let fixture = fixture();
        let (endpoint, _, stack) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;

        let report = run(
            &fixture,
            ReconcileTrigger::EndpointEdit {
                endpoint_id: endpoint.id,
            },
        )
        .await
        .unwrap();

        let delta = report.delta_for(endpoint.id).unwrap();
        assert_eq!(delta.add, [stack.reference()].into_iter().collect());
        assert!(delta.remove.is_empty());

        let log = fixture.store.command_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].operation(), CommandOperation::Add);
        assert_eq!(log[0].path(), stack.reference().path());
        assert!(relation_of(&fixture.store, endpoint.id)
            .await
            .contains(&stack.reference()));
    }

    #[tokio::test]
    async fn test_leave_emits_single_remove() {
        let fixture = fixture();
        let (endpoint, _, stack) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;
        let trigger = ReconcileTrigger::EndpointEdit {
            endpoint_id: endpoint.id,
        };
        run(&fixture, trigger.clone()).await.unwrap();

        tag_endpoint(&fixture.store, &endpoint, &[]).await;
        let report = run(&fixture, trigger).await.unwrap();

        let delta = report.delta_for(endpoint.id).unwrap();
        assert_eq!(delta.remove, [stack.reference()].into_iter().collect());
        let log = fixture.store.command_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].operation(), CommandOperation::Remove);
        assert!(relation_of(&fixture.store, endpoint.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_empty() {
        let fixture = fixture();
        let (endpoint, _, _) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;

        assert!(!run(&fixture, ReconcileTrigger::All).await.unwrap().is_empty());
        assert!(run(&fixture, ReconcileTrigger::All).await.unwrap().is_empty());
        assert_eq!(fixture.store.command_log().await.len(), 1);
    }

    #[tokio::test]
    async fn test_content_change_emits_replace_only() {
        let fixture = fixture();
        let (endpoint, _, stack) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;
        run(&fixture, ReconcileTrigger::All).await.unwrap();

        let mut tx = fixture.store.begin().await.unwrap();
        let mut bumped = tx.resource(stack.reference()).await.unwrap();
        bumped.version += 1;
        tx.update_resource(&bumped).await.unwrap();
        tx.commit().await.unwrap();
        fixture.content.put("stacks/web/compose.yml", "services: { web: {} }");

        let report = run(
            &fixture,
            ReconcileTrigger::ResourceEdit {
                resource: stack.reference(),
                content_changed: true,
            },
        )
        .await
        .unwrap();

        let delta = report.delta_for(endpoint.id).unwrap();
        assert!(delta.add.is_empty());
        assert!(delta.remove.is_empty());
        assert_eq!(delta.replace, [stack.reference()].into_iter().collect());

        let log = fixture.store.command_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].operation(), CommandOperation::Replace);
        assert_eq!(log[1].envelope.version, 2);
    }

    #[tokio::test]
    async fn test_retarget_resource() {
        let fixture = fixture();
        let (endpoint, _, stack) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;
        run(&fixture, ReconcileTrigger::All).await.unwrap();

        let mut tx = fixture.store.begin().await.unwrap();
        let pinned = tx
            .create_edge_group(EdgeGroup {
                id: EdgeGroupId(0),
                name: "nobody".to_string(),
                selector: GroupSelector::Static {
                    endpoints: BTreeSet::new(),
                },
            })
            .await
            .unwrap();
        let mut retargeted = tx.resource(stack.reference()).await.unwrap();
        retargeted.edge_groups = [pinned.id].into_iter().collect();
        tx.update_resource(&retargeted).await.unwrap();
        tx.commit().await.unwrap();

        let report = run(
            &fixture,
            ReconcileTrigger::ResourceEdit {
                resource: stack.reference(),
                content_changed: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            report.delta_for(endpoint.id).unwrap().remove,
            [stack.reference()].into_iter().collect()
        );
        assert!(relation_of(&fixture.store, endpoint.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_edge_group_edit_reaches_former_members() {
        let fixture = fixture();
        let (endpoint, group, stack) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;
        run(&fixture, ReconcileTrigger::All).await.unwrap();

        let mut tx = fixture.store.begin().await.unwrap();
        let other = tx.create_tag("site-b").await.unwrap();
        let mut edited = tx.edge_group(group.id).await.unwrap();
        edited.selector = GroupSelector::Dynamic {
            tags: [other.id].into_iter().collect(),
            match_mode: MatchMode::Full,
        };
        tx.update_edge_group(&edited).await.unwrap();
        tx.commit().await.unwrap();

        let report = run(
            &fixture,
            ReconcileTrigger::EdgeGroupEdit {
                edge_group_id: group.id,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            report.delta_for(endpoint.id).unwrap().remove,
            [stack.reference()].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn test_append_failure_keeps_old_baseline() {
        let fixture = fixture();
        let (endpoint, _, _) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;
        fixture.store.fail_command_appends(true);

        let err = run(&fixture, ReconcileTrigger::All).await.unwrap_err();
        assert!(matches!(err, EdgeError::Persistence(_)));
        assert!(relation_of(&fixture.store, endpoint.id).await.is_empty());
        assert!(fixture.store.command_log().await.is_empty());

        fixture.store.fail_command_appends(false);
        let report = run(&fixture, ReconcileTrigger::All).await.unwrap();
        assert_eq!(report.command_count(), 1);
    }

    #[tokio::test]
    async fn test_deleted_resource_is_removed_everywhere() {
        let fixture = fixture();
        let (endpoint, _, stack) = seed(&fixture.store).await;
        tag_endpoint(&fixture.store, &endpoint, &[1]).await;
        run(&fixture, ReconcileTrigger::All).await.unwrap();

        let mut tx = fixture.store.begin().await.unwrap();
        let resource = tx.resource(stack.reference()).await.unwrap();
        tx.delete_resource(stack.reference()).await.unwrap();
        let report = fixture
            .reconciler
            .reconcile_removed(tx.as_mut(), &resource)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.command_count(), 1);
        let log = fixture.store.command_log().await;
        assert_eq!(log.last().unwrap().operation(), CommandOperation::Remove);
        assert!(relation_of(&fixture.store, endpoint.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_convergence_after_edit_sequence() {
        let fixture = fixture();
        let (endpoint, group, _) = seed(&fixture.store).await;

        let mut tx = fixture.store.begin().await.unwrap();
        tx.create_tag("site-b").await.unwrap();
        let config = tx
            .create_resource(EdgeResource {
                payload: ResourcePayload::Config(ConfigSpec {
                    entries: Default::default(),
                }),
                ..new_stack(&[group.id])
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        run(
            &fixture,
            ReconcileTrigger::ResourceEdit {
                resource: config.reference(),
                content_changed: false,
            },
        )
        .await
        .unwrap();

        let trigger = ReconcileTrigger::EndpointEdit {
            endpoint_id: endpoint.id,
        };
        for tags in [&[1][..], &[2], &[1, 2], &[], &[1]] {
            tag_endpoint(&fixture.store, &endpoint, tags).await;
            run(&fixture, trigger.clone()).await.unwrap();
        }

        let mut tx = fixture.store.begin().await.unwrap();
        let fresh = Catalog::load(tx.as_mut()).await.unwrap();
        let expected = fresh.related_resources(&fresh.endpoints[&endpoint.id]);
        let persisted = tx.endpoint_relation(endpoint.id).await.unwrap().resources;
        assert_eq!(persisted, expected);
        assert_eq!(expected.len(), 2);
    }

    #[test]
    fn test_trigger_serde_shape() {
        let trigger: ReconcileTrigger = serde_json::from_value(serde_json::json!({
            "type": "resource_edit",
            "resource": { "kind": "stack", "id": 4 }
        }))
        .unwrap();
        assert_eq!(
            trigger,
            ReconcileTrigger::ResourceEdit {
                resource: ResourceRef::stack(4),
                content_changed: false,
            }
        );
        assert_eq!(trigger.as_str(), "resource_edit");
    }

    #[test]
    fn test_new_delta_is_empty() {
        let delta = EndpointDelta::new(EndpointId(7));
        assert_eq!(delta.endpoint_id, EndpointId(7));
        assert!(delta.is_empty());
        assert_eq!(delta.command_count(), 0);
        assert!(ReconcileReport::from_deltas([delta]).is_empty());
    }
}
