//! Edge fleet façade.
//!
//! Every mutating operation opens one store transaction, validates, mutates,
//! reconciles the affected endpoints and commits. Returning early with an
//! error drops the transaction, which rolls everything back.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

use super::command_log::collapse_superseded;
use super::dispatch::{CommandDispatcher, DispatchOutcome};
use super::reconciliation::{ReconcileReport, ReconcileTrigger, Reconciler};
use super::relation_projector::Catalog;
use super::tunnel::LiveTunnel;
use crate::error::{EdgeError, TunnelError};
use crate::models::{
    CommandEnvelope, CommandId, CommandOperation, CreateEndpointGroupRequest, CreateResourceRequest,
    CreateTagRequest, EdgeAsyncCommand, EdgeGroup, EdgeGroupId, EdgeGroupRequest, EdgeResource,
    Endpoint, EndpointGroup, EndpointGroupId, EndpointId, EndpointRelation, EndpointStatus,
    EnqueueCommandRequest, GroupSelector, RegisterEndpointRequest, ResourceId, ResourceRef, Tag,
    TagId, UpdateEndpointGroupTagsRequest, UpdateEndpointRequest, UpdateResourceRequest,
    UNASSIGNED_GROUP_ID,
};
use crate::store::{EdgeStore, StoreTx};

/// Tunables of the façade.
#[derive(Debug, Clone)]
pub struct EdgeSettings {
    /// Check-in interval assumed for endpoints that do not report one.
    pub default_checkin_interval_secs: u32,
    /// Collapse superseded entries when the log is drained without an explicit choice.
    pub collapse_on_drain: bool,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            default_checkin_interval_secs: 5,
            collapse_on_drain: false,
        }
    }
}

pub struct EdgeService {
    store: Arc<dyn EdgeStore>,
    reconciler: Reconciler,
    settings: EdgeSettings,
}

async fn ensure_tags_exist(
    tx: &mut dyn StoreTx,
    tag_ids: &BTreeSet<TagId>,
) -> Result<(), EdgeError> {
    if tag_ids.is_empty() {
        return Ok(());
    }
    let known: BTreeSet<TagId> = tx.tags().await?.into_iter().map(|t| t.id).collect();
    let missing: Vec<String> = tag_ids
        .difference(&known)
        .map(|id| id.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EdgeError::NotFound(format!("tags {}", missing.join(", "))))
    }
}

async fn ensure_edge_groups_exist(
    tx: &mut dyn StoreTx,
    group_ids: &BTreeSet<EdgeGroupId>,
) -> Result<(), EdgeError> {
    let known: BTreeSet<EdgeGroupId> = tx.edge_groups().await?.into_iter().map(|g| g.id).collect();
    let missing: Vec<String> = group_ids
        .difference(&known)
        .map(|id| id.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EdgeError::NotFound(format!(
            "edge groups {}",
            missing.join(", ")
        )))
    }
}

/// Dynamic groups need at least one existing tag; static lists may only hold
/// existing, edge-eligible endpoints.
async fn validate_selector(tx: &mut dyn StoreTx, selector: &GroupSelector) -> Result<(), EdgeError> {
    match selector {
        GroupSelector::Dynamic { tags, .. } => {
            if tags.is_empty() {
                return Err(EdgeError::Validation(
                    "A dynamic edge group needs at least one tag".to_string(),
                ));
            }
            ensure_tags_exist(tx, tags).await
        }
        GroupSelector::Static { endpoints } => {
            for endpoint_id in endpoints {
                let endpoint = tx.endpoint(*endpoint_id).await?;
                if !endpoint.is_edge_eligible() {
                    return Err(EdgeError::Validation(format!(
                        "Endpoint {} cannot be targeted by edge groups",
                        endpoint_id
                    )));
                }
            }
            Ok(())
        }
    }
}

impl EdgeService {
    pub fn new(store: Arc<dyn EdgeStore>, reconciler: Reconciler, settings: EdgeSettings) -> Self {
        Self {
            store,
            reconciler,
            settings,
        }
    }

    fn dispatcher(&self) -> &CommandDispatcher {
        self.reconciler.dispatcher()
    }

    fn tunnel(&self) -> &Arc<dyn LiveTunnel> {
        self.dispatcher().tunnel()
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub async fn list_tags(&self) -> Result<Vec<Tag>, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.tags().await?)
    }

    pub async fn create_tag(&self, request: CreateTagRequest) -> Result<Tag, EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        let tag = tx.create_tag(request.name.trim()).await?;
        tx.commit().await?;
        tracing::info!(tag_id = %tag.id, name = %tag.name, "Tag created");
        Ok(tag)
    }

    /// Strips the tag from every endpoint, static group and dynamic edge group, then
    /// reconciles every endpoint.
    pub async fn delete_tag(&self, id: TagId) -> Result<ReconcileReport, EdgeError> {
        let mut tx = self.store.begin().await?;
        tx.tag(id).await?;

        let edge_groups = tx.edge_groups().await?;
        if let Some(group) = edge_groups
            .iter()
            .find(|g| g.is_dynamic() && g.selector.tags().into_iter().eq([id]))
        {
            return Err(EdgeError::Conflict(format!(
                "Tag {} is the only tag of dynamic edge group '{}'",
                id, group.name
            )));
        }

        for mut endpoint in tx.endpoints().await? {
            if endpoint.tag_ids.remove(&id) {
                endpoint.updated_at = Utc::now();
                tx.update_endpoint(&endpoint).await?;
            }
        }
        for mut group in tx.endpoint_groups().await? {
            if group.tag_ids.remove(&id) {
                tx.update_endpoint_group(&group).await?;
            }
        }
        for mut group in edge_groups {
            if let GroupSelector::Dynamic { tags, .. } = &mut group.selector {
                if tags.remove(&id) {
                    tx.update_edge_group(&group).await?;
                }
            }
        }
        tx.delete_tag(id).await?;

        let report = self
            .reconciler
            .reconcile(tx.as_mut(), &ReconcileTrigger::All)
            .await?;
        tx.commit().await?;
        tracing::info!(tag_id = %id, "Tag deleted");
        Ok(report)
    }

    // =========================================================================
    // Static endpoint groups
    // =========================================================================

    pub async fn list_endpoint_groups(&self) -> Result<Vec<EndpointGroup>, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.endpoint_groups().await?)
    }

    pub async fn get_endpoint_group(&self, id: EndpointGroupId) -> Result<EndpointGroup, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.endpoint_group(id).await?)
    }

    pub async fn create_endpoint_group(
        &self,
        request: CreateEndpointGroupRequest,
    ) -> Result<EndpointGroup, EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        ensure_tags_exist(tx.as_mut(), &request.tag_ids).await?;
        let group = tx
            .create_endpoint_group(EndpointGroup {
                id: EndpointGroupId(0),
                name: request.name,
                tag_ids: request.tag_ids,
            })
            .await?;
        tx.commit().await?;
        tracing::info!(endpoint_group_id = %group.id, "Endpoint group created");
        Ok(group)
    }

    /// Replaces the tags of a static group and reconciles its endpoints.
    pub async fn update_endpoint_group_tags(
        &self,
        id: EndpointGroupId,
        request: UpdateEndpointGroupTagsRequest,
    ) -> Result<ReconcileReport, EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        let mut group = tx.endpoint_group(id).await?;
        ensure_tags_exist(tx.as_mut(), &request.tag_ids).await?;
        group.tag_ids = request.tag_ids;
        tx.update_endpoint_group(&group).await?;

        let report = self
            .reconciler
            .reconcile(
                tx.as_mut(),
                &ReconcileTrigger::EndpointGroupEdit {
                    endpoint_group_id: id,
                },
            )
            .await?;
        tx.commit().await?;
        Ok(report)
    }

    pub async fn delete_endpoint_group(&self, id: EndpointGroupId) -> Result<(), EdgeError> {
        if id == UNASSIGNED_GROUP_ID {
            return Err(EdgeError::Conflict(
                "The unassigned group cannot be deleted".to_string(),
            ));
        }
        let mut tx = self.store.begin().await?;
        tx.delete_endpoint_group(id).await?;
        tx.commit().await?;
        tracing::info!(endpoint_group_id = %id, "Endpoint group deleted");
        Ok(())
    }

    // =========================================================================
    // Endpoints
    // =========================================================================

    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.endpoints().await?)
    }

    pub async fn get_endpoint(&self, id: EndpointId) -> Result<Endpoint, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.endpoint(id).await?)
    }

    /// Registers an endpoint with an empty relation record and lets dynamic
    /// groups pick it up.
    pub async fn register_endpoint(
        &self,
        request: RegisterEndpointRequest,
    ) -> Result<Endpoint, EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        ensure_tags_exist(tx.as_mut(), &request.tag_ids).await?;

        let now = Utc::now();
        let endpoint = tx
            .create_endpoint(Endpoint {
                id: EndpointId(0),
                name: request.name,
                kind: request.kind,
                group_id: request.group_id.unwrap_or(UNASSIGNED_GROUP_ID),
                tag_ids: request.tag_ids,
                user_trusted: request.user_trusted,
                async_mode: request.async_mode,
                edge_id: request.edge_id,
                checkin_interval_secs: request.checkin_interval_secs,
                last_checkin_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tx.put_endpoint_relation(&EndpointRelation::empty(endpoint.id))
            .await?;

        self.reconciler
            .reconcile(
                tx.as_mut(),
                &ReconcileTrigger::EndpointEdit {
                    endpoint_id: endpoint.id,
                },
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            endpoint_id = %endpoint.id,
            kind = %endpoint.kind,
            async_mode = endpoint.async_mode,
            "Endpoint registered"
        );
        Ok(endpoint)
    }

    pub async fn update_endpoint(
        &self,
        id: EndpointId,
        request: UpdateEndpointRequest,
    ) -> Result<Endpoint, EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        let mut endpoint = tx.endpoint(id).await?;

        if let Some(group_id) = request.group_id {
            tx.endpoint_group(group_id).await?;
            endpoint.group_id = group_id;
        }
        if let Some(tag_ids) = &request.tag_ids {
            ensure_tags_exist(tx.as_mut(), tag_ids).await?;
            endpoint.tag_ids = tag_ids.clone();
        }
        if let Some(name) = &request.name {
            endpoint.name = name.clone();
        }
        if let Some(user_trusted) = request.user_trusted {
            endpoint.user_trusted = user_trusted;
        }
        if let Some(async_mode) = request.async_mode {
            endpoint.async_mode = async_mode;
        }
        if let Some(interval) = request.checkin_interval_secs {
            endpoint.checkin_interval_secs = Some(interval);
        }
        endpoint.updated_at = Utc::now();
        tx.update_endpoint(&endpoint).await?;

        if request.affects_membership() {
            self.reconciler
                .reconcile(tx.as_mut(), &ReconcileTrigger::EndpointEdit { endpoint_id: id })
                .await?;
        }
        tx.commit().await?;
        Ok(endpoint)
    }

    pub async fn record_checkin(
        &self,
        id: EndpointId,
        at: DateTime<Utc>,
    ) -> Result<EndpointStatus, EdgeError> {
        let mut tx = self.store.begin().await?;
        let mut endpoint = tx.endpoint(id).await?;
        endpoint.last_checkin_at = Some(at);
        tx.update_endpoint(&endpoint).await?;
        let status = self.status_of(tx.as_mut(), &endpoint).await?;
        tx.commit().await?;
        Ok(status)
    }

    /// Forgets the agent identity of an endpoint so another agent can associate.
    pub async fn deassociate_endpoint(&self, id: EndpointId) -> Result<Endpoint, EdgeError> {
        let mut tx = self.store.begin().await?;
        let mut endpoint = tx.endpoint(id).await?;
        endpoint.edge_id = None;
        endpoint.last_checkin_at = None;
        endpoint.updated_at = Utc::now();
        tx.update_endpoint(&endpoint).await?;
        tx.commit().await?;

        self.close_tunnel(id).await;
        tracing::info!(endpoint_id = %id, "Endpoint de-associated");
        Ok(endpoint)
    }

    /// Deletes an endpoint with its relation record and pending commands.
    pub async fn delete_endpoint(&self, id: EndpointId) -> Result<(), EdgeError> {
        let mut tx = self.store.begin().await?;
        tx.lock_endpoints(&BTreeSet::from([id])).await?;
        tx.endpoint(id).await?;

        for mut group in tx.edge_groups().await? {
            if let GroupSelector::Static { endpoints } = &mut group.selector {
                if endpoints.remove(&id) {
                    tx.update_edge_group(&group).await?;
                }
            }
        }
        match tx.delete_endpoint_relation(id).await {
            Err(err) if !err.is_not_found() => return Err(err.into()),
            _ => {}
        }
        let dropped = tx.delete_endpoint_commands(id).await?;
        tx.delete_endpoint(id).await?;
        tx.commit().await?;

        self.close_tunnel(id).await;
        tracing::info!(endpoint_id = %id, dropped_commands = dropped, "Endpoint deleted");
        Ok(())
    }

    /// Best-effort; the primary operation has already committed.
    async fn close_tunnel(&self, id: EndpointId) {
        match self.tunnel().close(id).await {
            Ok(()) | Err(TunnelError::NotConnected(_)) => {}
            Err(err) => {
                tracing::warn!(endpoint_id = %id, error = %err, "Failed to close tunnel");
            }
        }
    }

    pub async fn endpoint_status(&self, id: EndpointId) -> Result<EndpointStatus, EdgeError> {
        let mut tx = self.store.begin().await?;
        let endpoint = tx.endpoint(id).await?;
        self.status_of(tx.as_mut(), &endpoint).await
    }

    async fn status_of(
        &self,
        tx: &mut dyn StoreTx,
        endpoint: &Endpoint,
    ) -> Result<EndpointStatus, EdgeError> {
        let pending = tx.pending_commands(endpoint.id, None).await?;
        Ok(EndpointStatus {
            endpoint_id: endpoint.id,
            alive: endpoint.is_alive(Utc::now(), self.settings.default_checkin_interval_secs),
            tunnel_connected: self.tunnel().is_connected(endpoint.id).await,
            async_mode: endpoint.async_mode,
            last_checkin_at: endpoint.last_checkin_at,
            pending_commands: pending.len(),
        })
    }

    /// Edge groups the endpoint currently belongs to.
    pub async fn endpoint_edge_groups(&self, id: EndpointId) -> Result<Vec<EdgeGroup>, EdgeError> {
        let mut tx = self.store.begin().await?;
        let catalog = Catalog::load(tx.as_mut()).await?;
        let endpoint = catalog
            .endpoints
            .get(&id)
            .ok_or_else(|| EdgeError::NotFound(format!("endpoint {} not found", id)))?;
        let groups = catalog.groups_of(endpoint);
        Ok(groups
            .iter()
            .filter_map(|gid| catalog.edge_groups.get(gid).cloned())
            .collect())
    }

    /// Resources that currently apply to the endpoint, computed fresh.
    pub async fn related_resources(&self, id: EndpointId) -> Result<Vec<EdgeResource>, EdgeError> {
        let mut tx = self.store.begin().await?;
        let catalog = Catalog::load(tx.as_mut()).await?;
        let endpoint = catalog
            .endpoints
            .get(&id)
            .ok_or_else(|| EdgeError::NotFound(format!("endpoint {} not found", id)))?;
        Ok(catalog
            .related_resources(endpoint)
            .iter()
            .filter_map(|r| catalog.resources.get(r).cloned())
            .collect())
    }

    // =========================================================================
    // Edge groups
    // =========================================================================

    pub async fn list_edge_groups(&self) -> Result<Vec<EdgeGroup>, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.edge_groups().await?)
    }

    pub async fn get_edge_group(&self, id: EdgeGroupId) -> Result<EdgeGroup, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.edge_group(id).await?)
    }

    pub async fn create_edge_group(&self, request: EdgeGroupRequest) -> Result<EdgeGroup, EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        validate_selector(tx.as_mut(), &request.selector).await?;
        let group = tx
            .create_edge_group(EdgeGroup {
                id: EdgeGroupId(0),
                name: request.name,
                selector: request.selector,
            })
            .await?;
        tx.commit().await?;
        tracing::info!(
            edge_group_id = %group.id,
            dynamic = group.is_dynamic(),
            "Edge group created"
        );
        Ok(group)
    }

    /// Replaces the name and selector of an edge group and reconciles its
    /// current and former members.
    pub async fn update_edge_group(
        &self,
        id: EdgeGroupId,
        request: EdgeGroupRequest,
    ) -> Result<(EdgeGroup, ReconcileReport), EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        let mut group = tx.edge_group(id).await?;
        validate_selector(tx.as_mut(), &request.selector).await?;
        if tx
            .edge_groups()
            .await?
            .iter()
            .any(|g| g.id != id && g.name == request.name)
        {
            return Err(EdgeError::Conflict(format!(
                "edge group '{}' already exists",
                request.name
            )));
        }

        group.name = request.name;
        group.selector = request.selector;
        tx.update_edge_group(&group).await?;

        let report = self
            .reconciler
            .reconcile(tx.as_mut(), &ReconcileTrigger::EdgeGroupEdit { edge_group_id: id })
            .await?;
        tx.commit().await?;
        Ok((group, report))
    }

    pub async fn delete_edge_group(&self, id: EdgeGroupId) -> Result<(), EdgeError> {
        let mut tx = self.store.begin().await?;
        tx.edge_group(id).await?;
        let referencing: Vec<String> = tx
            .resources()
            .await?
            .iter()
            .filter(|r| r.edge_groups.contains(&id))
            .map(|r| r.reference().to_string())
            .collect();
        if !referencing.is_empty() {
            return Err(EdgeError::Conflict(format!(
                "Edge group {} is used by {}",
                id,
                referencing.join(", ")
            )));
        }
        tx.delete_edge_group(id).await?;
        tx.commit().await?;
        tracing::info!(edge_group_id = %id, "Edge group deleted");
        Ok(())
    }

    /// Current members of an edge group.
    pub async fn resolve_group_members(&self, id: EdgeGroupId) -> Result<Vec<EndpointId>, EdgeError> {
        let mut tx = self.store.begin().await?;
        let group = tx.edge_group(id).await?;
        let catalog = Catalog::load(tx.as_mut()).await?;
        Ok(catalog.members_of(&group).into_iter().collect())
    }

    // =========================================================================
    // Resources
    // =========================================================================

    pub async fn list_resources(&self) -> Result<Vec<EdgeResource>, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.resources().await?)
    }

    pub async fn get_resource(&self, reference: ResourceRef) -> Result<EdgeResource, EdgeError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.resource(reference).await?)
    }

    pub async fn create_resource(
        &self,
        request: CreateResourceRequest,
    ) -> Result<(EdgeResource, ReconcileReport), EdgeError> {
        request.validate()?;
        let edge_groups: BTreeSet<EdgeGroupId> = request.edge_groups.into_iter().collect();
        let mut tx = self.store.begin().await?;
        ensure_edge_groups_exist(tx.as_mut(), &edge_groups).await?;

        let now = Utc::now();
        let resource = tx
            .create_resource(EdgeResource {
                id: ResourceId(0),
                name: request.name,
                edge_groups,
                version: 1,
                payload: request.payload,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let report = self
            .reconciler
            .reconcile(
                tx.as_mut(),
                &ReconcileTrigger::ResourceEdit {
                    resource: resource.reference(),
                    content_changed: false,
                },
            )
            .await?;
        tx.commit().await?;
        tracing::info!(resource = %resource.reference(), "Resource created");
        Ok((resource, report))
    }

    /// Applies a patch to a resource. A payload change or an explicit redeploy
    /// bumps the version and sends Replace to endpoints that keep the resource.
    pub async fn update_resource(
        &self,
        reference: ResourceRef,
        request: UpdateResourceRequest,
    ) -> Result<(EdgeResource, ReconcileReport), EdgeError> {
        request.validate()?;
        let mut tx = self.store.begin().await?;
        let mut resource = tx.resource(reference).await?;

        if let Some(name) = request.name {
            resource.name = name;
        }
        if let Some(edge_groups) = request.edge_groups {
            if edge_groups.is_empty() {
                return Err(EdgeError::Validation(
                    "A resource must target at least one edge group".to_string(),
                ));
            }
            let edge_groups: BTreeSet<EdgeGroupId> = edge_groups.into_iter().collect();
            ensure_edge_groups_exist(tx.as_mut(), &edge_groups).await?;
            resource.edge_groups = edge_groups;
        }
        let mut content_changed = request.redeploy;
        if let Some(payload) = request.payload {
            if payload.kind() != reference.kind {
                return Err(EdgeError::Validation(format!(
                    "Cannot change a {} into a {}",
                    reference.kind,
                    payload.kind()
                )));
            }
            content_changed |= payload != resource.payload;
            resource.payload = payload;
        }
        if content_changed {
            resource.version += 1;
        }
        resource.updated_at = Utc::now();
        tx.update_resource(&resource).await?;

        let report = self
            .reconciler
            .reconcile(
                tx.as_mut(),
                &ReconcileTrigger::ResourceEdit {
                    resource: reference,
                    content_changed,
                },
            )
            .await?;
        tx.commit().await?;
        tracing::info!(
            resource = %reference,
            version = resource.version,
            content_changed,
            "Resource updated"
        );
        Ok((resource, report))
    }

    /// Deletes a resource and sends Remove to every endpoint that still holds it.
    pub async fn delete_resource(&self, reference: ResourceRef) -> Result<ReconcileReport, EdgeError> {
        let mut tx = self.store.begin().await?;
        let resource = tx.resource(reference).await?;
        tx.delete_resource(reference).await?;
        let report = self
            .reconciler
            .reconcile_removed(tx.as_mut(), &resource)
            .await?;
        tx.commit().await?;
        tracing::info!(resource = %reference, "Resource deleted");
        Ok(report)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Dispatches one command to an endpoint outside of reconciliation.
    ///
    /// A null value is filled from the resource's current state.
    pub async fn enqueue_command(
        &self,
        endpoint_id: EndpointId,
        request: EnqueueCommandRequest,
    ) -> Result<DispatchOutcome, EdgeError> {
        let reference = ResourceRef::new(request.resource_type, request.resource_id);
        let mut tx = self.store.begin().await?;
        let endpoint = tx.endpoint(endpoint_id).await?;

        let envelope = match (request.operation, request.value.is_null()) {
            (CommandOperation::Remove, true) => {
                let version = match tx.resource(reference).await {
                    Ok(resource) => resource.version,
                    Err(err) if err.is_not_found() => 0,
                    Err(err) => return Err(err.into()),
                };
                CommandDispatcher::removal_envelope(reference, version)?
            }
            (operation, true) => {
                let resource = tx.resource(reference).await?;
                self.dispatcher().build_envelope(&resource, operation).await?
            }
            (operation, false) => {
                let version = match tx.resource(reference).await {
                    Ok(resource) => resource.version,
                    Err(err) if err.is_not_found() => 0,
                    Err(err) => return Err(err.into()),
                };
                CommandEnvelope {
                    resource_type: reference.kind,
                    operation,
                    path: reference.path(),
                    value: request.value,
                    version,
                }
            }
        };

        let outcome = self
            .dispatcher()
            .dispatch(tx.as_mut(), &endpoint, envelope)
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Un-acknowledged log entries of an endpoint, in append order.
    pub async fn pending_commands(
        &self,
        endpoint_id: EndpointId,
        after: Option<CommandId>,
        collapse: Option<bool>,
    ) -> Result<Vec<EdgeAsyncCommand>, EdgeError> {
        let mut tx = self.store.begin().await?;
        tx.endpoint(endpoint_id).await?;
        let entries = tx.pending_commands(endpoint_id, after).await?;
        if collapse.unwrap_or(self.settings.collapse_on_drain) {
            Ok(collapse_superseded(entries))
        } else {
            Ok(entries)
        }
    }

    pub async fn acknowledge_commands(
        &self,
        endpoint_id: EndpointId,
        up_to: CommandId,
    ) -> Result<u64, EdgeError> {
        let mut tx = self.store.begin().await?;
        tx.endpoint(endpoint_id).await?;
        let removed = tx.acknowledge_commands(endpoint_id, up_to).await?;
        tx.commit().await?;
        tracing::debug!(endpoint_id = %endpoint_id, up_to = %up_to, removed, "Commands acknowledged");
        Ok(removed)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Runs a reconciliation on demand, e.g. to retry a failed edit.
    pub async fn reconcile(&self, trigger: ReconcileTrigger) -> Result<ReconcileReport, EdgeError> {
        let mut tx = self.store.begin().await?;
        let report = match &trigger {
            ReconcileTrigger::EndpointEdit { endpoint_id } => {
                tx.endpoint(*endpoint_id).await?;
                self.reconciler.reconcile(tx.as_mut(), &trigger).await?
            }
            ReconcileTrigger::EndpointGroupEdit { endpoint_group_id } => {
                tx.endpoint_group(*endpoint_group_id).await?;
                self.reconciler.reconcile(tx.as_mut(), &trigger).await?
            }
            ReconcileTrigger::ResourceEdit { resource, .. } => {
                tx.resource(*resource).await?;
                self.reconciler.reconcile(tx.as_mut(), &trigger).await?
            }
            _ => self.reconciler.reconcile(tx.as_mut(), &trigger).await?,
        };
        tx.commit().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConfigSpec, DeploymentType, EndpointKind, JobSpec, MatchMode, ResourcePayload, StackSpec,
    };
    use crate::services::command_log::AgentState;
    use crate::services::tunnel::TunnelRegistry;
    use crate::store::{InMemoryContentStore, InMemoryStore};
    use fake::faker::lorem::en::Word;
    use fake::Fake;

    struct Harness {
        service: EdgeService,
        store: InMemoryStore,
        content: Arc<InMemoryContentStore>,
        tunnels: Arc<TunnelRegistry>,
    }

    fn harness() -> Harness {
        let store = InMemoryStore::new();
        let content = Arc::new(InMemoryContentStore::new());
        content.put("stacks/web/docker-compose.yml", "services: {}");
        content.put("jobs/prune.sh", "docker system prune -f");
        let tunnels = Arc::new(TunnelRegistry::new(8));
        let dispatcher = CommandDispatcher::new(tunnels.clone(), content.clone());
        let service = EdgeService::new(
            Arc::new(store.clone()),
            Reconciler::new(dispatcher),
            EdgeSettings::default(),
        );
        Harness {
            service,
            store,
            content,
            tunnels,
        }
    }

    fn register(tags: &[TagId], async_mode: bool) -> RegisterEndpointRequest {
        let word: String = Word().fake();
        RegisterEndpointRequest {
            name: format!("edge-{}", word),
            kind: EndpointKind::EdgeAgentDocker,
            group_id: None,
            tag_ids: tags.iter().copied().collect(),
            user_trusted: true,
            async_mode,
            edge_id: None,
            checkin_interval_secs: None,
        }
    }

    fn stack_request(groups: &[EdgeGroupId]) -> CreateResourceRequest {
        CreateResourceRequest {
            name: "web".to_string(),
            edge_groups: groups.to_vec(),
            payload: ResourcePayload::Stack(StackSpec {
                project_path: "stacks/web".to_string(),
                entry_file: "docker-compose.yml".to_string(),
                deployment_type: DeploymentType::Compose,
            }),
        }
    }

    fn static_group(name: &str, endpoints: &[EndpointId]) -> EdgeGroupRequest {
        EdgeGroupRequest {
            name: name.to_string(),
            selector: GroupSelector::Static {
                endpoints: endpoints.iter().copied().collect(),
            },
        }
    }

    fn dynamic_group(name: &str, tags: &[TagId], match_mode: MatchMode) -> EdgeGroupRequest {
        EdgeGroupRequest {
            name: name.to_string(),
            selector: GroupSelector::Dynamic {
                tags: tags.iter().copied().collect(),
                match_mode,
            },
        }
    }

    async fn tag(h: &Harness, name: &str) -> TagId {
        h.service
            .create_tag(CreateTagRequest {
                name: name.to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_static_group_join_and_leave() {
        let h = harness();
        let device = h.service.register_endpoint(register(&[], true)).await.unwrap();
        let group = h
            .service
            .create_edge_group(static_group("pinned", &[]))
            .await
            .unwrap();
        let (stack, report) = h
            .service
            .create_resource(stack_request(&[group.id]))
            .await
            .unwrap();
        assert!(report.is_empty());

        let (_, report) = h
            .service
            .update_edge_group(group.id, static_group("pinned", &[device.id]))
            .await
            .unwrap();
        assert_eq!(
            report.delta_for(device.id).unwrap().add,
            [stack.reference()].into_iter().collect()
        );

        let (_, report) = h
            .service
            .update_edge_group(group.id, static_group("pinned", &[]))
            .await
            .unwrap();
        assert_eq!(
            report.delta_for(device.id).unwrap().remove,
            [stack.reference()].into_iter().collect()
        );

        let log = h.store.command_log().await;
        let operations: Vec<_> = log.iter().map(|c| c.operation()).collect();
        assert_eq!(
            operations,
            vec![CommandOperation::Add, CommandOperation::Remove]
        );
        assert!(h
            .service
            .related_resources(device.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_registration_joins_dynamic_groups() {
        let h = harness();
        let t1 = tag(&h, "t1").await;
        let t2 = tag(&h, "t2").await;
        let partial = h
            .service
            .create_edge_group(dynamic_group("any", &[t1, t2], MatchMode::Partial))
            .await
            .unwrap();
        let full = h
            .service
            .create_edge_group(dynamic_group("all", &[t1, t2], MatchMode::Full))
            .await
            .unwrap();
        h.service.create_resource(stack_request(&[partial.id])).await.unwrap();

        let device = h.service.register_endpoint(register(&[t1], true)).await.unwrap();

        assert_eq!(
            h.service.resolve_group_members(partial.id).await.unwrap(),
            vec![device.id]
        );
        assert!(h.service.resolve_group_members(full.id).await.unwrap().is_empty());
        let groups = h.service.endpoint_edge_groups(device.id).await.unwrap();
        assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![partial.id]);

        let pending = h.service.pending_commands(device.id, None, None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation(), CommandOperation::Add);
    }

    #[tokio::test]
    async fn test_static_group_tags_are_inherited() {
        let h = harness();
        let t1 = tag(&h, "t1").await;
        let group = h
            .service
            .create_edge_group(dynamic_group("site", &[t1], MatchMode::Full))
            .await
            .unwrap();
        h.service.create_resource(stack_request(&[group.id])).await.unwrap();
        let site = h
            .service
            .create_endpoint_group(CreateEndpointGroupRequest {
                name: "site".to_string(),
                tag_ids: BTreeSet::new(),
            })
            .await
            .unwrap();
        let mut request = register(&[], true);
        request.group_id = Some(site.id);
        let device = h.service.register_endpoint(request).await.unwrap();
        assert!(h.service.related_resources(device.id).await.unwrap().is_empty());

        let report = h
            .service
            .update_endpoint_group_tags(
                site.id,
                UpdateEndpointGroupTagsRequest {
                    tag_ids: [t1].into_iter().collect(),
                },
            )
            .await
            .unwrap();
        assert_eq!(report.command_count(), 1);
        assert_eq!(h.service.related_resources(device.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_group_tags_rejects_invalid_request() {
        let h = harness();
        let err = h
            .service
            .update_endpoint_group_tags(
                UNASSIGNED_GROUP_ID,
                UpdateEndpointGroupTagsRequest {
                    tag_ids: [TagId(0)].into_iter().collect(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_three_offline_edits_collapse() {
        let h = harness();
        let t1 = tag(&h, "t1").await;
        let group = h
            .service
            .create_edge_group(dynamic_group("fleet", &[t1], MatchMode::Partial))
            .await
            .unwrap();
        let device = h.service.register_endpoint(register(&[t1], true)).await.unwrap();
        let (stack, _) = h
            .service
            .create_resource(stack_request(&[group.id]))
            .await
            .unwrap();

        for revision in 1..=2 {
            h.content.put(
                "stacks/web/docker-compose.yml",
                format!("services: {{ rev: {} }}", revision),
            );
            h.service
                .update_resource(
                    stack.reference(),
                    UpdateResourceRequest {
                        redeploy: true,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        let full = h.service.pending_commands(device.id, None, Some(false)).await.unwrap();
        assert_eq!(full.len(), 3);
        assert!(full.iter().all(|c| c.path() == stack.reference().path()));
        assert_eq!(full[2].envelope.version, 3);

        let collapsed = h.service.pending_commands(device.id, None, Some(true)).await.unwrap();
        assert_eq!(collapsed.len(), 1);

        let mut replayed = AgentState::new();
        replayed.apply_all(&full);
        let mut last_only = AgentState::new();
        last_only.apply_all(&collapsed);
        assert_eq!(replayed, last_only);

        let removed = h
            .service
            .acknowledge_commands(device.id, full[1].id)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            h.service.pending_commands(device.id, None, None).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_deleting_sole_tag_of_dynamic_group_conflicts() {
        let h = harness();
        let t1 = tag(&h, "t1").await;
        let t2 = tag(&h, "t2").await;
        h.service
            .create_edge_group(dynamic_group("only", &[t1], MatchMode::Partial))
            .await
            .unwrap();
        let both = h
            .service
            .create_edge_group(dynamic_group("both", &[t1, t2], MatchMode::Partial))
            .await
            .unwrap();

        let err = h.service.delete_tag(t1).await.unwrap_err();
        assert!(matches!(err, EdgeError::Conflict(_)));

        h.service.delete_tag(t2).await.unwrap();
        let both = h.service.get_edge_group(both.id).await.unwrap();
        assert_eq!(both.selector.tags(), [t1].into_iter().collect());
    }

    #[tokio::test]
    async fn test_delete_tag_reconciles_devices() {
        let h = harness();
        let t1 = tag(&h, "t1").await;
        let t2 = tag(&h, "t2").await;
        let group = h
            .service
            .create_edge_group(dynamic_group("both", &[t1, t2], MatchMode::Partial))
            .await
            .unwrap();
        let (stack, _) = h
            .service
            .create_resource(stack_request(&[group.id]))
            .await
            .unwrap();
        let device = h.service.register_endpoint(register(&[t2], true)).await.unwrap();
        assert_eq!(h.service.related_resources(device.id).await.unwrap().len(), 1);

        let report = h.service.delete_tag(t2).await.unwrap();
        assert_eq!(
            report.delta_for(device.id).unwrap().remove,
            [stack.reference()].into_iter().collect()
        );
        assert!(h
            .service
            .get_endpoint(device.id)
            .await
            .unwrap()
            .tag_ids
            .is_empty());
    }

    #[tokio::test]
    async fn test_referenced_edge_group_cannot_be_deleted() {
        let h = harness();
        let group = h
            .service
            .create_edge_group(static_group("pinned", &[]))
            .await
            .unwrap();
        let (stack, _) = h
            .service
            .create_resource(stack_request(&[group.id]))
            .await
            .unwrap();

        let err = h.service.delete_edge_group(group.id).await.unwrap_err();
        assert!(matches!(err, EdgeError::Conflict(_)));

        h.service.delete_resource(stack.reference()).await.unwrap();
        h.service.delete_edge_group(group.id).await.unwrap();
        assert!(h.service.list_edge_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_group_rejects_ineligible_and_unknown_endpoints() {
        let h = harness();
        let mut request = register(&[], true);
        request.user_trusted = false;
        let untrusted = h.service.register_endpoint(request).await.unwrap();

        let err = h
            .service
            .create_edge_group(static_group("pinned", &[untrusted.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::Validation(_)));

        let err = h
            .service
            .create_edge_group(static_group("ghosts", &[EndpointId(99)]))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::NotFound(_)));

        let err = h
            .service
            .create_edge_group(dynamic_group("empty", &[], MatchMode::Full))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_endpoint_cleans_up() {
        let h = harness();
        let device = h.service.register_endpoint(register(&[], true)).await.unwrap();
        let group = h
            .service
            .create_edge_group(static_group("pinned", &[device.id]))
            .await
            .unwrap();
        h.service.create_resource(stack_request(&[group.id])).await.unwrap();
        assert_eq!(h.store.command_log().await.len(), 1);
        let _handle = h.tunnels.connect(device.id).await;

        h.service.delete_endpoint(device.id).await.unwrap();

        assert!(h.store.command_log().await.is_empty());
        assert!(!h.tunnels.is_connected(device.id).await);
        let group = h.service.get_edge_group(group.id).await.unwrap();
        assert_eq!(
            group.selector,
            GroupSelector::Static {
                endpoints: BTreeSet::new()
            }
        );
        assert!(matches!(
            h.service.get_endpoint(device.id).await.unwrap_err(),
            EdgeError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_live_endpoint_gets_commands_over_tunnel() {
        let h = harness();
        let device = h.service.register_endpoint(register(&[], false)).await.unwrap();
        let mut handle = h.tunnels.connect(device.id).await;
        let group = h
            .service
            .create_edge_group(static_group("pinned", &[device.id]))
            .await
            .unwrap();
        h.service
            .create_resource(CreateResourceRequest {
                name: "prune".to_string(),
                edge_groups: vec![group.id],
                payload: ResourcePayload::Job(JobSpec {
                    cron_expression: "0 3 * * *".to_string(),
                    recurring: true,
                    script_path: "jobs/prune.sh".to_string(),
                }),
            })
            .await
            .unwrap();

        let received = handle.receiver.recv().await.unwrap();
        assert_eq!(received.operation, CommandOperation::Add);
        assert!(received.path.starts_with("/edgejob/"));
        assert!(h.store.command_log().await.is_empty());

        let status = h.service.endpoint_status(device.id).await.unwrap();
        assert!(status.tunnel_connected);
        assert!(!status.alive);
        let status = h.service.record_checkin(device.id, Utc::now()).await.unwrap();
        assert!(status.alive);
    }

    #[tokio::test]
    async fn test_enqueue_command_fills_value_from_resource() {
        let h = harness();
        let device = h.service.register_endpoint(register(&[], true)).await.unwrap();
        let group = h
            .service
            .create_edge_group(static_group("pinned", &[]))
            .await
            .unwrap();
        let (config, _) = h
            .service
            .create_resource(CreateResourceRequest {
                name: "env".to_string(),
                edge_groups: vec![group.id],
                payload: ResourcePayload::Config(ConfigSpec {
                    entries: [("LEVEL".to_string(), "debug".to_string())]
                        .into_iter()
                        .collect(),
                }),
            })
            .await
            .unwrap();

        let outcome = h
            .service
            .enqueue_command(
                device.id,
                EnqueueCommandRequest {
                    resource_type: config.kind(),
                    resource_id: config.id,
                    operation: CommandOperation::Replace,
                    value: serde_json::Value::Null,
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Queued(_)));

        let pending = h.service.pending_commands(device.id, None, None).await.unwrap();
        assert_eq!(pending[0].envelope.value["entries"]["LEVEL"], "debug");
    }

    #[tokio::test]
    async fn test_failed_reconciliation_rolls_back_the_edit() {
        let h = harness();
        let t1 = tag(&h, "t1").await;
        let group = h
            .service
            .create_edge_group(dynamic_group("fleet", &[t1], MatchMode::Partial))
            .await
            .unwrap();
        h.service.create_resource(stack_request(&[group.id])).await.unwrap();
        let device = h.service.register_endpoint(register(&[], true)).await.unwrap();

        h.store.fail_command_appends(true);
        let err = h
            .service
            .update_endpoint(
                device.id,
                UpdateEndpointRequest {
                    tag_ids: Some([t1].into_iter().collect()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::Persistence(_)));
        assert!(h
            .service
            .get_endpoint(device.id)
            .await
            .unwrap()
            .tag_ids
            .is_empty());

        h.store.fail_command_appends(false);
        h.service
            .update_endpoint(
                device.id,
                UpdateEndpointRequest {
                    tag_ids: Some([t1].into_iter().collect()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(h
            .service
            .reconcile(ReconcileTrigger::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unassigned_group_is_protected() {
        let h = harness();
        let err = h
            .service
            .delete_endpoint_group(UNASSIGNED_GROUP_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::Conflict(_)));
    }
}
