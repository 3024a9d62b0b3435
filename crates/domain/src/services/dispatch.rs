//! Command dispatch.
//!
//! Store-and-forward endpoints get an entry appended to their command log;
//! the append runs in the caller's transaction and any failure aborts it.
//! Live endpoints get the command handed to the tunnel; failures there are
//! logged and counted but never propagate.

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;

use shared::crypto::{encode_content, sha256_hex};

use super::tunnel::LiveTunnel;
use crate::error::{EdgeError, TunnelError};
use crate::models::{
    CommandEnvelope, CommandId, CommandOperation, ConfigCommandValue, EdgeResource, Endpoint,
    JobCommandValue, RemovalValue, ResourcePayload, ResourceRef, StackCommandValue,
};
use crate::store::{ContentStore, StoreTx};

/// What happened to one dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Appended to the command log.
    Queued(CommandId),
    /// Handed to a live tunnel.
    Delivered,
    /// Live endpoint without a usable tunnel. It resyncs on its next full connection.
    Unreachable,
}

pub struct CommandDispatcher {
    tunnel: Arc<dyn LiveTunnel>,
    content: Arc<dyn ContentStore>,
}

impl CommandDispatcher {
    pub fn new(tunnel: Arc<dyn LiveTunnel>, content: Arc<dyn ContentStore>) -> Self {
        Self { tunnel, content }
    }

    pub fn tunnel(&self) -> &Arc<dyn LiveTunnel> {
        &self.tunnel
    }

    /// Builds the Add or Replace command for the current state of `resource`.
    ///
    /// Stack and job file contents are read from the content store and embedded
    /// base64 encoded, with their SHA-256 digest.
    pub async fn build_envelope(
        &self,
        resource: &EdgeResource,
        operation: CommandOperation,
    ) -> Result<CommandEnvelope, EdgeError> {
        let value = match &resource.payload {
            ResourcePayload::Stack(spec) => {
                let content = self.content.get_content(&spec.entry_path()).await?;
                serde_json::to_value(StackCommandValue {
                    id: resource.id,
                    name: resource.name.clone(),
                    version: resource.version,
                    deployment_type: spec.deployment_type,
                    entry_file_name: spec.entry_file.clone(),
                    file_content: encode_content(&content),
                    checksum: sha256_hex(&content),
                })?
            }
            ResourcePayload::Job(spec) => {
                let content = self.content.get_content(&spec.script_path).await?;
                serde_json::to_value(JobCommandValue {
                    id: resource.id,
                    name: resource.name.clone(),
                    version: resource.version,
                    cron_expression: spec.cron_expression.clone(),
                    recurring: spec.recurring,
                    script_content: encode_content(&content),
                    checksum: sha256_hex(&content),
                })?
            }
            ResourcePayload::Config(spec) => serde_json::to_value(ConfigCommandValue {
                id: resource.id,
                name: resource.name.clone(),
                version: resource.version,
                entries: spec.entries.clone(),
            })?,
        };

        Ok(CommandEnvelope {
            resource_type: resource.kind(),
            operation,
            path: resource.reference().path(),
            value,
            version: resource.version,
        })
    }

    /// Builds the Remove command for `reference`. Removals carry only the id.
    pub fn removal_envelope(
        reference: ResourceRef,
        version: i32,
    ) -> Result<CommandEnvelope, EdgeError> {
        Ok(CommandEnvelope {
            resource_type: reference.kind,
            operation: CommandOperation::Remove,
            path: reference.path(),
            value: serde_json::to_value(RemovalValue { id: reference.id })?,
            version,
        })
    }

    /// Delivers `envelope` to `endpoint` on the path its delivery mode selects.
    pub async fn dispatch(
        &self,
        tx: &mut dyn StoreTx,
        endpoint: &Endpoint,
        mut envelope: CommandEnvelope,
    ) -> Result<DispatchOutcome, EdgeError> {
        if endpoint.async_mode {
            if envelope.operation == CommandOperation::Add {
                let pending = tx.pending_commands(endpoint.id, None).await?;
                if pending.iter().any(|c| c.path() == envelope.path) {
                    envelope.operation = CommandOperation::Replace;
                }
            }

            let operation = envelope.operation;
            let command = tx.append_command(endpoint.id, envelope, Utc::now()).await?;
            counter!(
                "edge_commands_total",
                "operation" => operation.as_str(),
                "path_kind" => "async"
            )
            .increment(1);
            tracing::debug!(
                endpoint_id = %endpoint.id,
                command_id = %command.id,
                path = %command.path(),
                operation = %operation,
                "Command queued"
            );
            return Ok(DispatchOutcome::Queued(command.id));
        }

        let operation = envelope.operation;
        let path = envelope.path.clone();
        match self.tunnel.send(endpoint.id, envelope).await {
            Ok(()) => {
                counter!(
                    "edge_commands_total",
                    "operation" => operation.as_str(),
                    "path_kind" => "tunnel"
                )
                .increment(1);
                tracing::debug!(
                    endpoint_id = %endpoint.id,
                    path = %path,
                    operation = %operation,
                    "Command sent over tunnel"
                );
                Ok(DispatchOutcome::Delivered)
            }
            Err(TunnelError::NotConnected(_)) => {
                tracing::debug!(
                    endpoint_id = %endpoint.id,
                    path = %path,
                    "No live tunnel, skipping delivery"
                );
                Ok(DispatchOutcome::Unreachable)
            }
            Err(err) => {
                counter!("edge_tunnel_send_failures_total").increment(1);
                tracing::warn!(
                    endpoint_id = %endpoint.id,
                    path = %path,
                    operation = %operation,
                    error = %err,
                    "Tunnel delivery failed"
                );
                Ok(DispatchOutcome::Unreachable)
            }
        }
    }
}
