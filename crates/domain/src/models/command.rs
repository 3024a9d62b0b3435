//! Command log entries and the values they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{CommandId, EndpointId, ResourceId};
use super::resource::{DeploymentType, ResourceKind};

/// Operation applied by the agent for a command path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOperation {
    Add,
    Replace,
    Remove,
}

impl CommandOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for CommandOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CommandOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "replace" => Ok(Self::Replace),
            "remove" => Ok(Self::Remove),
            _ => Err(format!("Invalid command operation: {}", s)),
        }
    }
}

/// What is delivered to a device, over the tunnel or through the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub resource_type: ResourceKind,
    pub operation: CommandOperation,
    pub path: String,
    pub value: serde_json::Value,
    pub version: i32,
}

/// A persisted store-and-forward command. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAsyncCommand {
    pub id: CommandId,
    pub endpoint_id: EndpointId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub envelope: CommandEnvelope,
}

impl EdgeAsyncCommand {
    pub fn path(&self) -> &str {
        &self.envelope.path
    }

    pub fn operation(&self) -> CommandOperation {
        self.envelope.operation
    }
}

/// Value of a stack Add/Replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackCommandValue {
    pub id: ResourceId,
    pub name: String,
    pub version: i32,
    pub deployment_type: DeploymentType,
    pub entry_file_name: String,
    /// Base64 encoded entry file.
    pub file_content: String,
    pub checksum: String,
}

/// Value of a job Add/Replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCommandValue {
    pub id: ResourceId,
    pub name: String,
    pub version: i32,
    pub cron_expression: String,
    pub recurring: bool,
    /// Base64 encoded script.
    pub script_content: String,
    pub checksum: String,
}

/// Value of a config Add/Replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCommandValue {
    pub id: ResourceId,
    pub name: String,
    pub version: i32,
    pub entries: BTreeMap<String, String>,
}

/// Value of any Remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalValue {
    pub id: ResourceId,
}

/// Request payload for enqueueing an arbitrary command.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueCommandRequest {
    pub resource_type: ResourceKind,
    pub resource_id: ResourceId,
    pub operation: CommandOperation,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Request payload for acknowledging drained commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeCommandsRequest {
    pub up_to: CommandId,
}
