//! Targetable resources: edge stacks, edge jobs and edge configs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use validator::{Validate, ValidationError};

use super::ids::{EdgeGroupId, ResourceId};

/// Kind of a targetable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Stack,
    Job,
    Config,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::Job => "job",
            Self::Config => "config",
        }
    }

    /// First segment of the command log path for this kind.
    fn path_segment(&self) -> &'static str {
        match self {
            Self::Stack => "edgestack",
            Self::Job => "edgejob",
            Self::Config => "edgeconfig",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stack" => Ok(Self::Stack),
            "job" => Ok(Self::Job),
            "config" => Ok(Self::Config),
            _ => Err(format!("Invalid resource kind: {}", s)),
        }
    }
}

/// Stable reference to a resource, independent of its current content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: ResourceId) -> Self {
        Self { kind, id }
    }

    pub fn stack(id: i64) -> Self {
        Self::new(ResourceKind::Stack, ResourceId(id))
    }

    pub fn job(id: i64) -> Self {
        Self::new(ResourceKind::Job, ResourceId(id))
    }

    pub fn config(id: i64) -> Self {
        Self::new(ResourceKind::Config, ResourceId(id))
    }

    /// Command log locator, e.g. `/edgestack/42`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.kind.path_segment(), self.id)
    }

    /// Inverse of [`ResourceRef::path`].
    pub fn parse_path(path: &str) -> Option<Self> {
        let mut parts = path.strip_prefix('/')?.splitn(2, '/');
        let kind = match parts.next()? {
            "edgestack" => ResourceKind::Stack,
            "edgejob" => ResourceKind::Job,
            "edgeconfig" => ResourceKind::Config,
            _ => return None,
        };
        let id = parts.next()?.parse::<i64>().ok()?;
        Some(Self::new(kind, ResourceId(id)))
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    Compose,
    Kubernetes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    /// Directory in the content store holding the stack files.
    pub project_path: String,
    pub entry_file: String,
    pub deployment_type: DeploymentType,
}

impl StackSpec {
    pub fn entry_path(&self) -> String {
        format!("{}/{}", self.project_path.trim_end_matches('/'), self.entry_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub cron_expression: String,
    pub recurring: bool,
    pub script_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    pub entries: BTreeMap<String, String>,
}

/// Resource-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourcePayload {
    Stack(StackSpec),
    Job(JobSpec),
    Config(ConfigSpec),
}

impl ResourcePayload {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Stack(_) => ResourceKind::Stack,
            Self::Job(_) => ResourceKind::Job,
            Self::Config(_) => ResourceKind::Config,
        }
    }
}

/// A stack, job or config assigned to edge groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeResource {
    pub id: ResourceId,
    pub name: String,
    pub edge_groups: BTreeSet<EdgeGroupId>,
    /// Incremented on every content change that must be redelivered.
    pub version: i32,
    pub payload: ResourcePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EdgeResource {
    pub fn kind(&self) -> ResourceKind {
        self.payload.kind()
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind(), self.id)
    }
}

fn validate_payload(payload: &ResourcePayload) -> Result<(), ValidationError> {
    use shared::validation::{validate_cron_expression, validate_relative_path};

    match payload {
        ResourcePayload::Stack(spec) => {
            validate_relative_path(&spec.project_path)?;
            validate_relative_path(&spec.entry_file)
        }
        ResourcePayload::Job(spec) => {
            validate_cron_expression(&spec.cron_expression)?;
            validate_relative_path(&spec.script_path)
        }
        ResourcePayload::Config(spec) => {
            if spec.entries.keys().any(|k| k.trim().is_empty()) {
                let mut err = ValidationError::new("empty_config_key");
                err.message = Some("Config keys may not be empty".into());
                Err(err)
            } else {
                Ok(())
            }
        }
    }
}

/// Request payload for resource creation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: String,

    #[validate(length(min = 1, message = "A resource must target at least one edge group"))]
    pub edge_groups: Vec<EdgeGroupId>,

    #[validate(custom(function = "validate_payload"))]
    pub payload: ResourcePayload,
}

/// Request payload for resource updates. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: Option<String>,

    pub edge_groups: Option<Vec<EdgeGroupId>>,

    #[validate(custom(function = "validate_payload"))]
    pub payload: Option<ResourcePayload>,

    /// Force redelivery even if the payload is unchanged (file content edited in place).
    #[serde(default)]
    pub redeploy: bool,
}
