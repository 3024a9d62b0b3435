//! Endpoint (device) domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

use super::ids::{EndpointGroupId, EndpointId, TagId};

/// Grace period added on top of two missed check-ins before a device is considered down.
const HEARTBEAT_GRACE_SECS: i64 = 20;

/// How the controller reaches an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    DockerAgent,
    KubernetesAgent,
    EdgeAgentDocker,
    EdgeAgentKubernetes,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DockerAgent => "docker_agent",
            Self::KubernetesAgent => "kubernetes_agent",
            Self::EdgeAgentDocker => "edge_agent_docker",
            Self::EdgeAgentKubernetes => "edge_agent_kubernetes",
        }
    }

    /// Whether the endpoint is reached through the edge channel.
    pub fn is_edge(&self) -> bool {
        matches!(self, Self::EdgeAgentDocker | Self::EdgeAgentKubernetes)
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker_agent" => Ok(Self::DockerAgent),
            "kubernetes_agent" => Ok(Self::KubernetesAgent),
            "edge_agent_docker" => Ok(Self::EdgeAgentDocker),
            "edge_agent_kubernetes" => Ok(Self::EdgeAgentKubernetes),
            _ => Err(format!("Invalid endpoint kind: {}", s)),
        }
    }
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub kind: EndpointKind,
    /// Exactly one static group.
    pub group_id: EndpointGroupId,
    #[serde(default)]
    pub tag_ids: BTreeSet<TagId>,
    /// Set once an administrator accepted the agent.
    pub user_trusted: bool,
    /// Store-and-forward delivery instead of the live tunnel.
    pub async_mode: bool,
    /// Identity reported by the associated agent, cleared on de-association.
    pub edge_id: Option<String>,
    pub checkin_interval_secs: Option<u32>,
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    /// Whether this endpoint may be targeted by edge groups at all.
    pub fn is_edge_eligible(&self) -> bool {
        self.kind.is_edge() && self.user_trusted
    }

    /// Effective check-in interval, falling back to the controller default.
    pub fn checkin_interval(&self, default_secs: u32) -> u32 {
        self.checkin_interval_secs.unwrap_or(default_secs)
    }

    /// Whether the device checked in recently enough to be considered alive.
    pub fn is_alive(&self, now: DateTime<Utc>, default_interval_secs: u32) -> bool {
        let Some(last) = self.last_checkin_at else {
            return false;
        };
        let interval = i64::from(self.checkin_interval(default_interval_secs));
        now - last <= Duration::seconds(2 * interval + HEARTBEAT_GRACE_SECS)
    }
}

/// Request payload for endpoint registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEndpointRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: String,

    pub kind: EndpointKind,

    pub group_id: Option<EndpointGroupId>,

    #[serde(default)]
    pub tag_ids: BTreeSet<TagId>,

    #[serde(default)]
    pub user_trusted: bool,

    #[serde(default)]
    pub async_mode: bool,

    pub edge_id: Option<String>,

    #[validate(range(min = 1, max = 86400, message = "Check-in interval must be between 1 and 86400 seconds"))]
    pub checkin_interval_secs: Option<u32>,
}

/// Partial update of an endpoint. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEndpointRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: Option<String>,
    pub group_id: Option<EndpointGroupId>,
    pub tag_ids: Option<BTreeSet<TagId>>,
    pub user_trusted: Option<bool>,
    pub async_mode: Option<bool>,
    #[validate(range(min = 1, max = 86400, message = "Check-in interval must be between 1 and 86400 seconds"))]
    pub checkin_interval_secs: Option<u32>,
}

impl UpdateEndpointRequest {
    /// Whether applying this patch can change which edge groups the endpoint belongs to.
    pub fn affects_membership(&self) -> bool {
        self.group_id.is_some() || self.tag_ids.is_some() || self.user_trusted.is_some()
    }
}

/// Liveness summary of an endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub endpoint_id: EndpointId,
    pub alive: bool,
    pub tunnel_connected: bool,
    pub async_mode: bool,
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub pending_commands: usize,
}
