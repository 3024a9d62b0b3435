//! Edge group domain model.
//!
//! An edge group is a named target selector. Static groups hold an explicit
//! endpoint list; dynamic groups derive membership from tags on every read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use validator::Validate;

use super::ids::{EdgeGroupId, EndpointId, TagId};

/// Tag matching semantics of a dynamic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// "Any tag": the device shares at least one tag with the group.
    Partial,
    /// "All tags": every group tag is present on the device.
    Full,
}

impl MatchMode {
    pub fn from_partial_match(partial_match: bool) -> Self {
        if partial_match {
            Self::Partial
        } else {
            Self::Full
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial)
    }
}

/// How membership of an edge group is determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupSelector {
    Static {
        #[serde(default)]
        endpoints: BTreeSet<EndpointId>,
    },
    Dynamic {
        tags: BTreeSet<TagId>,
        match_mode: MatchMode,
    },
}

impl GroupSelector {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic { .. })
    }

    /// Tags referenced by a dynamic selector; empty for static ones.
    pub fn tags(&self) -> BTreeSet<TagId> {
        match self {
            Self::Dynamic { tags, .. } => tags.clone(),
            Self::Static { .. } => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeGroup {
    pub id: EdgeGroupId,
    pub name: String,
    pub selector: GroupSelector,
}

impl EdgeGroup {
    pub fn is_dynamic(&self) -> bool {
        self.selector.is_dynamic()
    }
}

/// Request payload for edge group creation and replacement.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EdgeGroupRequest {
    #[validate(custom(function = "shared::validation::validate_name"))]
    pub name: String,

    pub selector: GroupSelector,
}
