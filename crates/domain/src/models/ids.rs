//! Integer identifier newtypes.
//!
//! Every relationship between entities is expressed through these IDs and
//! re-resolved through the store; no model holds a reference to another.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a managed device (endpoint).
    EndpointId
);
id_type!(
    /// Identifier of a static endpoint group.
    EndpointGroupId
);
id_type!(
    /// Identifier of an edge group.
    EdgeGroupId
);
id_type!(
    /// Identifier of a tag.
    TagId
);
id_type!(
    /// Identifier of a targetable resource (stack, job or config).
    ResourceId
);
id_type!(
    /// Identifier of a command log entry. Assigned in append order.
    CommandId
);
