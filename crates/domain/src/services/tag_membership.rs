//! Tag membership resolution for dynamic edge groups.
//!
//! A device's effective tags are its own tags plus the tags of its static
//! group. Both match modes treat group-inherited tags exactly like the
//! device's own, so a device can satisfy a full-match group purely through
//! its static group.
//!
//! An empty edge-group tag set under full match is satisfied by every device
//! (vacuous truth). Dynamic groups are validated to carry at least one tag
//! when they are created, so this is not guarded against here.

use std::collections::BTreeSet;

use shared::set;

use crate::models::{MatchMode, TagId};

/// `device_tags ∪ group_tags`.
pub fn effective_tags(
    device_tags: &BTreeSet<TagId>,
    group_tags: &BTreeSet<TagId>,
) -> BTreeSet<TagId> {
    set::union([device_tags, group_tags])
}

/// Decides whether a device with the given tags belongs to a dynamic edge group.
pub fn matches_tags(
    device_tags: &BTreeSet<TagId>,
    group_tags: &BTreeSet<TagId>,
    edge_group_tags: &BTreeSet<TagId>,
    mode: MatchMode,
) -> bool {
    let effective = effective_tags(device_tags, group_tags);
    match mode {
        MatchMode::Partial => set::intersects(&effective, edge_group_tags),
        MatchMode::Full => set::contains(&effective, edge_group_tags),
    }
}
