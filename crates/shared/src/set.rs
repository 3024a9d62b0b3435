//! Set algebra over small identifier sets.
//!
//! Used for tag sets, group memberships and command targets. All operations
//! are pure and order-independent.
//!
//! An empty input is the identity element for [`union`] and the absorbing
//! element for [`intersection`]. Intersecting zero sets yields the empty set,
//! not a "universal" set: callers that want "no filter" semantics must only
//! rely on that for unions.

use std::collections::BTreeSet;

/// Union of any number of sets. Zero sets yield the empty set.
pub fn union<'a, T, I>(sets: I) -> BTreeSet<T>
where
    T: Ord + Clone + 'a,
    I: IntoIterator<Item = &'a BTreeSet<T>>,
{
    let mut result = BTreeSet::new();
    for set in sets {
        result.extend(set.iter().cloned());
    }
    result
}

/// Intersection of any number of sets. Zero sets yield the empty set.
pub fn intersection<'a, T, I>(sets: I) -> BTreeSet<T>
where
    T: Ord + Clone + 'a,
    I: IntoIterator<Item = &'a BTreeSet<T>>,
{
    let mut iter = sets.into_iter();
    let Some(first) = iter.next() else {
        return BTreeSet::new();
    };

    let mut result = first.clone();
    for set in iter {
        if result.is_empty() {
            break;
        }
        result.retain(|item| set.contains(item));
    }
    result
}

/// `a - b`: elements of `a` that are not in `b`.
pub fn difference<T: Ord + Clone>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> BTreeSet<T> {
    a.difference(b).cloned().collect()
}

/// Returns true when every element of `b` is present in `a` (`b ⊆ a`).
pub fn contains<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> bool {
    b.is_subset(a)
}

/// Returns true when the two sets share at least one element.
pub fn intersects<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> bool {
    !a.is_disjoint(b)
}
