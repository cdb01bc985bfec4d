//! Delta computation between observed and desired state
//!
//! Everything here is pure: the delta is decided from one snapshot of the
//! observed state and is never revised while it is being applied.

use crate::types::{DesiredState, ObservedState, PermissionGrant, Permissions};
use std::collections::{BTreeMap, BTreeSet};

/// What to do with the credential of the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialAction {
    /// Leave it alone (or pass it to create)
    Keep,
    /// Replace it with the desired credential
    Set,
    /// Remove it
    Clear,
}

/// Differences to apply, partitioned by attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// The resource must be created
    pub create: bool,
    pub credential: CredentialAction,
    /// Desired tags missing from the observed set
    pub tags_to_add: BTreeSet<String>,
    /// Tag set to write when `tags_to_add` is non-empty: observed plus desired
    pub tags_after: BTreeSet<String>,
    /// Grants whose scope is missing or differs, in caller order
    pub pending_perms: Vec<PermissionGrant>,
}

impl Delta {
    /// Compute the delta for `desired` against one observation
    pub fn compute(desired: &DesiredState, observed: &ObservedState) -> Self {
        let credential = match (observed.exists, desired.force, &desired.password) {
            (true, true, Some(_)) => CredentialAction::Set,
            (true, true, None) => CredentialAction::Clear,
            _ => CredentialAction::Keep,
        };

        let tags_to_add = tag_delta(&desired.tags, &observed.tags);
        let tags_after = if tags_to_add.is_empty() {
            observed.tags.clone()
        } else {
            observed.tags.union(&desired.tags).cloned().collect()
        };

        Self {
            create: !observed.exists,
            credential,
            tags_to_add,
            tags_after,
            pending_perms: permission_delta(&desired.perms, &observed.perms),
        }
    }

    /// Check if there is nothing to apply
    pub fn is_empty(&self) -> bool {
        !self.create
            && self.credential == CredentialAction::Keep
            && self.tags_to_add.is_empty()
            && self.pending_perms.is_empty()
    }

    /// Number of mutating backend calls applying this delta would make
    pub fn mutation_count(&self) -> usize {
        usize::from(self.create)
            + usize::from(self.credential != CredentialAction::Keep)
            + usize::from(!self.tags_to_add.is_empty())
            + self.pending_perms.len()
    }
}

/// Desired tags not present in the observed set
///
/// Tags that are only observed are never part of the delta: reconciling
/// tags is additive.
pub fn tag_delta(desired: &BTreeSet<String>, observed: &BTreeSet<String>) -> BTreeSet<String> {
    desired.difference(observed).cloned().collect()
}

/// Desired grants whose scope is missing from, or differs in, the observation
///
/// Order and duplicates of `desired` are preserved.
pub fn permission_delta(
    desired: &[PermissionGrant],
    observed: &BTreeMap<String, Permissions>,
) -> Vec<PermissionGrant> {
    desired
        .iter()
        .filter(|grant| observed.get(&grant.scope) != Some(&grant.permissions))
        .cloned()
        .collect()
}
