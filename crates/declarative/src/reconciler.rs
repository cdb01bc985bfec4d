//! The reconciler: diff observed against desired state and apply the delta
//!
//! Both entry points follow the same shape:
//!
//! 1. Query the backend for the current state
//! 2. Short-circuit if nothing is requested or nothing exists to remove
//! 3. Compute the delta from that single observation
//! 4. Report it (dry run) or apply it step by step, stopping at the first
//!    backend failure
//!
//! Neither entry point returns an error. Every backend failure becomes a
//! [`Outcome::Failure`] result whose comment carries the backend message.
//! Changes already applied before a failure stay applied and stay listed in
//! the result; there is no rollback.

use crate::backend::ResourceBackend;
use crate::context::ReconcileOptions;
use crate::diff::{CredentialAction, Delta};
use crate::error::{BackendError, Result};
use crate::types::{
    Change, ChangeValue, DesiredState, ExecContext, ObservedState, Outcome, ReconcileResult,
};
use std::collections::{BTreeMap, BTreeSet};

/// Reconciles desired state against a [`ResourceBackend`]
///
/// # Example
///
/// ```
/// use declarative::memory::MemoryBackend;
/// use declarative::{DesiredState, Outcome, ReconcileOptions, Reconciler};
///
/// let backend = MemoryBackend::new();
/// let reconciler = Reconciler::new(&backend, ReconcileOptions::apply());
///
/// let result = reconciler.present(&DesiredState::new("bob").with_password("secret"));
/// assert_eq!(result.result, Outcome::Success);
/// assert!(backend.contains("bob"));
/// ```
pub struct Reconciler<'a, B: ResourceBackend + ?Sized> {
    backend: &'a B,
    options: ReconcileOptions,
}

impl<'a, B: ResourceBackend + ?Sized> Reconciler<'a, B> {
    pub fn new(backend: &'a B, options: ReconcileOptions) -> Self {
        Self { backend, options }
    }

    /// Ensure the resource exists with the desired attributes
    pub fn present(&self, desired: &DesiredState) -> ReconcileResult {
        let name = desired.name.as_str();
        let ctx = &desired.context;
        let mut ret = ReconcileResult::new(name);

        let exists = match self.backend.exists(name, ctx) {
            Ok(exists) => exists,
            Err(err) => return failed(ret, &err),
        };

        if exists && !desired.requests_mutation() {
            log::debug!("User '{name}' exists and force is not set");
            return ret.finish(
                Outcome::Success,
                format!("User '{name}' is already present."),
            );
        }

        let observed = match self.observe(desired, exists) {
            Ok(observed) => observed,
            Err(err) => return failed(ret, &err),
        };
        let delta = Delta::compute(desired, &observed);
        log::debug!(
            "User '{name}': {} pending mutation(s){}",
            delta.mutation_count(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        if let Err(err) = self.apply(desired, &observed, &delta, &mut ret) {
            return failed(ret, &err);
        }

        if !ret.has_changes() {
            ret.finish(
                Outcome::Success,
                format!("'{name}' is already in the desired state."),
            )
        } else if self.options.dry_run {
            ret.finish(
                Outcome::Pending,
                format!("Configuration for '{name}' will change."),
            )
        } else {
            ret.finish(Outcome::Success, format!("'{name}' was configured."))
        }
    }

    /// Ensure the resource does not exist
    pub fn absent(&self, name: &str, ctx: &ExecContext) -> ReconcileResult {
        let mut ret = ReconcileResult::new(name);

        let exists = match self.backend.exists(name, ctx) {
            Ok(exists) => exists,
            Err(err) => return failed(ret, &err),
        };

        if !exists {
            return ret.finish(
                Outcome::Success,
                format!("The user '{name}' is not present."),
            );
        }

        if self.options.dry_run {
            ret.record("name", Change::new(name, ""));
            return ret.finish(
                Outcome::Pending,
                format!("The user '{name}' will be removed."),
            );
        }

        log::debug!("Removing user '{name}'");
        if let Err(err) = self.backend.delete(name, ctx) {
            return failed(ret, &err);
        }
        ret.record("name", Change::new(name, ""));
        ret.finish(
            Outcome::Success,
            format!("The user '{name}' was removed."),
        )
    }

    /// Read the attributes the desired state cares about
    ///
    /// A missing resource has no tags and no grants, so nothing else is read.
    /// Attributes the desired state leaves empty are not read either.
    pub fn observe(&self, desired: &DesiredState, exists: bool) -> Result<ObservedState> {
        if !exists {
            return Ok(ObservedState::absent());
        }

        let name = desired.name.as_str();
        let ctx = &desired.context;
        let tags = if desired.tags.is_empty() {
            BTreeSet::new()
        } else {
            self.backend.list_tags(name, ctx)?
        };
        let perms = if desired.perms.is_empty() {
            BTreeMap::new()
        } else {
            self.backend.list_permissions(name, ctx)?
        };

        Ok(ObservedState {
            exists,
            tags,
            perms,
        })
    }

    /// Apply (or, in dry run, only record) each component of the delta
    fn apply(
        &self,
        desired: &DesiredState,
        observed: &ObservedState,
        delta: &Delta,
        ret: &mut ReconcileResult,
    ) -> Result<()> {
        let name = desired.name.as_str();
        let ctx = &desired.context;
        let dry_run = self.options.dry_run;

        if delta.create {
            if !dry_run {
                log::debug!("User '{name}' doesn't exist - creating");
                self.backend.create(name, desired.password.as_ref(), ctx)?;
            }
            ret.record("user", Change::new("", name));
        }

        match (delta.credential, desired.password.as_ref()) {
            (CredentialAction::Set, Some(credential)) => {
                if !dry_run {
                    self.backend.set_credential(name, credential, ctx)?;
                }
                ret.record("password", Change::new("", "Set password."));
            }
            (CredentialAction::Clear, _) => {
                if !dry_run {
                    log::debug!("Password for '{name}' is not set - clearing password");
                    self.backend.clear_credential(name, ctx)?;
                }
                ret.record("password", Change::new("Removed password.", ""));
            }
            _ => {}
        }

        if !delta.tags_to_add.is_empty() {
            if !dry_run {
                self.backend.set_tags(name, &delta.tags_after, ctx)?;
            }
            ret.record("tags", Change::new(&observed.tags, &delta.tags_after));
        }

        for grant in &delta.pending_perms {
            if !dry_run {
                self.backend
                    .set_permission(&grant.scope, name, &grant.permissions, ctx)?;
            }
            let entry = ret.changes.entry("perms".to_string()).or_insert_with(|| {
                Change::new(observed.perms.clone(), ChangeValue::Perms(BTreeMap::new()))
            });
            if let ChangeValue::Perms(granted) = &mut entry.new {
                granted.insert(grant.scope.clone(), grant.permissions.clone());
            }
        }

        Ok(())
    }
}

fn failed(ret: ReconcileResult, err: &BackendError) -> ReconcileResult {
    log::warn!("Reconciling '{}' failed: {err}", ret.name);
    ret.finish(Outcome::Failure, format!("Error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBackend, MemoryUser, Operation};
    use crate::types::Permissions;

    fn apply_mode(backend: &MemoryBackend) -> Reconciler<'_, MemoryBackend> {
        Reconciler::new(backend, ReconcileOptions::apply())
    }

    fn dry_run(backend: &MemoryBackend) -> Reconciler<'_, MemoryBackend> {
        Reconciler::new(backend, ReconcileOptions::dry_run())
    }

    fn tags(items: &[&str]) -> ChangeValue {
        ChangeValue::Tags(items.iter().map(|s| (*s).to_string()).collect())
    }

    // ------------------------------------------------------------------
    // present
    // ------------------------------------------------------------------

    #[test]
    fn test_present_creates_missing_user() {
        let backend = MemoryBackend::new();
        let desired = DesiredState::new("bob").with_password("p");

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Success);
        assert_eq!(backend.count(Operation::Create), 1);
        assert!(backend.contains("bob"));
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.change("user"), Some(&Change::new("", "bob")));
        assert_eq!(result.comment, "'bob' was configured.");
    }

    #[test]
    fn test_present_existing_without_requests_is_noop() {
        let backend = MemoryBackend::new().with_user("bob", MemoryUser::new().with_password("x"));
        // A differing password without force is ignored
        let desired = DesiredState::new("bob").with_password("other");

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Success);
        assert!(result.changes.is_empty());
        assert_eq!(result.comment, "User 'bob' is already present.");
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_present_force_without_password_clears() {
        let backend = MemoryBackend::new().with_user("bob", MemoryUser::new().with_password("x"));
        let desired = DesiredState::new("bob").with_force(true);

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Success);
        assert_eq!(backend.count(Operation::ClearCredential), 1);
        assert_eq!(backend.count(Operation::SetCredential), 0);
        assert_eq!(
            result.change("password"),
            Some(&Change::new("Removed password.", ""))
        );
        assert_eq!(backend.user("bob").unwrap().password, None);
    }

    #[test]
    fn test_present_force_with_password_sets() {
        let backend = MemoryBackend::new().with_user("bob", MemoryUser::new().with_password("x"));
        let desired = DesiredState::new("bob").with_force(true).with_password("new");

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(backend.count(Operation::SetCredential), 1);
        assert_eq!(backend.count(Operation::ClearCredential), 0);
        assert_eq!(
            result.change("password"),
            Some(&Change::new("", "Set password."))
        );
        assert_eq!(backend.user("bob").unwrap().password.as_deref(), Some("new"));
    }

    #[test]
    fn test_present_never_revokes_observed_only_tags() {
        // Tags are reconciled additively while permissions converge exactly.
        // This asymmetry is intentional and must be kept.
        let backend = MemoryBackend::new().with_user(
            "bob",
            MemoryUser::new().with_tags(&["legacy", "monitoring"]),
        );
        let desired = DesiredState::new("bob").with_tags(["administrator", "monitoring"]);

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Success);
        let stored = backend.user("bob").unwrap().tags;
        assert!(stored.contains("legacy"));
        assert!(stored.contains("administrator"));
        assert_eq!(
            result.change("tags"),
            Some(&Change {
                old: tags(&["legacy", "monitoring"]),
                new: tags(&["administrator", "legacy", "monitoring"]),
            })
        );
    }

    #[test]
    fn test_present_tags_subset_of_observed_is_converged() {
        let backend =
            MemoryBackend::new().with_user("bob", MemoryUser::new().with_tags(&["a", "b"]));
        let result = apply_mode(&backend).present(&DesiredState::new("bob").with_tags(["a"]));

        assert_eq!(result.result, Outcome::Success);
        assert!(result.changes.is_empty());
        assert_eq!(result.comment, "'bob' is already in the desired state.");
        assert_eq!(backend.count(Operation::SetTags), 0);
    }

    #[test]
    fn test_present_sets_each_pending_perm_once_in_order() {
        let backend = MemoryBackend::new().with_user(
            "bob",
            MemoryUser::new()
                .with_perm("/", Permissions::all())
                .with_perm("prod", Permissions::new("", "", ".*")),
        );
        let desired = DesiredState::new("bob")
            .with_perm("zeta", Permissions::all())
            .with_perm("/", Permissions::all())
            .with_perm("prod", Permissions::all())
            .with_perm("alpha", Permissions::new("^amq", "", ""));

        let result = apply_mode(&backend).present(&desired);

        let scopes: Vec<_> = backend
            .mutations()
            .into_iter()
            .filter(|c| c.operation == Operation::SetPermission)
            .filter_map(|c| c.scope)
            .collect();
        assert_eq!(scopes, vec!["zeta", "prod", "alpha"]);

        let perms = result.change("perms").unwrap();
        let ChangeValue::Perms(old) = &perms.old else {
            panic!("expected perms map");
        };
        assert_eq!(old.len(), 2);
        let ChangeValue::Perms(new) = &perms.new else {
            panic!("expected perms map");
        };
        assert_eq!(new.len(), 3);
        assert!(!new.contains_key("/"));
        assert_eq!(new["prod"], Permissions::all());
    }

    #[test]
    fn test_present_creates_then_grants_in_apply_mode() {
        let backend = MemoryBackend::new();
        let desired = DesiredState::new("svc")
            .with_tags(["monitoring"])
            .with_perm("/", Permissions::all());

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Success);
        let ops: Vec<_> = backend.calls().iter().map(|c| c.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Exists,
                Operation::Create,
                Operation::SetTags,
                Operation::SetPermission
            ]
        );
        let user = backend.user("svc").unwrap();
        assert!(user.tags.contains("monitoring"));
        assert_eq!(user.perms["/"], Permissions::all());
        assert_eq!(user.password, None);
    }

    #[test]
    fn test_present_dry_run_never_mutates() {
        let seeded = || {
            MemoryBackend::new().with_user(
                "bob",
                MemoryUser::new()
                    .with_tags(&["old"])
                    .with_perm("/", Permissions::new("", "", "")),
            )
        };
        let cases = vec![
            DesiredState::new("bob").with_force(true),
            DesiredState::new("bob").with_force(true).with_password("p"),
            DesiredState::new("bob").with_tags(["new"]),
            DesiredState::new("bob").with_perm("/", Permissions::all()),
            DesiredState::new("alice")
                .with_password("p")
                .with_tags(["x"])
                .with_perm("/", Permissions::all()),
        ];

        for desired in cases {
            let backend = seeded();
            let result = dry_run(&backend).present(&desired);
            assert!(
                backend.mutations().is_empty(),
                "dry run mutated for {}",
                desired.name
            );
            assert_eq!(result.result, Outcome::Pending);
            assert_eq!(
                result.comment,
                format!("Configuration for '{}' will change.", desired.name)
            );
        }
    }

    #[test]
    fn test_present_dry_run_missing_user_records_everything() {
        let backend = MemoryBackend::new();
        let desired = DesiredState::new("alice")
            .with_tags(["x"])
            .with_perm("/", Permissions::all());

        let result = dry_run(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Pending);
        assert!(result.change("user").is_some());
        assert!(result.change("tags").is_some());
        assert!(result.change("perms").is_some());
        // Only the existence check ran
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_present_dry_run_converged_is_success() {
        let backend =
            MemoryBackend::new().with_user("bob", MemoryUser::new().with_perm("/", Permissions::all()));
        let desired = DesiredState::new("bob").with_perm("/", Permissions::all());

        let result = dry_run(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Success);
        assert!(result.changes.is_empty());
    }

    #[test]
    fn test_present_exists_failure() {
        let backend = MemoryBackend::new().fail_on(Operation::Exists, "timeout");
        let result = apply_mode(&backend).present(&DesiredState::new("bob"));

        assert_eq!(result.result, Outcome::Failure);
        assert!(result.comment.contains("timeout"));
        assert!(result.changes.is_empty());
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_present_observe_failure_mutates_nothing() {
        let backend = MemoryBackend::new()
            .with_user("bob", MemoryUser::new())
            .fail_on(Operation::ListPermissions, "node down");
        let desired = DesiredState::new("bob")
            .with_force(true)
            .with_perm("/", Permissions::all());

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Failure);
        assert_eq!(result.comment, "Error: node down");
        assert!(result.changes.is_empty());
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_present_failure_keeps_earlier_changes() {
        let backend = MemoryBackend::new().fail_on(Operation::SetPermission, "access_refused");
        let desired = DesiredState::new("bob")
            .with_tags(["monitoring"])
            .with_perm("/", Permissions::all())
            .with_perm("other", Permissions::all());

        let result = apply_mode(&backend).present(&desired);

        assert_eq!(result.result, Outcome::Failure);
        assert_eq!(result.comment, "Error: access_refused");
        assert!(result.change("user").is_some());
        assert!(result.change("tags").is_some());
        assert!(result.change("perms").is_none());
        // Stops at the first failure, nothing rolled back
        assert_eq!(backend.count(Operation::SetPermission), 1);
        assert!(backend.contains("bob"));
    }

    #[test]
    fn test_present_passes_exec_context() {
        let backend = MemoryBackend::new();
        let desired = DesiredState::new("bob").with_context(ExecContext::runas("rabbitmq"));

        apply_mode(&backend).present(&desired);

        assert!(
            backend
                .calls()
                .iter()
                .all(|c| c.runas.as_deref() == Some("rabbitmq"))
        );
    }

    #[test]
    fn test_present_is_idempotent() {
        let backend = MemoryBackend::new();
        let desired = DesiredState::new("bob")
            .with_password("p")
            .with_tags(["admin"])
            .with_perm("/", Permissions::all());
        let reconciler = apply_mode(&backend);

        let first = reconciler.present(&desired);
        assert!(first.has_changes());

        let second = reconciler.present(&desired);
        assert_eq!(second.result, Outcome::Success);
        assert!(second.changes.is_empty());
    }

    // ------------------------------------------------------------------
    // absent
    // ------------------------------------------------------------------

    #[test]
    fn test_absent_not_present() {
        let backend = MemoryBackend::new();
        let ctx = ExecContext::default();

        for reconciler in [apply_mode(&backend), dry_run(&backend)] {
            let result = reconciler.absent("bob", &ctx);
            assert_eq!(result.result, Outcome::Success);
            assert_eq!(result.comment, "The user 'bob' is not present.");
            assert!(result.changes.is_empty());
        }
    }

    #[test]
    fn test_absent_dry_run_reports_removal() {
        let backend = MemoryBackend::new().with_user("bob", MemoryUser::new());

        let result = dry_run(&backend).absent("bob", &ExecContext::default());

        assert_eq!(result.result, Outcome::Pending);
        assert_eq!(result.comment, "The user 'bob' will be removed.");
        assert_eq!(result.change("name"), Some(&Change::new("bob", "")));
        assert_eq!(backend.count(Operation::Delete), 0);
        assert!(backend.contains("bob"));
    }

    #[test]
    fn test_absent_removes() {
        let backend = MemoryBackend::new().with_user("bob", MemoryUser::new());

        let result = apply_mode(&backend).absent("bob", &ExecContext::default());

        assert_eq!(result.result, Outcome::Success);
        assert_eq!(result.comment, "The user 'bob' was removed.");
        assert_eq!(result.change("name"), Some(&Change::new("bob", "")));
        assert!(!backend.contains("bob"));
    }

    #[test]
    fn test_absent_delete_failure() {
        let backend = MemoryBackend::new()
            .with_user("bob", MemoryUser::new())
            .fail_on(Operation::Delete, "in use");

        let result = apply_mode(&backend).absent("bob", &ExecContext::default());

        assert_eq!(result.result, Outcome::Failure);
        assert_eq!(result.comment, "Error: in use");
        assert!(result.changes.is_empty());
    }

    #[test]
    fn test_absent_exists_failure() {
        let backend = MemoryBackend::new().fail_on(Operation::Exists, "timeout");
        let result = dry_run(&backend).absent("bob", &ExecContext::default());
        assert_eq!(result.result, Outcome::Failure);
        assert!(result.comment.contains("timeout"));
    }
}
