//! Backend trait for managed resources
//!
//! A backend owns all persistent state of one resource type and is the
//! only thing that mutates the managed system. The reconciler reads through
//! it, decides, and then calls the mutators it needs.

use crate::error::Result;
use crate::types::{Credential, ExecContext, Permissions};
use std::collections::{BTreeMap, BTreeSet};

/// Read and mutate operations for one managed resource type
///
/// Every call receives the [`ExecContext`] of the desired state so that
/// implementations can honor `runas` and similar connection parameters.
/// Calls may block on process or network I/O; implementations impose their
/// own timeouts, if any.
///
/// # Example
///
/// ```ignore
/// use declarative::{ResourceBackend, BackendError, ExecContext};
///
/// struct Ctl;
///
/// impl ResourceBackend for Ctl {
///     fn exists(&self, name: &str, ctx: &ExecContext) -> Result<bool, BackendError> {
///         let users = run_ctl(ctx, &["list_users", "-q"])?;
///         Ok(users.lines().any(|l| l.split('\t').next() == Some(name)))
///     }
///     // ...
/// }
/// ```
pub trait ResourceBackend: Send + Sync {
    /// Whether the resource exists
    fn exists(&self, name: &str, ctx: &ExecContext) -> Result<bool>;

    /// Create the resource, optionally with a credential
    fn create(
        &self,
        name: &str,
        credential: Option<&Credential>,
        ctx: &ExecContext,
    ) -> Result<()>;

    /// Replace the credential of an existing resource
    fn set_credential(
        &self,
        name: &str,
        credential: &Credential,
        ctx: &ExecContext,
    ) -> Result<()>;

    /// Remove the credential of an existing resource
    fn clear_credential(&self, name: &str, ctx: &ExecContext) -> Result<()>;

    /// Tags currently attached to the resource
    fn list_tags(&self, name: &str, ctx: &ExecContext) -> Result<BTreeSet<String>>;

    /// Replace the full tag set of the resource
    fn set_tags(&self, name: &str, tags: &BTreeSet<String>, ctx: &ExecContext) -> Result<()>;

    /// Current permission grants, keyed by scope
    fn list_permissions(
        &self,
        name: &str,
        ctx: &ExecContext,
    ) -> Result<BTreeMap<String, Permissions>>;

    /// Grant `permissions` to `name` within `scope`, replacing any previous grant
    fn set_permission(
        &self,
        scope: &str,
        name: &str,
        permissions: &Permissions,
        ctx: &ExecContext,
    ) -> Result<()>;

    /// Delete the resource
    fn delete(&self, name: &str, ctx: &ExecContext) -> Result<()>;
}
