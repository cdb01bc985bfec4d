//! # Declarative
//!
//! A small engine for declarative state reconciliation.
//!
//! Callers describe the state a named resource should be in. The
//! [`Reconciler`] reads the current state through a [`ResourceBackend`],
//! computes the [`Delta`], applies only what differs (or just reports it in
//! a dry run), and returns a structured [`ReconcileResult`].
//!
//! ## Core Concepts
//!
//! - **DesiredState**: target attributes of one resource (credential, tags,
//!   per-scope permission grants) plus its [`ExecContext`]
//! - **ResourceBackend**: the only thing that reads or mutates the managed
//!   system
//! - **Reconciler**: `present` and `absent` entry points; never errors,
//!   every backend failure becomes a failed result
//! - **ExecutionPlan / execute**: run many declarations with a dry-run
//!   preview, confirmation and bounded parallelism
//!
//! ## Example
//!
//! ```
//! use declarative::memory::{MemoryBackend, MemoryUser};
//! use declarative::{DesiredState, Outcome, Permissions, ReconcileOptions, Reconciler};
//!
//! let backend = MemoryBackend::new().with_user("bob", MemoryUser::new().with_tags(&["legacy"]));
//!
//! let desired = DesiredState::new("bob")
//!     .with_tags(["monitoring"])
//!     .with_perm("/", Permissions::all());
//!
//! // Preview
//! let preview = Reconciler::new(&backend, ReconcileOptions::dry_run()).present(&desired);
//! assert_eq!(preview.result, Outcome::Pending);
//!
//! // Apply
//! let applied = Reconciler::new(&backend, ReconcileOptions::apply()).present(&desired);
//! assert_eq!(applied.result, Outcome::Success);
//! assert!(applied.changes.contains_key("perms"));
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`ResourceBackend`]: reads and mutates the managed system
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations

pub mod backend;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod memory;
pub mod planner;
pub mod reconciler;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use backend::ResourceBackend;
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback, ReconcileOptions,
};
pub use diff::{CredentialAction, Delta, permission_delta, tag_delta};
pub use error::BackendError;
pub use executor::{RunReport, apply_previewed, execute, execute_simple};
pub use planner::ExecutionPlan;
pub use reconciler::Reconciler;
pub use resource::Declaration;
pub use types::{
    Change, ChangeValue, Credential, DesiredState, ExecContext, ExecuteOptions, ObservedState,
    Outcome, PermissionGrant, Permissions, ReconcileResult, RunSummary,
};
