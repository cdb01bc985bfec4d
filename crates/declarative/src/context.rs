//! Reconcile options and callback traits
//!
//! These let the declarative crate be driven by any front end without
//! depending on a specific UI, prompt library or logging setup.

use crate::types::ReconcileResult;
use anyhow::Result;

/// Options injected into a [`Reconciler`](crate::Reconciler)
///
/// Dry-run is decided once by the caller's environment and handed to every
/// call through here, never read from process-wide state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Compute and report deltas without mutating anything
    pub dry_run: bool,
}

impl ReconcileOptions {
    /// Options for applying changes
    pub fn apply() -> Self {
        Self { dry_run: false }
    }

    /// Options for a dry run
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when starting to apply a batch of declarations
    fn on_batch_start(&mut self, count: usize);

    /// Called when starting to reconcile a single declaration
    fn on_resource_start(&mut self, name: &str, description: &str);

    /// Called when a reconciliation completes
    fn on_resource_complete(&mut self, name: &str, result: &ReconcileResult);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Arguments
    /// * `prompt` - The confirmation prompt to show
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _name: &str, _description: &str) {}
    fn on_resource_complete(&mut self, _name: &str, _result: &ReconcileResult) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
