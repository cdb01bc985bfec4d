//! Declarations: one desired outcome for one named resource
//!
//! A declaration is either "this resource exists with these attributes"
//! or "this resource does not exist". Running it means handing it to the
//! matching [`Reconciler`] entry point.

use crate::backend::ResourceBackend;
use crate::reconciler::Reconciler;
use crate::types::{DesiredState, ExecContext, ReconcileResult};

/// Desired outcome for one named resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// Ensure the resource exists with the given attributes
    Present(DesiredState),
    /// Ensure the resource does not exist
    Absent { name: String, context: ExecContext },
}

impl Declaration {
    pub fn present(desired: DesiredState) -> Self {
        Self::Present(desired)
    }

    pub fn absent(name: impl Into<String>, context: ExecContext) -> Self {
        Self::Absent {
            name: name.into(),
            context,
        }
    }

    /// Name of the targeted resource
    pub fn name(&self) -> &str {
        match self {
            Self::Present(desired) => &desired.name,
            Self::Absent { name, .. } => name,
        }
    }

    /// `"present"` or `"absent"`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Present(_) => "present",
            Self::Absent { .. } => "absent",
        }
    }

    pub fn context(&self) -> &ExecContext {
        match self {
            Self::Present(desired) => &desired.context,
            Self::Absent { context, .. } => context,
        }
    }

    /// Human-readable description of what this declaration ensures
    pub fn description(&self) -> String {
        match self {
            Self::Present(desired) => {
                let mut parts = Vec::new();
                if !desired.tags.is_empty() {
                    parts.push(format!("{} tag(s)", desired.tags.len()));
                }
                if !desired.perms.is_empty() {
                    parts.push(format!("{} grant(s)", desired.perms.len()));
                }
                if desired.force {
                    parts.push("forced password".to_string());
                }
                if parts.is_empty() {
                    format!("Ensure user '{}' is present", desired.name)
                } else {
                    format!(
                        "Ensure user '{}' is present with {}",
                        desired.name,
                        parts.join(", ")
                    )
                }
            }
            Self::Absent { name, .. } => format!("Ensure user '{name}' is absent"),
        }
    }

    /// Run this declaration through `reconciler`
    pub fn reconcile<B: ResourceBackend + ?Sized>(
        &self,
        reconciler: &Reconciler<'_, B>,
    ) -> ReconcileResult {
        match self {
            Self::Present(desired) => reconciler.present(desired),
            Self::Absent { name, context } => reconciler.absent(name, context),
        }
    }
}
