//! Execution planner - builds ordered declaration plans

use crate::resource::Declaration;
use anyhow::{Result, bail};
use std::collections::HashSet;

/// An ordered set of declarations to reconcile
///
/// Order is preserved from the source (e.g. the state file) and is the
/// order results are reported in.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub declarations: Vec<Declaration>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self {
            declarations: Vec::new(),
        }
    }

    /// Add a declaration to the plan
    pub fn add(&mut self, declaration: Declaration) {
        self.declarations.push(declaration);
    }

    /// Names declared more than once, in first-seen order
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for declaration in &self.declarations {
            let name = declaration.name();
            if !seen.insert(name) && !duplicates.iter().any(|d| d == name) {
                duplicates.push(name.to_string());
            }
        }
        duplicates
    }

    /// Check that the plan can be executed
    ///
    /// A resource may only be declared once: two declarations for the same
    /// name could otherwise be reconciled concurrently and race on its
    /// tags and permissions.
    pub fn validate(&self) -> Result<()> {
        let duplicates = self.duplicate_names();
        if !duplicates.is_empty() {
            bail!("Resource declared more than once: {}", duplicates.join(", "));
        }
        Ok(())
    }

    /// Filter plan to only include declarations matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Declaration) -> bool,
    {
        Self {
            declarations: self
                .declarations
                .into_iter()
                .filter(|d| predicate(d))
                .collect(),
        }
    }

    /// Filter plan to only include declarations matching a target pattern
    ///
    /// Target format: "kind", "kind.name" or a bare name fragment, where
    /// kind is `present` or `absent`. A bare `present` or `absent` is always
    /// a kind, so resources with those names need the "kind.name" form.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|d| matches_filter(d, kind.as_deref(), name.as_deref()))
            }
        }
    }

    /// Total number of declarations in the plan
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Parse a target string like "present.bob" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) if is_kind(kind) => (Some(kind.to_string()), Some(name.to_string())),
        None if is_kind(target) => (Some(target.to_string()), None),
        _ => (None, Some(target.to_string())),
    }
}

fn is_kind(s: &str) -> bool {
    matches!(s, "present" | "absent")
}

/// Check if a declaration matches the filter criteria
fn matches_filter(declaration: &Declaration, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind
        && declaration.kind() != k
    {
        return false;
    }

    if let Some(n) = name
        && !declaration.name().contains(n)
    {
        return false;
    }

    true
}
