//! Core types for declarative state reconciliation

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A secret credential (password) for a managed resource
///
/// The value never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret value
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the secret, for handing it to a backend
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Permission triple granted to a user within one scope
///
/// Field order follows `rabbitmqctl set_permissions`: configure, write, read.
/// Each value is a regular expression matched against resource names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    pub configure: String,
    pub write: String,
    pub read: String,
}

impl Permissions {
    pub fn new(
        configure: impl Into<String>,
        write: impl Into<String>,
        read: impl Into<String>,
    ) -> Self {
        Self {
            configure: configure.into(),
            write: write.into(),
            read: read.into(),
        }
    }

    /// Full access: `.*` for all three
    pub fn all() -> Self {
        Self::new(".*", ".*", ".*")
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configure={} write={} read={}",
            self.configure, self.write, self.read
        )
    }
}

/// One desired permission entry: a scope (virtual host) and its triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub scope: String,
    pub permissions: Permissions,
}

impl PermissionGrant {
    pub fn new(scope: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            scope: scope.into(),
            permissions,
        }
    }
}

/// Execution context handed to every backend call
///
/// Carries the connection parameters of the calling environment,
/// currently only the OS user the backend should run as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecContext {
    /// Run backend commands as this user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runas: Option<String>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runas(user: impl Into<String>) -> Self {
        Self {
            runas: Some(user.into()),
        }
    }
}

/// Caller-supplied target attributes for a named resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub name: String,
    /// Credential to set on creation, or when `force` is set
    pub password: Option<Credential>,
    /// Replace (or clear) the credential of an existing resource
    pub force: bool,
    pub tags: BTreeSet<String>,
    /// Applied in the order given; duplicates are kept
    pub perms: Vec<PermissionGrant>,
    pub context: ExecContext,
}

impl DesiredState {
    /// Desired state with only a name: ensure the resource exists
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
            force: false,
            tags: BTreeSet::new(),
            perms: Vec::new(),
            context: ExecContext::default(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Credential::new(password));
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the desired tags
    ///
    /// Each entry is split on whitespace and commas and empty pieces are
    /// dropped, the same way backends report tags, so `"a b"` means tags
    /// `a` and `b`.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = tags
            .into_iter()
            .flat_map(|tag| {
                tag.as_ref()
                    .split(|c: char| c.is_whitespace() || c == ',')
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        self
    }

    pub fn with_perm(mut self, scope: impl Into<String>, permissions: Permissions) -> Self {
        self.perms.push(PermissionGrant::new(scope, permissions));
        self
    }

    pub fn with_context(mut self, context: ExecContext) -> Self {
        self.context = context;
        self
    }

    /// Whether any attribute beyond existence is requested
    pub fn requests_mutation(&self) -> bool {
        self.force || !self.perms.is_empty() || !self.tags.is_empty()
    }
}

/// Backend-reported current attributes of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    pub exists: bool,
    pub tags: BTreeSet<String>,
    pub perms: BTreeMap<String, Permissions>,
}

impl ObservedState {
    /// State of a resource that does not exist
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Tri-state outcome of a reconciliation
///
/// Serialized as `true`, `false` or `null` (pending), matching the result
/// field of state-run output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged (or nothing to do)
    Success,
    /// A backend call failed
    Failure,
    /// Dry run: changes would be made
    Pending,
}

impl Outcome {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Success => Some(true),
            Self::Failure => Some(false),
            Self::Pending => None,
        }
    }

    pub fn from_bool(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Success,
            Some(false) => Self::Failure,
            None => Self::Pending,
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_bool().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Self::from_bool)
    }
}

/// Value on either side of a recorded change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeValue {
    Text(String),
    Tags(Vec<String>),
    Perms(BTreeMap<String, Permissions>),
}

impl From<&str> for ChangeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ChangeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&BTreeSet<String>> for ChangeValue {
    fn from(tags: &BTreeSet<String>) -> Self {
        Self::Tags(tags.iter().cloned().collect())
    }
}

impl From<BTreeMap<String, Permissions>> for ChangeValue {
    fn from(perms: BTreeMap<String, Permissions>) -> Self {
        Self::Perms(perms)
    }
}

/// Old and new value of one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub old: ChangeValue,
    pub new: ChangeValue,
}

impl Change {
    pub fn new(old: impl Into<ChangeValue>, new: impl Into<ChangeValue>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Structured outcome of one reconciliation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub name: String,
    pub result: Outcome,
    pub comment: String,
    /// Attribute name (`user`, `password`, `tags`, `perms`, `name`) to change
    pub changes: BTreeMap<String, Change>,
}

impl ReconcileResult {
    /// Empty result; a call that returns it unchanged has failed
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: Outcome::Failure,
            comment: String::new(),
            changes: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == Outcome::Success
    }

    pub fn is_failure(&self) -> bool {
        self.result == Outcome::Failure
    }

    pub fn is_pending(&self) -> bool {
        self.result == Outcome::Pending
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn change(&self, attribute: &str) -> Option<&Change> {
        self.changes.get(attribute)
    }

    pub(crate) fn record(&mut self, attribute: &str, change: Change) {
        self.changes.insert(attribute.to_string(), change);
    }

    pub(crate) fn finish(mut self, result: Outcome, comment: impl Into<String>) -> Self {
        self.result = result;
        self.comment = comment.into();
        self
    }
}

/// Summary of a run over many declarations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Succeeded with changes applied
    pub changed: usize,
    /// Dry run: would change
    pub pending: usize,
    /// Succeeded with nothing to do
    pub unchanged: usize,
    pub failed: usize,
    /// Not applied because the user declined
    pub skipped: usize,
}

impl RunSummary {
    /// Build a summary from a list of results
    pub fn from_results(results: &[ReconcileResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ReconcileResult) {
        match result.result {
            Outcome::Failure => self.failed += 1,
            Outcome::Pending => self.pending += 1,
            Outcome::Success if result.has_changes() => self.changed += 1,
            Outcome::Success => self.unchanged += 1,
        }
    }

    /// Total number of declarations processed
    pub fn total(&self) -> usize {
        self.changed + self.pending + self.unchanged + self.failed + self.skipped
    }

    /// Check if the run was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Options for executing a plan
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of declarations reconciled in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}
