//! In-memory backend
//!
//! A stateful [`ResourceBackend`] that keeps users in a map, records every
//! call, and can be told to fail specific operations. Used by the test
//! suites of this workspace and by anyone embedding the reconciler who
//! needs a backend without a broker.

use crate::backend::ResourceBackend;
use crate::error::{BackendError, Result};
use crate::types::{Credential, ExecContext, Permissions};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Backend operation, as recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Create,
    SetCredential,
    ClearCredential,
    ListTags,
    SetTags,
    ListPermissions,
    SetPermission,
    Delete,
}

impl Operation {
    /// Whether the operation changes the managed system
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Exists | Self::ListTags | Self::ListPermissions)
    }
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub name: String,
    /// Scope, for `SetPermission`
    pub scope: Option<String>,
    pub runas: Option<String>,
}

/// A stored user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryUser {
    pub password: Option<String>,
    pub tags: BTreeSet<String>,
    pub perms: BTreeMap<String, Permissions>,
}

impl MemoryUser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }

    pub fn with_perm(mut self, scope: &str, permissions: Permissions) -> Self {
        self.perms.insert(scope.to_string(), permissions);
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<String, MemoryUser>,
    calls: Vec<Call>,
    failures: HashMap<Operation, String>,
}

/// In-memory [`ResourceBackend`] with a call log
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user
    pub fn with_user(self, name: &str, user: MemoryUser) -> Self {
        self.lock().users.insert(name.to_string(), user);
        self
    }

    /// Make every call to `operation` fail with `message`
    pub fn fail_on(self, operation: Operation, message: &str) -> Self {
        self.lock().failures.insert(operation, message.to_string());
        self
    }

    /// Snapshot of a stored user
    pub fn user(&self, name: &str) -> Option<MemoryUser> {
        self.lock().users.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().users.contains_key(name)
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls that changed (or tried to change) the managed system
    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of calls to `operation`
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call and return the locked state, or the injected failure
    fn enter(
        &self,
        operation: Operation,
        name: &str,
        scope: Option<&str>,
        ctx: &ExecContext,
    ) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        inner.calls.push(Call {
            operation,
            name: name.to_string(),
            scope: scope.map(str::to_string),
            runas: ctx.runas.clone(),
        });
        if let Some(message) = inner.failures.get(&operation) {
            return Err(BackendError::new(message.clone()));
        }
        Ok(inner)
    }
}

fn no_such_user(name: &str) -> BackendError {
    BackendError::new(format!("no_such_user: {name}"))
}

impl ResourceBackend for MemoryBackend {
    fn exists(&self, name: &str, ctx: &ExecContext) -> Result<bool> {
        let inner = self.enter(Operation::Exists, name, None, ctx)?;
        Ok(inner.users.contains_key(name))
    }

    fn create(
        &self,
        name: &str,
        credential: Option<&Credential>,
        ctx: &ExecContext,
    ) -> Result<()> {
        let mut inner = self.enter(Operation::Create, name, None, ctx)?;
        if inner.users.contains_key(name) {
            return Err(BackendError::new(format!("user_already_exists: {name}")));
        }
        let user = MemoryUser {
            password: credential.map(|c| c.expose().to_string()),
            ..MemoryUser::default()
        };
        inner.users.insert(name.to_string(), user);
        Ok(())
    }

    fn set_credential(
        &self,
        name: &str,
        credential: &Credential,
        ctx: &ExecContext,
    ) -> Result<()> {
        let mut inner = self.enter(Operation::SetCredential, name, None, ctx)?;
        let user = inner.users.get_mut(name).ok_or_else(|| no_such_user(name))?;
        user.password = Some(credential.expose().to_string());
        Ok(())
    }

    fn clear_credential(&self, name: &str, ctx: &ExecContext) -> Result<()> {
        let mut inner = self.enter(Operation::ClearCredential, name, None, ctx)?;
        let user = inner.users.get_mut(name).ok_or_else(|| no_such_user(name))?;
        user.password = None;
        Ok(())
    }

    fn list_tags(&self, name: &str, ctx: &ExecContext) -> Result<BTreeSet<String>> {
        let inner = self.enter(Operation::ListTags, name, None, ctx)?;
        inner
            .users
            .get(name)
            .map(|u| u.tags.clone())
            .ok_or_else(|| no_such_user(name))
    }

    fn set_tags(&self, name: &str, tags: &BTreeSet<String>, ctx: &ExecContext) -> Result<()> {
        let mut inner = self.enter(Operation::SetTags, name, None, ctx)?;
        let user = inner.users.get_mut(name).ok_or_else(|| no_such_user(name))?;
        user.tags = tags.clone();
        Ok(())
    }

    fn list_permissions(
        &self,
        name: &str,
        ctx: &ExecContext,
    ) -> Result<BTreeMap<String, Permissions>> {
        let inner = self.enter(Operation::ListPermissions, name, None, ctx)?;
        inner
            .users
            .get(name)
            .map(|u| u.perms.clone())
            .ok_or_else(|| no_such_user(name))
    }

    fn set_permission(
        &self,
        scope: &str,
        name: &str,
        permissions: &Permissions,
        ctx: &ExecContext,
    ) -> Result<()> {
        let mut inner = self.enter(Operation::SetPermission, name, Some(scope), ctx)?;
        let user = inner.users.get_mut(name).ok_or_else(|| no_such_user(name))?;
        user.perms.insert(scope.to_string(), permissions.clone());
        Ok(())
    }

    fn delete(&self, name: &str, ctx: &ExecContext) -> Result<()> {
        let mut inner = self.enter(Operation::Delete, name, None, ctx)?;
        inner
            .users
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| no_such_user(name))
    }
}
