//! Real RabbitMQ backend using `rabbitmqctl` commands.

use crate::backend::{Runner, SystemRunner};
use crate::error::{Error, Result};
use crate::parse::{parse_permissions, parse_users};
use crate::types::CtlConfig;
use declarative::{Credential, ExecContext, Permissions, ResourceBackend};
use std::collections::{BTreeMap, BTreeSet};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Backend that manages RabbitMQ users through `rabbitmqctl`.
///
/// When the [`ExecContext`] names a `runas` user, every command is run
/// through `sudo -n -u <runas>`, so the broker's Erlang cookie of that
/// user is used.
pub struct RabbitmqctlBackend<R: Runner = SystemRunner> {
    /// Path to the rabbitmqctl executable
    ctl_path: String,
    /// Program used for `runas`
    sudo_path: String,
    runner: R,
}

impl RabbitmqctlBackend<SystemRunner> {
    /// Create a new backend.
    ///
    /// Returns an error if rabbitmqctl is not configured and cannot be found.
    pub fn new(config: CtlConfig) -> Result<Self> {
        let ctl_path = match config.ctl_path {
            Some(path) => path.display().to_string(),
            None => find_ctl()?,
        };
        Ok(Self::with_runner(ctl_path, config.sudo_path, SystemRunner))
    }
}

impl<R: Runner> RabbitmqctlBackend<R> {
    /// Create a backend with a custom runner (useful for testing).
    pub fn with_runner(ctl_path: impl Into<String>, sudo_path: impl Into<String>, runner: R) -> Self {
        Self {
            ctl_path: ctl_path.into(),
            sudo_path: sudo_path.into(),
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Program and arguments for one rabbitmqctl invocation
    fn invocation(&self, args: &[&str], ctx: &ExecContext) -> (String, Vec<String>) {
        let ctl_args = args.iter().map(|a| (*a).to_string());
        match &ctx.runas {
            Some(user) => {
                let mut full = vec![
                    "-n".to_string(),
                    "-u".to_string(),
                    user.clone(),
                    self.ctl_path.clone(),
                ];
                full.extend(ctl_args);
                (self.sudo_path.clone(), full)
            }
            None => (self.ctl_path.clone(), ctl_args.collect()),
        }
    }

    /// Run rabbitmqctl and check for success.
    ///
    /// `args[0]` is the rabbitmqctl action; it is the only part of the
    /// command line that is logged, since other arguments may be secrets.
    fn run_checked(&self, args: &[&str], user: Option<&str>, ctx: &ExecContext) -> Result<String> {
        let action = args.first().copied().unwrap_or_default();
        let (program, full_args) = self.invocation(args, ctx);
        log::debug!(
            "rabbitmqctl {action}{}{}",
            user.map(|u| format!(" [{u}]")).unwrap_or_default(),
            ctx.runas
                .as_deref()
                .map(|r| format!(" as {r}"))
                .unwrap_or_default()
        );

        let output = self.runner.run(&program, &full_args)?;
        if !output.success {
            return Err(Error::from_ctl_output(&output.error_text(), user, action));
        }
        Ok(output.stdout_str())
    }

    /// All users and their tags.
    pub fn list_users(&self, ctx: &ExecContext) -> Result<BTreeMap<String, BTreeSet<String>>> {
        let output = self.run_checked(&["list_users", "-q"], None, ctx)?;
        parse_users(&output)
    }

    fn add_user(&self, name: &str, password: &str, ctx: &ExecContext) -> Result<()> {
        self.run_checked(&["add_user", name, password], Some(name), ctx)?;
        Ok(())
    }

    fn clear_password(&self, name: &str, ctx: &ExecContext) -> Result<()> {
        self.run_checked(&["clear_password", name], Some(name), ctx)?;
        Ok(())
    }
}

impl<R: Runner> ResourceBackend for RabbitmqctlBackend<R> {
    fn exists(&self, name: &str, ctx: &ExecContext) -> declarative::error::Result<bool> {
        Ok(self.list_users(ctx)?.contains_key(name))
    }

    /// Create the user.
    ///
    /// Without a credential this takes two commands: `add_user` with a
    /// throwaway password, then `clear_password`. If only the first one
    /// succeeds the user exists with the throwaway password, and the error
    /// says so.
    fn create(
        &self,
        name: &str,
        credential: Option<&Credential>,
        ctx: &ExecContext,
    ) -> declarative::error::Result<()> {
        match credential {
            Some(credential) => self.add_user(name, credential.expose(), ctx)?,
            None => {
                // add_user requires a password: use a throwaway one, then drop it
                self.add_user(name, &throwaway_password(name), ctx)?;
                if let Err(err) = self.clear_password(name, ctx) {
                    return Err(Error::CommandFailed {
                        message: format!(
                            "user '{name}' was created but its temporary password could not be cleared"
                        ),
                        stderr: err.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn set_credential(
        &self,
        name: &str,
        credential: &Credential,
        ctx: &ExecContext,
    ) -> declarative::error::Result<()> {
        self.run_checked(
            &["change_password", name, credential.expose()],
            Some(name),
            ctx,
        )?;
        Ok(())
    }

    fn clear_credential(&self, name: &str, ctx: &ExecContext) -> declarative::error::Result<()> {
        Ok(self.clear_password(name, ctx)?)
    }

    fn list_tags(
        &self,
        name: &str,
        ctx: &ExecContext,
    ) -> declarative::error::Result<BTreeSet<String>> {
        let mut users = self.list_users(ctx)?;
        users.remove(name).ok_or_else(|| {
            Error::NotFound {
                message: format!("no_such_user: {name}"),
            }
            .into()
        })
    }

    fn set_tags(
        &self,
        name: &str,
        tags: &BTreeSet<String>,
        ctx: &ExecContext,
    ) -> declarative::error::Result<()> {
        let mut args = vec!["set_user_tags", name];
        args.extend(tags.iter().map(String::as_str));
        self.run_checked(&args, Some(name), ctx)?;
        Ok(())
    }

    fn list_permissions(
        &self,
        name: &str,
        ctx: &ExecContext,
    ) -> declarative::error::Result<BTreeMap<String, Permissions>> {
        let output = self.run_checked(&["list_user_permissions", "-q", name], Some(name), ctx)?;
        Ok(parse_permissions(&output)?)
    }

    fn set_permission(
        &self,
        scope: &str,
        name: &str,
        permissions: &Permissions,
        ctx: &ExecContext,
    ) -> declarative::error::Result<()> {
        self.run_checked(
            &[
                "set_permissions",
                "-p",
                scope,
                name,
                permissions.configure.as_str(),
                permissions.write.as_str(),
                permissions.read.as_str(),
            ],
            Some(name),
            ctx,
        )?;
        Ok(())
    }

    fn delete(&self, name: &str, ctx: &ExecContext) -> declarative::error::Result<()> {
        self.run_checked(&["delete_user", name], Some(name), ctx)?;
        Ok(())
    }
}

/// Find the rabbitmqctl executable path.
fn find_ctl() -> Result<String> {
    // Check common locations
    let paths = [
        "/usr/sbin/rabbitmqctl",            // Debian/RHEL packages
        "/usr/lib/rabbitmq/bin/rabbitmqctl", // Generic unix tarball
        "/usr/local/sbin/rabbitmqctl",      // Homebrew (Intel)
        "/opt/homebrew/sbin/rabbitmqctl",   // Homebrew (Apple Silicon)
    ];

    for path in &paths {
        if std::path::Path::new(path).exists() {
            return Ok((*path).to_string());
        }
    }

    // Try which
    let output = Command::new("which")
        .arg("rabbitmqctl")
        .output()
        .map_err(|_| Error::CtlNotFound)?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(Error::CtlNotFound)
}

/// Unguessable password for the instant between add_user and clear_password
fn throwaway_password(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.finalize().to_hex().to_string()
}
