//! The state file: which RabbitMQ users should exist and how
//!
//! ```toml
//! [settings]
//! rabbitmqctl = "/usr/sbin/rabbitmqctl"
//! runas = "rabbitmq"
//!
//! [[users]]
//! name = "monitor"
//! password_env = "MONITOR_PASSWORD"
//! tags = ["monitoring"]
//!
//! [[users.perms]]
//! vhost = "/"
//! configure = ""
//! write = ""
//! read = ".*"
//!
//! [[users]]
//! name = "guest"
//! ensure = "absent"
//! ```

use anyhow::{Context, Result, bail};
use declarative::{Declaration, DesiredState, ExecContext, ExecutionPlan, Permissions};
use rabbitkit::CtlConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::paths;

// ============================================================================
// State File Structures
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateFile {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// Settings shared by every user entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Path to rabbitmqctl; searched for when unset
    pub rabbitmqctl: Option<String>,

    /// Program used to run rabbitmqctl as `runas`
    pub sudo: Option<String>,

    /// Default OS user to run rabbitmqctl as
    pub runas: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserEntry {
    pub name: String,

    #[serde(default)]
    pub ensure: Ensure,

    /// Password in clear text
    pub password: Option<String>,

    /// Environment variable holding the password
    pub password_env: Option<String>,

    /// Reset the password of an existing user (or clear it if none is given)
    #[serde(default)]
    pub force: bool,

    /// A list, or a whitespace-separated string
    #[serde(default, deserialize_with = "tag_list")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub perms: Vec<PermEntry>,

    /// Overrides `settings.runas`
    pub runas: Option<String>,
}

/// Permission regexes on one virtual host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermEntry {
    #[serde(alias = "scope")]
    pub vhost: String,
    pub configure: String,
    pub write: String,
    pub read: String,
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl StateFile {
    /// Load and validate a state file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid state file {}", path.display()))?;
        state
            .validate()
            .with_context(|| format!("Invalid state file {}", path.display()))?;
        log::debug!(
            "Loaded {} user(s) from {}",
            state.users.len(),
            path.display()
        );
        Ok(state)
    }

    /// Check the entries without contacting the broker
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for (i, user) in self.users.iter().enumerate() {
            let label = if user.name.is_empty() {
                format!("users[{i}]")
            } else {
                format!("'{}'", user.name)
            };

            if user.name.trim().is_empty() {
                problems.push(format!("{label}: name is empty"));
            } else if !seen.insert(user.name.as_str()) {
                problems.push(format!("{label}: declared more than once"));
            }

            if user.password.is_some() && user.password_env.is_some() {
                problems.push(format!(
                    "{label}: set either password or password_env, not both"
                ));
            }

            for perm in &user.perms {
                if perm.vhost.is_empty() {
                    problems.push(format!("{label}: permission entry has an empty vhost"));
                }
            }

            if user.ensure == Ensure::Absent
                && (user.password.is_some()
                    || user.password_env.is_some()
                    || user.force
                    || !user.tags.is_empty()
                    || !user.perms.is_empty())
            {
                log::warn!("{label} is absent; its other settings are ignored");
            }
        }

        if !problems.is_empty() {
            bail!("{}", problems.join("\n"));
        }
        Ok(())
    }

    /// Where to find rabbitmqctl
    pub fn ctl_config(&self) -> CtlConfig {
        let defaults = CtlConfig::default();
        CtlConfig {
            ctl_path: self.settings.rabbitmqctl.as_deref().map(paths::expand),
            sudo_path: self.settings.sudo.clone().unwrap_or(defaults.sudo_path),
        }
    }

    /// Build the execution plan, in file order
    ///
    /// Passwords named by `password_env` are read here, so a missing
    /// variable fails the whole run before anything is touched.
    pub fn to_plan(&self) -> Result<ExecutionPlan> {
        let mut plan = ExecutionPlan::new();
        for user in &self.users {
            plan.add(self.declaration(user)?);
        }
        Ok(plan)
    }

    fn declaration(&self, user: &UserEntry) -> Result<Declaration> {
        let context = match user.runas.as_ref().or(self.settings.runas.as_ref()) {
            Some(runas) => ExecContext::runas(runas.as_str()),
            None => ExecContext::new(),
        };

        if user.ensure == Ensure::Absent {
            return Ok(Declaration::absent(user.name.as_str(), context));
        }

        let mut desired = DesiredState::new(user.name.as_str())
            .with_force(user.force)
            .with_tags(user.tags.iter().map(String::as_str))
            .with_context(context);

        if let Some(password) = resolve_password(user)? {
            desired = desired.with_password(password);
        }
        for perm in &user.perms {
            desired = desired.with_perm(
                perm.vhost.as_str(),
                Permissions::new(
                    perm.configure.as_str(),
                    perm.write.as_str(),
                    perm.read.as_str(),
                ),
            );
        }

        Ok(Declaration::present(desired))
    }
}

fn tag_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        Joined(String),
        List(Vec<String>),
    }

    Ok(match Tags::deserialize(deserializer)? {
        Tags::Joined(tags) => tags.split_whitespace().map(str::to_string).collect(),
        Tags::List(tags) => tags,
    })
}

fn resolve_password(user: &UserEntry) -> Result<Option<String>> {
    if let Some(var) = &user.password_env {
        let password = std::env::var(var).with_context(|| {
            format!(
                "Environment variable {var} (password for '{}') is not set",
                user.name
            )
        })?;
        return Ok(Some(password));
    }
    Ok(user.password.clone())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[settings]
rabbitmqctl = "/usr/sbin/rabbitmqctl"
runas = "rabbitmq"

[[users]]
name = "monitor"
password = "s3cret"
tags = ["monitoring"]

[[users.perms]]
vhost = "/"
configure = ""
write = ""
read = ".*"

[[users.perms]]
scope = "reports"
configure = ".*"
write = ".*"
read = ".*"

[[users]]
name = "guest"
ensure = "absent"
runas = "root"
"#;

    fn parse(content: &str) -> StateFile {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_load_sample() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let state = StateFile::load(file.path()).unwrap();
        assert_eq!(state.users.len(), 2);
        assert_eq!(state.users[0].perms.len(), 2);
        assert_eq!(state.users[0].perms[1].vhost, "reports");
        assert_eq!(state.users[1].ensure, Ensure::Absent);
    }

    #[test]
    fn test_load_missing_file() {
        let err = StateFile::load(Path::new("/nonexistent/users.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<StateFile, _> =
            toml::from_str("[[users]]\nname = \"bob\"\npasword = \"typo\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_duplicates_and_empty_names() {
        let state = parse(
            r#"
[[users]]
name = "bob"

[[users]]
name = "bob"
ensure = "absent"

[[users]]
name = ""
"#,
        );
        let err = state.validate().unwrap_err().to_string();
        assert!(err.contains("'bob': declared more than once"));
        assert!(err.contains("users[2]: name is empty"));
    }

    #[test]
    fn test_validate_password_and_env() {
        let state = parse(
            r#"
[[users]]
name = "bob"
password = "x"
password_env = "BOB_PASSWORD"
"#,
        );
        let err = state.validate().unwrap_err().to_string();
        assert!(err.contains("not both"));
    }

    #[test]
    fn test_plan_from_sample() {
        let state = parse(SAMPLE);
        let plan = state.to_plan().unwrap();
        assert_eq!(plan.len(), 2);

        match &plan.declarations[0] {
            Declaration::Present(desired) => {
                assert_eq!(desired.name, "monitor");
                assert_eq!(desired.password.as_ref().unwrap().expose(), "s3cret");
                assert!(desired.tags.contains("monitoring"));
                assert_eq!(desired.perms.len(), 2);
                assert_eq!(desired.perms[0].scope, "/");
                assert_eq!(desired.perms[0].permissions, Permissions::new("", "", ".*"));
                assert_eq!(desired.context.runas.as_deref(), Some("rabbitmq"));
            }
            Declaration::Absent { .. } => panic!("expected present"),
        }

        // Per-user runas overrides the default
        assert_eq!(plan.declarations[1].name(), "guest");
        assert_eq!(plan.declarations[1].context().runas.as_deref(), Some("root"));
    }

    #[test]
    fn test_tags_as_string() {
        let state = parse(
            r#"
[[users]]
name = "admin"
tags = "administrator  monitoring"
"#,
        );
        assert_eq!(state.users[0].tags, vec!["administrator", "monitoring"]);
    }

    #[test]
    fn test_tags_normalized_in_plan() {
        let state = parse(
            r#"
[[users]]
name = "admin"
tags = ["administrator monitoring", ""]
"#,
        );
        let plan = state.to_plan().unwrap();
        match &plan.declarations[0] {
            Declaration::Present(desired) => {
                let tags: Vec<_> = desired.tags.iter().map(String::as_str).collect();
                assert_eq!(tags, vec!["administrator", "monitoring"]);
            }
            Declaration::Absent { .. } => panic!("expected present"),
        }
    }

    #[test]
    fn test_password_from_env() {
        let state = parse(
            r#"
[[users]]
name = "svc"
password_env = "RMQ_CONVERGE_TEST_SVC_PASSWORD"
"#,
        );
        // SAFETY: this variable is only used by this test
        unsafe { std::env::set_var("RMQ_CONVERGE_TEST_SVC_PASSWORD", "from-env") };
        let plan = state.to_plan().unwrap();
        unsafe { std::env::remove_var("RMQ_CONVERGE_TEST_SVC_PASSWORD") };

        match &plan.declarations[0] {
            Declaration::Present(desired) => {
                assert_eq!(desired.password.as_ref().unwrap().expose(), "from-env");
            }
            Declaration::Absent { .. } => panic!("expected present"),
        }
    }

    #[test]
    fn test_password_env_missing() {
        let state = parse(
            r#"
[[users]]
name = "svc"
password_env = "RMQ_CONVERGE_TEST_UNSET_PASSWORD"
"#,
        );
        let err = state.to_plan().unwrap_err();
        assert!(err.to_string().contains("RMQ_CONVERGE_TEST_UNSET_PASSWORD"));
    }

    #[test]
    fn test_ctl_config() {
        let state = parse(SAMPLE);
        let config = state.ctl_config();
        assert_eq!(
            config.ctl_path.as_deref(),
            Some(Path::new("/usr/sbin/rabbitmqctl"))
        );
        assert_eq!(config.sudo_path, "sudo");
    }
}
