//! Command execution behind the rabbitmqctl backend.
//!
//! The [`Runner`] trait is the seam between building rabbitmqctl
//! invocations and actually spawning processes, allowing for:
//! - Real execution via [`SystemRunner`]
//! - Scripted runners for testing

pub mod rabbitmqctl;

use crate::error::{Error, Result};
use crate::types::{CommandOutput, CtlConfig};
use std::process::Command;

pub use rabbitmqctl::RabbitmqctlBackend;

/// Runs a program to completion and captures its output.
pub trait Runner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .env("LC_ALL", "C.UTF-8")
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {program}"),
                stderr: e.to_string(),
            })?;
        Ok(output.into())
    }
}

/// Get the default backend (real rabbitmqctl).
pub fn default_backend(config: CtlConfig) -> Result<RabbitmqctlBackend<SystemRunner>> {
    RabbitmqctlBackend::new(config)
}
