//! Core types for driving rabbitmqctl.

use std::path::PathBuf;
use std::process::Output;

/// Output from a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            success: true,
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: &str) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            success: false,
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Error text, preferring stderr; older releases print errors on stdout
    pub fn error_text(&self) -> String {
        let stderr = self.stderr_str();
        if stderr.trim().is_empty() {
            self.stdout_str()
        } else {
            stderr
        }
    }
}

/// Where to find rabbitmqctl and how to elevate
#[derive(Debug, Clone)]
pub struct CtlConfig {
    /// Explicit path to rabbitmqctl; searched for when `None`
    pub ctl_path: Option<PathBuf>,
    /// Program used to run commands as another user (`runas`)
    pub sudo_path: String,
}

impl Default for CtlConfig {
    fn default() -> Self {
        Self {
            ctl_path: None,
            sudo_path: "sudo".to_string(),
        }
    }
}
