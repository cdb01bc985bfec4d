//! # rabbitkit
//!
//! RabbitMQ user management through `rabbitmqctl`.
//!
//! This crate provides:
//! - A [`declarative::ResourceBackend`] for RabbitMQ users, tags and
//!   per-vhost permissions
//! - Parsers for `rabbitmqctl` listing output
//! - Error categorization from `rabbitmqctl` stderr
//!
//! ## Example
//!
//! ```no_run
//! use declarative::{DesiredState, Permissions, ReconcileOptions, Reconciler};
//! use rabbitkit::{CtlConfig, RabbitmqctlBackend};
//!
//! let backend = RabbitmqctlBackend::new(CtlConfig::default()).expect("rabbitmqctl not available");
//! let reconciler = Reconciler::new(&backend, ReconcileOptions::apply());
//!
//! let desired = DesiredState::new("monitor")
//!     .with_password("s3cret")
//!     .with_tags(["monitoring"])
//!     .with_perm("/", Permissions::new("", "", ".*"));
//! let result = reconciler.present(&desired);
//! println!("{}: {}", result.name, result.comment);
//! ```
//!
//! ## Running as the broker user
//!
//! `rabbitmqctl` has to authenticate to the node with the Erlang cookie of
//! the broker's OS user. Set [`declarative::ExecContext::runas`] and every
//! command goes through `sudo -n -u <runas>`.

pub mod backend;
pub mod error;
pub mod parse;
pub mod types;

pub use backend::{RabbitmqctlBackend, Runner, SystemRunner, default_backend};
pub use error::{Error, ErrorCategory, Result};
pub use types::{CommandOutput, CtlConfig};
