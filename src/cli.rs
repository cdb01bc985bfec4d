use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rmq-converge")]
#[command(version)]
#[command(about = "Converge RabbitMQ users to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make RabbitMQ users match the state file
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Plan(PlanArgs),

    /// Check the state file without contacting the broker
    Validate {
        /// State file (default: <config dir>/users.toml)
        file: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Plan
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    /// State file (default: <config dir>/users.toml)
    pub file: Option<PathBuf>,

    /// Only report what would change
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of users to reconcile in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Limit to a target: present, absent, present.<name> or a name fragment.
    /// A user named "present" or "absent" is selected with <kind>.<name>
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// State file (default: <config dir>/users.toml)
    pub file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Limit to a target: present, absent, present.<name> or a name fragment.
    /// A user named "present" or "absent" is selected with <kind>.<name>
    #[arg(short, long)]
    pub target: Option<String>,
}
