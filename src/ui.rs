use colored::Colorize;
use declarative::{
    Change, ChangeValue, ConfirmCallback, Outcome, ProgressCallback, ReconcileResult, RunSummary,
};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

// ============================================================================
// Results
// ============================================================================

/// Symbol for a result line
fn marker(result: &ReconcileResult) -> colored::ColoredString {
    match result.result {
        Outcome::Failure => "✗".red(),
        Outcome::Pending => "~".yellow(),
        Outcome::Success if result.has_changes() => "✓".green(),
        Outcome::Success => "·".dimmed(),
    }
}

fn format_value(value: &ChangeValue) -> String {
    match value {
        ChangeValue::Text(text) if text.is_empty() => "-".to_string(),
        ChangeValue::Text(text) => text.clone(),
        ChangeValue::Tags(tags) => format!("[{}]", tags.join(", ")),
        ChangeValue::Perms(perms) if perms.is_empty() => "{}".to_string(),
        ChangeValue::Perms(perms) => perms
            .iter()
            .map(|(scope, p)| format!("{scope}: {p}"))
            .collect::<Vec<_>>()
            .join("; "),
    }
}

fn print_change(attribute: &str, change: &Change) {
    println!(
        "      {} {} {} {}",
        format!("{attribute}:").dimmed(),
        format_value(&change.old).red(),
        "→".dimmed(),
        format_value(&change.new).green()
    );
}

/// Print one result with its changes
pub fn print_result(result: &ReconcileResult, verbose: bool) {
    if result.result == Outcome::Success && !result.has_changes() && !verbose {
        return;
    }
    println!("  {} {}", marker(result), result.comment);
    for (attribute, change) in &result.changes {
        print_change(attribute, change);
    }
}

/// Print run totals
pub fn print_summary(summary: &RunSummary, applied: bool) {
    println!();
    if !summary.is_success() {
        println!("  {} Completed with errors", "⚠".yellow().bold());
    } else if applied {
        println!("  {} Users converged", "✓".green().bold());
    } else if summary.pending > 0 {
        println!("  {} Changes pending", "~".yellow().bold());
    } else {
        println!("  {} Everything up to date", "✓".green().bold());
    }

    if summary.changed > 0 {
        println!("    • {} changed", summary.changed);
    }
    if summary.pending > 0 {
        println!("    • {} pending", summary.pending);
    }
    if summary.unchanged > 0 {
        println!("    • {} unchanged", summary.unchanged);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Prints each result as it completes
pub struct TerminalProgress {
    /// Also print users that are already converged
    pub verbose: bool,
    /// Print nothing (JSON output)
    pub silent: bool,
}

impl ProgressCallback for TerminalProgress {
    fn on_batch_start(&mut self, count: usize) {
        log::info!("Reconciling {count} user(s)");
    }

    fn on_resource_start(&mut self, name: &str, description: &str) {
        log::debug!("{name}: {description}");
    }

    fn on_resource_complete(&mut self, _name: &str, result: &ReconcileResult) {
        if !self.silent {
            print_result(result, self.verbose);
        }
    }

    fn on_batch_complete(&mut self) {}
}

/// Asks on the terminal, unless `--yes` was given
pub struct PromptConfirm {
    pub assume_yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        use dialoguer::Confirm;

        if self.assume_yes {
            log::debug!("{prompt} yes (--yes)");
            return Ok(true);
        }

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}
