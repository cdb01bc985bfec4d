//! `apply` and `plan`: converge RabbitMQ users to the state file
//!
//! Both load the state file, build a plan, optionally narrow it with
//! `--target`, and run it through the declarative executor against
//! rabbitmqctl. `plan` is `apply --dry-run` that never prompts.

use anyhow::{Context as AnyhowContext, Result, bail};
use declarative::{
    ExecuteOptions, ExecutionPlan, ResourceBackend, RunReport, apply_previewed, execute,
};
use std::path::Path;

use crate::Context;
use crate::cli::{ApplyArgs, PlanArgs};
use crate::config::StateFile;
use crate::paths;
use crate::ui::{self, PromptConfirm, TerminalProgress};

/// How a run should behave, after flag parsing
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub yes: bool,
    pub jobs: usize,
    pub json: bool,
    pub target: Option<String>,
}

impl From<ApplyArgs> for RunOptions {
    fn from(args: ApplyArgs) -> Self {
        Self {
            dry_run: args.dry_run,
            yes: args.yes,
            jobs: usize::from(args.jobs.max(1)),
            json: args.json,
            target: args.target,
        }
    }
}

impl From<PlanArgs> for RunOptions {
    fn from(args: PlanArgs) -> Self {
        Self {
            dry_run: true,
            yes: false,
            jobs: ExecuteOptions::default().jobs,
            json: args.json,
            target: args.target,
        }
    }
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let file = args.file.clone();
    run(ctx, file.as_deref(), &RunOptions::from(args))
}

pub fn plan(ctx: &Context, args: PlanArgs) -> Result<()> {
    let file = args.file.clone();
    run(ctx, file.as_deref(), &RunOptions::from(args))
}

fn run(ctx: &Context, file: Option<&Path>, opts: &RunOptions) -> Result<()> {
    let path = paths::state_file(file)?;
    let state = StateFile::load(&path)?;
    let plan = build_plan(&state, opts.target.as_deref())?;

    if plan.is_empty() {
        if opts.json {
            println!("{}", serde_json::to_string_pretty(&RunReport::default())?);
        } else if let Some(target) = &opts.target {
            ui::warn(&format!("No users match target '{target}'"));
        } else {
            ui::info(&format!("No users declared in {}", path.display()));
        }
        return Ok(());
    }

    let backend = rabbitkit::default_backend(state.ctl_config()).map_err(|e| {
        anyhow::anyhow!("{e}\n  {}", e.category().advice())
    })?;

    if !opts.json && !ctx.quiet {
        ui::header(if opts.dry_run {
            "Plan"
        } else {
            "Converging RabbitMQ users"
        });
        ui::dim(&path.display().to_string());
    }

    let report = converge(&plan, &backend, opts, ctx.verbose > 0)?;
    report_and_check(&report, opts)
}

/// Plan for the state file, narrowed to `target`
pub fn build_plan(state: &StateFile, target: Option<&str>) -> Result<ExecutionPlan> {
    let plan = state.to_plan()?;
    plan.validate()?;
    Ok(plan.filter_by_target(target))
}

/// Run a plan against a backend
///
/// Interactive runs print the dry-run preview before asking, so the
/// question is only asked with the pending changes on screen. That preview
/// is handed to the executor rather than computed a second time.
pub fn converge<B>(
    plan: &ExecutionPlan,
    backend: &B,
    opts: &RunOptions,
    verbose: bool,
) -> Result<RunReport>
where
    B: ResourceBackend + ?Sized,
{
    let exec_opts = ExecuteOptions {
        dry_run: opts.dry_run,
        jobs: opts.jobs.max(1),
    };
    let mut progress = TerminalProgress {
        verbose,
        silent: opts.json,
    };
    let mut confirm = PromptConfirm {
        assume_yes: opts.yes,
    };

    let interactive = !opts.dry_run && !opts.yes && !opts.json;
    if interactive {
        let preview_opts = ExecuteOptions {
            dry_run: true,
            ..exec_opts.clone()
        };
        let preview = execute(plan, backend, &preview_opts, &mut progress, &mut confirm)
            .context("Failed to compute changes")?;
        if preview.summary.pending == 0 {
            return Ok(preview);
        }
        println!();
        return apply_previewed(
            plan,
            backend,
            &exec_opts,
            preview.results,
            &mut progress,
            &mut confirm,
        );
    }

    execute(plan, backend, &exec_opts, &mut progress, &mut confirm)
}

/// Print the report and turn failures into a non-zero exit
fn report_and_check(report: &RunReport, opts: &RunOptions) -> Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        ui::print_summary(&report.summary, report.applied);
        if report.summary.skipped > 0 {
            ui::warn("Changes were not applied");
        } else if report.applied && report.is_success() {
            ui::success(&format!("{} user(s) changed", report.summary.changed));
        }
    }

    if !report.is_success() {
        for failed in report.results.iter().filter(|r| r.is_failure()) {
            if !opts.json {
                ui::error(&format!("{}: {}", failed.name, failed.comment));
            }
        }
        bail!("{} user(s) failed", report.summary.failed);
    }
    Ok(())
}
