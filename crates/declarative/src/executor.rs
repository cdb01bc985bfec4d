//! Execution engine - reconciles a plan with preview, confirmation and parallelism

use crate::backend::ResourceBackend;
use crate::context::{ConfirmCallback, NoProgress, ProgressCallback, ReconcileOptions};
use crate::planner::ExecutionPlan;
use crate::reconciler::Reconciler;
use crate::resource::Declaration;
use crate::types::{ExecuteOptions, ReconcileResult, RunSummary};
use anyhow::{Result, bail};
use rayon::prelude::*;
use serde::Serialize;

/// Results of executing a plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// One result per declaration, in plan order
    pub results: Vec<ReconcileResult>,
    pub summary: RunSummary,
    /// Whether changes were applied (false for dry runs and declined runs)
    pub applied: bool,
}

impl RunReport {
    fn new(results: Vec<ReconcileResult>, applied: bool) -> Self {
        let summary = RunSummary::from_results(&results);
        Self {
            results,
            summary,
            applied,
        }
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

/// Execute a plan with the given options and callbacks
///
/// Every declaration is first reconciled in dry-run mode. If that preview
/// finds nothing to change, or `opts.dry_run` is set, the preview is the
/// report. Otherwise `confirm` is asked once, and on approval every
/// declaration is reconciled again for real; each call re-reads the current
/// state, so the preview is only used to decide whether to ask.
///
/// # Type Parameters
/// * `B` - Resource backend type
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
pub fn execute<B, P, C>(
    plan: &ExecutionPlan,
    backend: &B,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<RunReport>
where
    B: ResourceBackend + ?Sized,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    plan.validate()?;

    if plan.is_empty() {
        return Ok(RunReport::new(Vec::new(), false));
    }

    let preview = Reconciler::new(backend, ReconcileOptions::dry_run());
    if opts.dry_run {
        let results = run_batch(&plan.declarations, &preview, opts.jobs, progress)?;
        return Ok(RunReport::new(results, false));
    }

    let previewed = run_batch(&plan.declarations, &preview, opts.jobs, &mut NoProgress)?;
    apply_previewed(plan, backend, opts, previewed, progress, confirm)
}

/// Apply a plan whose dry-run results the caller already has
///
/// `previewed` must hold one result per declaration, as returned by a
/// dry-run [`execute`]. The preview only decides whether to ask; applying
/// still re-reads the current state of every resource.
pub fn apply_previewed<B, P, C>(
    plan: &ExecutionPlan,
    backend: &B,
    opts: &ExecuteOptions,
    previewed: Vec<ReconcileResult>,
    progress: &mut P,
    confirm: &mut C,
) -> Result<RunReport>
where
    B: ResourceBackend + ?Sized,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    plan.validate()?;
    if previewed.len() != plan.len() {
        bail!(
            "Preview has {} result(s) for {} declaration(s)",
            previewed.len(),
            plan.len()
        );
    }

    let pending = previewed.iter().filter(|r| r.is_pending()).count();
    if pending == 0 {
        log::debug!("Nothing to change for {} declaration(s)", plan.len());
        return Ok(RunReport::new(previewed, false));
    }

    if !confirm.confirm("Apply changes?")? {
        let mut report = RunReport::new(previewed, false);
        report.summary.pending -= pending;
        report.summary.skipped += pending;
        return Ok(report);
    }

    let reconciler = Reconciler::new(backend, ReconcileOptions::apply());
    let results = run_batch(&plan.declarations, &reconciler, opts.jobs, progress)?;
    Ok(RunReport::new(results, true))
}

/// Reconcile a batch of declarations, keeping plan order in the output
fn run_batch<B, P>(
    declarations: &[Declaration],
    reconciler: &Reconciler<'_, B>,
    jobs: usize,
    progress: &mut P,
) -> Result<Vec<ReconcileResult>>
where
    B: ResourceBackend + ?Sized,
    P: ProgressCallback,
{
    progress.on_batch_start(declarations.len());

    let results = if jobs <= 1 || declarations.len() == 1 {
        // Sequential execution
        let mut results = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            progress.on_resource_start(declaration.name(), &declaration.description());
            let result = declaration.reconcile(reconciler);
            progress.on_resource_complete(declaration.name(), &result);
            results.push(result);
        }
        results
    } else {
        run_parallel(declarations, reconciler, jobs, progress)?
    };

    progress.on_batch_complete();
    Ok(results)
}

/// Reconcile declarations in parallel using rayon
///
/// Names are unique within a validated plan, so no two threads ever work
/// on the same resource.
fn run_parallel<B, P>(
    declarations: &[Declaration],
    reconciler: &Reconciler<'_, B>,
    jobs: usize,
    progress: &mut P,
) -> Result<Vec<ReconcileResult>>
where
    B: ResourceBackend + ?Sized,
    P: ProgressCallback,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    let results: Vec<ReconcileResult> = pool.install(|| {
        declarations
            .par_iter()
            .map(|declaration| declaration.reconcile(reconciler))
            .collect()
    });

    // The progress callback is not thread-safe, so report after the fact
    for result in &results {
        progress.on_resource_complete(&result.name, result);
    }

    Ok(results)
}

/// Simple execution without callbacks
///
/// Applies without asking; for basic use cases where you don't need
/// progress or confirmation.
pub fn execute_simple<B: ResourceBackend + ?Sized>(
    plan: &ExecutionPlan,
    backend: &B,
    opts: &ExecuteOptions,
) -> Result<RunReport> {
    use crate::context::AutoConfirm;

    execute(plan, backend, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline};
    use crate::memory::{MemoryBackend, MemoryUser, Operation};
    use crate::types::{DesiredState, ExecContext, Outcome, Permissions};

    /// Counts callback invocations
    #[derive(Default)]
    struct Recorder {
        batches: usize,
        completed: Vec<String>,
    }

    impl ProgressCallback for Recorder {
        fn on_batch_start(&mut self, _count: usize) {
            self.batches += 1;
        }
        fn on_resource_start(&mut self, _name: &str, _description: &str) {}
        fn on_resource_complete(&mut self, name: &str, _result: &ReconcileResult) {
            self.completed.push(name.to_string());
        }
        fn on_batch_complete(&mut self) {}
    }

    fn plan() -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        plan.add(Declaration::present(
            DesiredState::new("alice").with_perm("/", Permissions::all()),
        ));
        plan.add(Declaration::present(DesiredState::new("bob")));
        plan.add(Declaration::absent("old", ExecContext::default()));
        plan
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_user("bob", MemoryUser::new())
            .with_user("old", MemoryUser::new())
    }

    #[test]
    fn test_execute_empty_plan() {
        let report =
            execute_simple(&ExecutionPlan::new(), &backend(), &ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary.total(), 0);
        assert!(!report.applied);
    }

    #[test]
    fn test_execute_applies_sequentially() {
        let backend = backend();
        let opts = ExecuteOptions {
            dry_run: false,
            jobs: 1,
        };
        let mut progress = Recorder::default();

        let report = execute(&plan(), &backend, &opts, &mut progress, &mut AutoConfirm).unwrap();

        assert!(report.applied);
        assert!(report.is_success());
        assert_eq!(report.summary.changed, 2);
        assert_eq!(report.summary.unchanged, 1);
        assert!(backend.contains("alice"));
        assert!(!backend.contains("old"));
        assert_eq!(progress.completed, vec!["alice", "bob", "old"]);
        // Preview reports nothing
        assert_eq!(progress.batches, 1);
    }

    #[test]
    fn test_execute_parallel_keeps_plan_order() {
        let backend = backend();
        let opts = ExecuteOptions {
            dry_run: false,
            jobs: 4,
        };

        let report = execute_simple(&plan(), &backend, &opts).unwrap();

        let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "old"]);
        assert_eq!(report.summary.changed, 2);
    }

    #[test]
    fn test_execute_dry_run_reports_pending() {
        let backend = backend();
        let opts = ExecuteOptions {
            dry_run: true,
            jobs: 1,
        };

        let report = execute_simple(&plan(), &backend, &opts).unwrap();

        assert!(!report.applied);
        assert_eq!(report.summary.pending, 2);
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_execute_declined() {
        let backend = backend();
        let report = execute(
            &plan(),
            &backend,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert!(!report.applied);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.pending, 0);
        assert!(backend.mutations().is_empty());
    }

    #[test]
    fn test_execute_converged_skips_confirmation() {
        let backend = backend();
        let mut plan = ExecutionPlan::new();
        plan.add(Declaration::present(DesiredState::new("bob")));

        // Declining would skip; converged plans never ask
        let report = execute(
            &plan,
            &backend,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(report.summary.unchanged, 1);
        assert_eq!(report.summary.skipped, 0);
    }

    #[test]
    fn test_apply_previewed_reuses_preview() {
        let backend = backend();
        let plan = plan();
        let dry_run = ExecuteOptions {
            dry_run: true,
            jobs: 1,
        };

        let preview = execute_simple(&plan, &backend, &dry_run).unwrap();
        let report = apply_previewed(
            &plan,
            &backend,
            &ExecuteOptions::default(),
            preview.results,
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert!(report.applied);
        assert_eq!(report.summary.changed, 2);
        // One dry-run pass and one apply pass
        assert_eq!(backend.count(Operation::Exists), 2 * plan.len());
    }

    #[test]
    fn test_apply_previewed_rejects_mismatched_preview() {
        let err = apply_previewed(
            &plan(),
            &backend(),
            &ExecuteOptions::default(),
            Vec::new(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Preview has 0 result(s)"));
    }

    #[test]
    fn test_execute_rejects_duplicate_names() {
        let mut plan = plan();
        plan.add(Declaration::absent("bob", ExecContext::default()));

        let err = execute_simple(&plan, &backend(), &ExecuteOptions::default()).unwrap_err();
        assert!(err.to_string().contains("bob"));
    }

    #[test]
    fn test_execute_failure_is_reported_not_raised() {
        let backend = backend().fail_on(Operation::Create, "access_refused");

        let report = execute_simple(&plan(), &backend, &ExecuteOptions::default()).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.summary.failed, 1);
        let alice = &report.results[0];
        assert_eq!(alice.result, Outcome::Failure);
        assert_eq!(alice.comment, "Error: access_refused");
    }
}
