//! Orchestration runner.
//!
//! Executes a resolved list of scripts under one [`ExecutionContext`] and folds
//! every per-script result into a single [`OrchestrationReport`]. A run moves
//! through `planned -> (validating) -> executing -> completed | aborted`; all
//! counters belong to the run, so a `Runner` can be shared between concurrent
//! runs.
mod exec;

pub use exec::{ProcessExecutor, ProcessOutput, ScriptExecutor, MAX_SCRIPT_OUTPUT_BYTES};

use crate::context::ExecutionContext;
use crate::locate::ScriptRecord;
use crate::prereqs::DependencyValidator;
use crate::sequence::ScriptId;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

/// Cooperative stop signal checked before each dispatch.
///
/// Cancelling never interrupts scripts already running.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Planned,
    Validating,
    Executing,
    Completed,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planned => "planned",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted,
}

/// Result of one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub id: ScriptId,
    pub file_name: String,
    /// `None` for dry runs, launch failures, and signal terminations.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub duration_ms: u128,
}

impl ExecutionOutcome {
    fn skipped(record: &ScriptRecord) -> Self {
        Self {
            id: record.id,
            file_name: record.file_name.clone(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            success: true,
            duration_ms: 0,
        }
    }
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationReport {
    pub status: RunStatus,
    pub success: bool,
    pub dry_run: bool,
    pub cancelled: bool,
    /// Identifiers the caller asked for.
    pub requested_scripts: usize,
    /// Successful scripts (dry-run no-ops included).
    pub executed_scripts: usize,
    pub failed_scripts: usize,
    pub missing_scripts: Vec<ScriptId>,
    pub warnings: Vec<String>,
    pub validation_errors: Vec<String>,
    /// Per-script outcomes in sequence order.
    pub outcomes: Vec<ExecutionOutcome>,
}

impl OrchestrationReport {
    fn planned(requested: usize, dry_run: bool) -> Self {
        Self {
            status: RunStatus::Completed,
            success: true,
            dry_run,
            cancelled: false,
            requested_scripts: requested,
            executed_scripts: 0,
            failed_scripts: 0,
            missing_scripts: Vec::new(),
            warnings: Vec::new(),
            validation_errors: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} succeeded, {} failed",
            self.executed_scripts, self.failed_scripts
        );
        if !self.missing_scripts.is_empty() {
            line.push_str(&format!(", {} missing", self.missing_scripts.len()));
        }
        if self.dry_run {
            line.push_str(" (dry run)");
        }
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        if !self.validation_errors.is_empty() {
            line.push_str(&format!(
                "; aborted: {} validation error(s)",
                self.validation_errors.len()
            ));
        }
        line
    }
}

/// Runs scripts through a [`ScriptExecutor`].
pub struct Runner<'a> {
    executor: &'a dyn ScriptExecutor,
    validator: Option<&'a dyn DependencyValidator>,
    cancel: CancellationToken,
}

impl<'a> Runner<'a> {
    pub fn new(executor: &'a dyn ScriptExecutor) -> Self {
        Self {
            executor,
            validator: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Validate every script before executing any of them.
    pub fn with_validator(mut self, validator: &'a dyn DependencyValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self, records: &[ScriptRecord], ctx: &ExecutionContext) -> OrchestrationReport {
        let mut report = OrchestrationReport::planned(records.len(), ctx.dry_run);
        enter(RunPhase::Planned, records.len());
        if records.is_empty() {
            enter(RunPhase::Completed, 0);
            return report;
        }

        if let Some(validator) = self.validator {
            enter(RunPhase::Validating, records.len());
            report.validation_errors = validate_all(validator, records);
            if !report.validation_errors.is_empty() {
                tracing::error!(
                    errors = report.validation_errors.len(),
                    "validation failed; no scripts were run"
                );
                report.status = RunStatus::Aborted;
                report.success = false;
                enter(RunPhase::Aborted, records.len());
                return report;
            }
        }

        enter(RunPhase::Executing, records.len());
        let outcomes = if ctx.parallel && !ctx.dry_run {
            self.run_parallel(records, ctx)
        } else {
            self.run_sequential(records, ctx)
        };

        let dispatched = outcomes.len();
        report.cancelled = dispatched < records.len() && self.cancel.is_cancelled();
        report.executed_scripts = outcomes.iter().filter(|outcome| outcome.success).count();
        report.failed_scripts = dispatched - report.executed_scripts;
        report.outcomes = outcomes;
        report.success = report.failed_scripts == 0 && !report.cancelled;
        if dispatched < records.len() {
            report.status = RunStatus::Aborted;
            enter(RunPhase::Aborted, dispatched);
        } else {
            enter(RunPhase::Completed, dispatched);
        }
        report
    }

    fn run_sequential(
        &self,
        records: &[ScriptRecord],
        ctx: &ExecutionContext,
    ) -> Vec<ExecutionOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if self.cancel.is_cancelled() {
                tracing::warn!(remaining = records.len() - outcomes.len(), "run cancelled");
                break;
            }
            let outcome = self.invoke(record, ctx);
            let failed = !outcome.success;
            outcomes.push(outcome);
            if failed && ctx.stop_on_failure {
                tracing::warn!(script = %record.file_name, "stopping after failure");
                break;
            }
        }
        outcomes
    }

    fn run_parallel(&self, records: &[ScriptRecord], ctx: &ExecutionContext) -> Vec<ExecutionOutcome> {
        let workers = ctx.worker_count(records.len());
        tracing::debug!(workers, scripts = records.len(), "starting worker pool");

        // Indices are claimed in order, so dispatch follows sequence order even
        // though completion order does not.
        let cursor = AtomicUsize::new(0);
        let halted = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<(usize, ExecutionOutcome)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                let halted = &halted;
                scope.spawn(move || loop {
                    if halted.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(record) = records.get(index) else {
                        break;
                    };
                    let outcome = self.invoke(record, ctx);
                    if !outcome.success && ctx.stop_on_failure {
                        tracing::warn!(script = %record.file_name, "halting dispatch after failure");
                        halted.store(true, Ordering::SeqCst);
                    }
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<ExecutionOutcome>> = records.iter().map(|_| None).collect();
        for (index, outcome) in rx {
            slots[index] = Some(outcome);
        }
        if self.cancel.is_cancelled() {
            let remaining = slots.iter().filter(|slot| slot.is_none()).count();
            if remaining > 0 {
                tracing::warn!(remaining, "run cancelled");
            }
        }
        slots.into_iter().flatten().collect()
    }

    fn invoke(&self, record: &ScriptRecord, ctx: &ExecutionContext) -> ExecutionOutcome {
        if ctx.dry_run {
            tracing::info!(script = %record.file_name, "dry run: would execute");
            return ExecutionOutcome::skipped(record);
        }

        tracing::info!(script = %record.file_name, "starting script");
        let started = Instant::now();
        let result = self
            .executor
            .execute(&record.path, &ctx.args, &ctx.variables);
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(output) => {
                let success = output.exit_code == Some(0);
                if success {
                    tracing::info!(
                        script = %record.file_name,
                        duration_ms,
                        outcome = "success",
                        "script finished"
                    );
                } else {
                    tracing::error!(
                        script = %record.file_name,
                        exit_code = ?output.exit_code,
                        duration_ms,
                        "script failed"
                    );
                }
                ExecutionOutcome {
                    id: record.id,
                    file_name: record.file_name.clone(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    success,
                    duration_ms,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(script = %record.file_name, error = %message, "script could not be launched");
                ExecutionOutcome {
                    id: record.id,
                    file_name: record.file_name.clone(),
                    exit_code: None,
                    stdout: String::new(),
                    stderr: message,
                    success: false,
                    duration_ms,
                }
            }
        }
    }
}

fn validate_all(validator: &dyn DependencyValidator, records: &[ScriptRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|record| {
            validator
                .validate(record)
                .into_iter()
                .map(move |reason| format!("{}: {reason}", record.file_name))
        })
        .collect()
}

fn enter(phase: RunPhase, scripts: usize) {
    tracing::debug!(phase = %phase, scripts, "run phase");
}
