//! End-to-end run: resolve what to run, find it, then hand it to the runner.
use crate::context::ExecutionContext;
use crate::locate::find_scripts;
use crate::playbook::PlaybookStore;
use crate::prereqs::DependencyValidator;
use crate::runner::{CancellationToken, OrchestrationReport, Runner, ScriptExecutor};
use crate::sequence::{expand_sequence, ScriptId};
use anyhow::{Context, Result};
use std::path::Path;

/// What a run should execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// Ad-hoc sequence specification.
    Sequence(String),
    /// Name of a stored playbook.
    Playbook(String),
}

pub struct RunRequest<'a> {
    pub target: RunTarget,
    pub scripts_root: &'a Path,
    pub store: &'a PlaybookStore,
    /// Caller settings; variables here override playbook defaults.
    pub context: ExecutionContext,
    pub validate_first: bool,
}

pub struct Collaborators<'a> {
    pub executor: &'a dyn ScriptExecutor,
    pub validator: &'a dyn DependencyValidator,
    pub cancel: CancellationToken,
}

/// Parse and not-found failures return `Err` before anything runs; everything
/// after that is reported in the returned report.
pub fn orchestrate(
    request: RunRequest<'_>,
    collaborators: Collaborators<'_>,
) -> Result<OrchestrationReport> {
    let RunRequest {
        target,
        scripts_root,
        store,
        mut context,
        validate_first,
    } = request;

    let ids = match &target {
        RunTarget::Sequence(spec) => {
            expand_sequence(spec).with_context(|| format!("expand sequence {spec:?}"))?
        }
        RunTarget::Playbook(name) => {
            let playbook = store.load(name)?;
            let ids = playbook
                .sequence
                .expand()
                .with_context(|| format!("expand sequence of playbook {name:?}"))?;
            let mut variables = playbook.variables;
            variables.append(&mut context.variables);
            context.variables = variables;
            ids
        }
    };
    tracing::info!(run_target = ?target, identifiers = ids.len(), "sequence resolved");

    let discovery = find_scripts(scripts_root, &ids)?;
    let mut warnings: Vec<String> = discovery
        .collisions
        .iter()
        .map(|collision| collision.describe())
        .collect();
    if !discovery.missing.is_empty() {
        let missing = join_ids(&discovery.missing);
        tracing::warn!(missing = %missing, "some identifiers matched no script");
        warnings.push(format!("no script found for: {missing}"));
    }

    let mut runner = Runner::new(collaborators.executor).with_cancellation(collaborators.cancel);
    if validate_first {
        runner = runner.with_validator(collaborators.validator);
    }
    let mut report = runner.run(&discovery.records, &context);
    report.requested_scripts = ids.len();
    report.missing_scripts = discovery.missing;
    report.warnings = warnings;

    tracing::info!(
        success = report.success,
        executed = report.executed_scripts,
        failed = report.failed_scripts,
        "run finished"
    );
    Ok(report)
}

fn join_ids(ids: &[ScriptId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{VarValue, Variables};
    use crate::playbook::{Playbook, PlaybookError, SequenceSource};
    use crate::prereqs::HeaderValidator;
    use crate::runner::ProcessOutput;
    use crate::sequence::SequenceError;
    use std::fs;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Variables)>>,
    }

    impl ScriptExecutor for Recorder {
        fn execute(&self, path: &Path, _: &[String], variables: &Variables) -> Result<ProcessOutput> {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.calls
                .lock()
                .expect("calls lock")
                .push((name, variables.clone()));
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        scripts: std::path::PathBuf,
        store: PlaybookStore,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let scripts = temp.path().join("scripts");
        for file in files {
            let path = scripts.join(file);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, "#!/bin/sh\n").expect("write");
        }
        fs::create_dir_all(&scripts).expect("mkdir scripts");
        let store = PlaybookStore::new(temp.path().join("playbooks"));
        Fixture {
            _temp: temp,
            scripts,
            store,
        }
    }

    fn collaborators(executor: &Recorder) -> Collaborators<'_> {
        Collaborators {
            executor,
            validator: &HeaderValidator,
            cancel: CancellationToken::new(),
        }
    }

    fn request<'a>(fx: &'a Fixture, target: RunTarget) -> RunRequest<'a> {
        RunRequest {
            target,
            scripts_root: &fx.scripts,
            store: &fx.store,
            context: ExecutionContext::default(),
            validate_first: false,
        }
    }

    #[test]
    fn runs_resolved_scripts_and_reports_missing() {
        let fx = fixture(&["0400_a.sh", "sub/0402_c.sh"]);
        let executor = Recorder::default();
        let report = orchestrate(
            request(&fx, RunTarget::Sequence("0400-0402".to_string())),
            collaborators(&executor),
        )
        .expect("orchestrate");

        assert!(report.success);
        assert_eq!(report.requested_scripts, 3);
        assert_eq!(report.executed_scripts, 2);
        assert_eq!(report.missing_scripts.len(), 1);
        assert_eq!(report.missing_scripts[0].to_string(), "0401");
        assert_eq!(report.warnings.len(), 1);
        let calls = executor.calls.lock().expect("calls lock");
        let names: Vec<&str> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["0400_a.sh", "0402_c.sh"]);
    }

    #[test]
    fn no_matching_scripts_is_a_successful_no_op() {
        let fx = fixture(&[]);
        let executor = Recorder::default();
        let report = orchestrate(
            request(&fx, RunTarget::Sequence("0900".to_string())),
            collaborators(&executor),
        )
        .expect("orchestrate");
        assert!(report.success);
        assert_eq!(report.executed_scripts, 0);
        assert_eq!(report.failed_scripts, 0);
    }

    #[test]
    fn parse_errors_fail_before_execution() {
        let fx = fixture(&["0400_a.sh"]);
        let executor = Recorder::default();
        let err = orchestrate(
            request(&fx, RunTarget::Sequence("0500-0400".to_string())),
            collaborators(&executor),
        )
        .expect_err("reversed range");
        assert!(matches!(
            err.downcast_ref::<SequenceError>(),
            Some(SequenceError::InvalidRange { .. })
        ));
        assert!(executor.calls.lock().expect("calls lock").is_empty());
    }

    #[test]
    fn missing_playbook_is_not_found() {
        let fx = fixture(&[]);
        let executor = Recorder::default();
        let err = orchestrate(
            request(&fx, RunTarget::Playbook("absent".to_string())),
            collaborators(&executor),
        )
        .expect_err("missing playbook");
        assert!(matches!(
            err.downcast_ref::<PlaybookError>(),
            Some(PlaybookError::NotFound(_))
        ));
    }

    #[test]
    fn caller_variables_override_playbook_defaults() {
        let fx = fixture(&["0001_a.sh"]);
        let mut defaults = Variables::new();
        defaults.insert("env".to_string(), VarValue::String("dev".to_string()));
        defaults.insert("retries".to_string(), VarValue::Int(1));
        fx.store
            .save(
                "setup",
                &Playbook::new("setup", SequenceSource::Spec("0001".to_string()), defaults),
                false,
            )
            .expect("save");

        let executor = Recorder::default();
        let mut req = request(&fx, RunTarget::Playbook("setup".to_string()));
        req.context
            .variables
            .insert("env".to_string(), VarValue::String("prod".to_string()));
        let report = orchestrate(req, collaborators(&executor)).expect("orchestrate");
        assert!(report.success);

        let calls = executor.calls.lock().expect("calls lock");
        let vars = &calls[0].1;
        assert_eq!(vars.get("env"), Some(&VarValue::String("prod".to_string())));
        assert_eq!(vars.get("retries"), Some(&VarValue::Int(1)));
    }

    #[test]
    fn validation_runs_only_when_requested() {
        let fx = fixture(&[]);
        fs::write(
            fx.scripts.join("0001_needs.sh"),
            "# requires: seqrun-definitely-missing-tool\n",
        )
        .expect("write");
        let executor = Recorder::default();

        let report = orchestrate(
            request(&fx, RunTarget::Sequence("0001".to_string())),
            collaborators(&executor),
        )
        .expect("orchestrate");
        assert!(report.success);

        let mut req = request(&fx, RunTarget::Sequence("0001".to_string()));
        req.validate_first = true;
        let report = orchestrate(req, collaborators(&executor)).expect("orchestrate");
        assert!(!report.success);
        assert_eq!(report.validation_errors.len(), 1);
        assert_eq!(executor.calls.lock().expect("calls lock").len(), 1);
    }
}
