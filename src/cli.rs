//! CLI argument parsing.
//!
//! The CLI is thin: every command maps onto one library operation and prints
//! its result, either as text or as JSON.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "seqrun",
    version,
    about = "Run numbered automation scripts by sequence or playbook",
    after_help = "Examples:\n  seqrun expand 0400-0402,0404\n  seqrun find 0400-0410 --scripts-root ./scripts\n  seqrun run --sequence 0400-0402 --var env=staging --validate\n  seqrun run --playbook deploy --parallel --max-concurrency 4\n  seqrun playbook save deploy --sequence 0400-0402,0404 --var env=staging\n  seqrun playbook list",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Emit debug logging on stderr (overrides SEQRUN_LOG)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Expand(ExpandArgs),
    Find(FindArgs),
    Run(RunArgs),
    #[command(subcommand)]
    Playbook(PlaybookCommand),
}

/// Root overrides shared by commands that touch the filesystem.
#[derive(Args, Debug, Clone, Default)]
pub struct RootOverrides {
    /// Directory searched recursively for scripts (default: SEQRUN_SCRIPTS_ROOT or cwd)
    #[arg(long, value_name = "DIR")]
    pub scripts_root: Option<PathBuf>,

    /// Directory holding playbook documents (default: SEQRUN_PLAYBOOKS_ROOT or the user data dir)
    #[arg(long, value_name = "DIR")]
    pub playbooks_root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Expand a sequence specification into script identifiers")]
pub struct ExpandArgs {
    /// Sequence specification, e.g. 0400-0402,0404
    #[arg(value_name = "SPEC")]
    pub spec: String,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Resolve a sequence specification to script files")]
pub struct FindArgs {
    /// Sequence specification, e.g. 0400-0402,0404
    #[arg(value_name = "SPEC")]
    pub spec: String,

    #[command(flatten)]
    pub roots: RootOverrides,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Run a sequence or playbook and report the outcome")]
pub struct RunArgs {
    /// Sequence specification to run
    #[arg(long, value_name = "SPEC", conflicts_with = "playbook", required_unless_present = "playbook")]
    pub sequence: Option<String>,

    /// Stored playbook to run
    #[arg(long, value_name = "NAME")]
    pub playbook: Option<String>,

    /// Variable passed to every script (repeatable); overrides playbook defaults
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Plan and report without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Run scripts concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Maximum scripts in flight with --parallel; 0 or less means unbounded
    #[arg(long, value_name = "N", default_value_t = 0, allow_negative_numbers = true)]
    pub max_concurrency: i64,

    /// Check script prerequisites before running anything
    #[arg(long)]
    pub validate: bool,

    /// Stop dispatching scripts after the first failure
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Kill any script running longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    #[command(flatten)]
    pub roots: RootOverrides,

    /// Emit the full report as JSON
    #[arg(long)]
    pub json: bool,

    /// Extra arguments forwarded to every script
    #[arg(last = true, value_name = "ARGS")]
    pub script_args: Vec<String>,
}

/// Playbook management commands.
#[derive(Subcommand, Debug)]
pub enum PlaybookCommand {
    Save(PlaybookSaveArgs),
    /// Print a stored playbook as JSON
    Show(PlaybookNameArgs),
    List(PlaybookListArgs),
    /// Delete a stored playbook
    Remove(PlaybookNameArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Save a named playbook")]
pub struct PlaybookSaveArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Sequence specification the playbook runs
    #[arg(long, value_name = "SPEC")]
    pub sequence: String,

    /// Free-form description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Default variable (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Replace an existing playbook of the same name
    #[arg(long)]
    pub force: bool,

    /// Directory holding playbook documents
    #[arg(long, value_name = "DIR")]
    pub playbooks_root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct PlaybookNameArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Directory holding playbook documents
    #[arg(long, value_name = "DIR")]
    pub playbooks_root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "List stored playbooks")]
pub struct PlaybookListArgs {
    /// Directory holding playbook documents
    #[arg(long, value_name = "DIR")]
    pub playbooks_root: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn run_requires_exactly_one_target() {
        assert!(RootArgs::try_parse_from(["seqrun", "run"]).is_err());
        assert!(RootArgs::try_parse_from([
            "seqrun", "run", "--sequence", "1", "--playbook", "p"
        ])
        .is_err());
        let args = RootArgs::try_parse_from([
            "seqrun",
            "run",
            "--playbook",
            "deploy",
            "--max-concurrency",
            "-1",
            "--",
            "--flag",
        ])
        .expect("parse");
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.playbook.as_deref(), Some("deploy"));
        assert_eq!(run.max_concurrency, -1);
        assert_eq!(run.script_args, vec!["--flag".to_string()]);
    }
}
