//! Numbered-script orchestration.
//!
//! Scripts are files named `<id>_<name>` whose zero-padded numeric prefix
//! orders them. A sequence specification (`0400-0402,0404`) selects which ones
//! to run; a playbook stores a specification together with default variables.
//! The runner executes the selection sequentially or with bounded parallelism
//! and reports every outcome in sequence order.
pub mod config;
pub mod context;
pub mod locate;
pub mod orchestrate;
pub mod playbook;
pub mod prereqs;
pub mod runner;
pub mod sequence;
pub mod util;

pub use context::{ExecutionContext, VarValue, Variables};
pub use locate::{find_scripts, Discovery, ScriptRecord};
pub use orchestrate::{orchestrate, Collaborators, RunRequest, RunTarget};
pub use playbook::{Playbook, PlaybookError, PlaybookStore, SequenceSource};
pub use prereqs::{DependencyValidator, HeaderValidator};
pub use runner::{
    CancellationToken, ExecutionOutcome, OrchestrationReport, ProcessExecutor, Runner,
    ScriptExecutor,
};
pub use sequence::{expand_sequence, ScriptId, SequenceError};
