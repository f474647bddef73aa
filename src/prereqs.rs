//! Pre-flight dependency checks for scripts.
//!
//! Scripts declare what they need in comment directives near the top of the
//! file:
//!
//! ```text
//! # requires: git docker
//! # requires-path: /etc/hosts "/opt/my tool/bin"
//! # requires-env: DEPLOY_TOKEN
//! ```
//!
//! Checks are static: the script is read, never executed.
use crate::locate::ScriptRecord;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Number of leading lines scanned for directives.
pub const HEADER_SCAN_LINES: usize = 64;

/// A single precondition declared by a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prerequisite {
    Command(String),
    Path(PathBuf),
    EnvVar(String),
}

/// Checks that a script's preconditions hold on this host.
pub trait DependencyValidator: Sync {
    /// Human-readable reasons the script cannot run; empty when valid.
    fn validate(&self, record: &ScriptRecord) -> Vec<String>;

    fn is_valid(&self, record: &ScriptRecord) -> bool {
        self.validate(record).is_empty()
    }
}

/// Validator driven by `requires*` comment directives.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderValidator;

impl DependencyValidator for HeaderValidator {
    fn validate(&self, record: &ScriptRecord) -> Vec<String> {
        let prereqs = match read_prerequisites(&record.path) {
            Ok(prereqs) => prereqs,
            Err(err) => return vec![err],
        };
        let reasons: Vec<String> = prereqs.iter().filter_map(check_prerequisite).collect();
        if reasons.is_empty() {
            tracing::debug!(script = %record.file_name, checked = prereqs.len(), "prerequisites satisfied");
        } else {
            tracing::warn!(script = %record.file_name, failures = reasons.len(), "prerequisites missing");
        }
        reasons
    }
}

/// Parse the directives declared in the header of `path`.
pub fn read_prerequisites(path: &Path) -> Result<Vec<Prerequisite>, String> {
    let file = File::open(path).map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    let mut prereqs = Vec::new();
    for line in BufReader::new(file).lines().take(HEADER_SCAN_LINES) {
        // Binary or non-UTF-8 content ends the header.
        let Ok(line) = line else {
            break;
        };
        prereqs.extend(parse_directive(&line)?);
    }
    Ok(prereqs)
}

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:#|//|--|;|rem\b|::)\s*requires(-path|-env)?\s*:\s*(.*)$")
            .expect("regex for requires directives")
    })
}

fn parse_directive(line: &str) -> Result<Vec<Prerequisite>, String> {
    let Some(caps) = directive_regex().captures(line) else {
        return Ok(Vec::new());
    };
    let kind = caps
        .get(1)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let raw = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let values = shell_words::split(raw)
        .map_err(|err| format!("malformed directive {:?}: {err}", line.trim()))?;
    Ok(values
        .into_iter()
        .map(|value| match kind.as_str() {
            "-path" => Prerequisite::Path(PathBuf::from(value)),
            "-env" => Prerequisite::EnvVar(value),
            _ => Prerequisite::Command(value),
        })
        .collect())
}

fn check_prerequisite(prereq: &Prerequisite) -> Option<String> {
    match prereq {
        Prerequisite::Command(name) => which::which(name)
            .err()
            .map(|_| format!("required command not found: {name}")),
        Prerequisite::Path(path) => {
            (!path.exists()).then(|| format!("required path not found: {}", path.display()))
        }
        Prerequisite::EnvVar(name) => std::env::var_os(name)
            .is_none()
            .then(|| format!("required environment variable not set: {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::ScriptId;
    use std::fs;

    fn record_with(dir: &Path, contents: &str) -> ScriptRecord {
        let path = dir.join("0400_check.sh");
        fs::write(&path, contents).expect("write script");
        ScriptRecord {
            id: ScriptId::new(400, 4),
            file_name: "0400_check.sh".to_string(),
            path,
        }
    }

    #[test]
    fn parses_all_directive_kinds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = record_with(
            temp.path(),
            "#!/bin/sh\n# requires: git docker\n# Requires-Path: \"/opt/my tool\"\n// requires-env: TOKEN\necho hi\n",
        );
        let prereqs = read_prerequisites(&record.path).expect("parse");
        assert_eq!(
            prereqs,
            vec![
                Prerequisite::Command("git".to_string()),
                Prerequisite::Command("docker".to_string()),
                Prerequisite::Path(PathBuf::from("/opt/my tool")),
                Prerequisite::EnvVar("TOKEN".to_string()),
            ]
        );
    }

    #[test]
    fn batch_style_comments_are_recognised() {
        assert_eq!(
            parse_directive("REM requires: choco").expect("parse"),
            vec![Prerequisite::Command("choco".to_string())]
        );
        assert_eq!(
            parse_directive(":: requires-env: PATH").expect("parse"),
            vec![Prerequisite::EnvVar("PATH".to_string())]
        );
        assert!(parse_directive("echo requires: nothing").expect("parse").is_empty());
    }

    #[test]
    fn script_without_directives_is_valid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = record_with(temp.path(), "#!/bin/sh\necho hi\n");
        assert!(HeaderValidator.is_valid(&record));
    }

    #[test]
    fn reports_every_missing_prerequisite() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing_dir = temp.path().join("absent");
        let record = record_with(
            temp.path(),
            &format!(
                "# requires: seqrun-definitely-missing-tool\n# requires-path: {}\n# requires-env: SEQRUN_TEST_UNSET_VARIABLE\n",
                missing_dir.display()
            ),
        );
        let reasons = HeaderValidator.validate(&record);
        assert_eq!(reasons.len(), 3, "{reasons:?}");
        assert!(reasons[0].contains("seqrun-definitely-missing-tool"));
        assert!(reasons[1].contains("absent"));
        assert!(reasons[2].contains("SEQRUN_TEST_UNSET_VARIABLE"));
    }

    #[test]
    fn existing_path_satisfies_requirement() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = record_with(
            temp.path(),
            &format!("# requires-path: {}\n", temp.path().display()),
        );
        assert!(HeaderValidator.is_valid(&record));
    }

    #[test]
    fn unreadable_script_is_a_reason_not_a_panic() {
        let record = ScriptRecord {
            id: ScriptId::new(1, 4),
            file_name: "0001_gone.sh".to_string(),
            path: PathBuf::from("/nonexistent/0001_gone.sh"),
        };
        let reasons = HeaderValidator.validate(&record);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("cannot read"));
    }
}
