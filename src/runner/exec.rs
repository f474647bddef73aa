use crate::context::Variables;
use crate::util::output_text;
use anyhow::{anyhow, Context, Result};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Per-stream cap on captured script output.
pub const MAX_SCRIPT_OUTPUT_BYTES: usize = 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for output after killing a timed out script; grandchildren
/// may still hold the pipes open.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Raw result of one script invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal or killed.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Launches one script and reports what it did.
///
/// An `Err` means the script could not be launched at all; a script that ran
/// and failed is an `Ok` with a non-zero exit code.
pub trait ScriptExecutor: Sync {
    fn execute(&self, path: &Path, args: &[String], variables: &Variables) -> Result<ProcessOutput>;
}

/// Runs scripts as child processes, choosing an interpreter by extension.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill scripts that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ScriptExecutor for ProcessExecutor {
    fn execute(&self, path: &Path, args: &[String], variables: &Variables) -> Result<ProcessOutput> {
        // The child runs from the script's directory.
        let path = std::path::absolute(path)
            .with_context(|| format!("resolve script path {}", path.display()))?;
        let path = path.as_path();
        let mut cmd = script_command(path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            cmd.current_dir(parent);
        }
        for (name, value) in variables {
            cmd.env(name, value.to_string());
        }
        cmd.env("SEQRUN_SCRIPT_PATH", path);

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", path.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout pipe unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr pipe unavailable"))?;
        // Drain both pipes concurrently so a chatty script cannot block on a
        // full pipe while we wait for it.
        let stdout_reader = spawn_reader(stdout);
        let stderr_reader = spawn_reader(stderr);

        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait().context("check script status")? {
                break status;
            }
            if self.timeout.is_some_and(|timeout| start.elapsed() > timeout) {
                timed_out = true;
                let _ = child.kill();
                break child.wait().context("reap timed out script")?;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout_bytes = collect_output(&stdout_reader, timed_out);
        let stderr_bytes = collect_output(&stderr_reader, timed_out);
        let mut stderr = output_text(&stderr_bytes, MAX_SCRIPT_OUTPUT_BYTES);
        if let Some(timeout) = self.timeout.filter(|_| timed_out) {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("timed out after {timeout:?}"));
        }

        Ok(ProcessOutput {
            exit_code: if timed_out { None } else { status.code() },
            stdout: output_text(&stdout_bytes, MAX_SCRIPT_OUTPUT_BYTES),
            stderr,
        })
    }
}

fn script_command(path: &Path) -> Command {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let interpreter: &[&str] = match extension.as_str() {
        "sh" => &["sh"],
        "bash" => &["bash"],
        "py" => &["python3"],
        "ps1" => &["pwsh", "-NoProfile", "-NonInteractive", "-File"],
        "rb" => &["ruby"],
        "pl" => &["perl"],
        _ => &[],
    };
    match interpreter.split_first() {
        Some((program, rest)) => {
            let mut cmd = Command::new(program);
            cmd.args(rest).arg(path);
            cmd
        }
        None => Command::new(path),
    }
}

/// Keeps at most `MAX_SCRIPT_OUTPUT_BYTES` of `stream`; the remainder is
/// drained and dropped.
fn spawn_reader(mut stream: impl Read + Send + 'static) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = stream
            .by_ref()
            .take(MAX_SCRIPT_OUTPUT_BYTES as u64)
            .read_to_end(&mut bytes);
        let _ = io::copy(&mut stream, &mut io::sink());
        let _ = tx.send(bytes);
    });
    rx
}

fn collect_output(reader: &mpsc::Receiver<Vec<u8>>, timed_out: bool) -> Vec<u8> {
    if timed_out {
        reader.recv_timeout(KILL_GRACE).unwrap_or_default()
    } else {
        reader.recv().unwrap_or_default()
    }
}
