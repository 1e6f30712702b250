//! Adapter for command-line detection engines.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use scanward_core::{EngineError, EngineKind, ScanOutcome, ScanTask};

use crate::adapter::EngineAdapter;
use crate::normalize::RawReport;

/// Placeholder replaced by the scanned file's path in [`CommandSpec::args`].
pub const PATH_PLACEHOLDER: &str = "{path}";

/// How often a running engine process is polled for exit.
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Ceiling for availability probes and definition updates.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(600);

/// Description of a command-line engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Display name.
    pub name: String,
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments; `{path}` is substituted, or the path is appended when absent.
    pub args: Vec<String>,
    /// Exit codes meaning "no threat found".
    pub clean_codes: Vec<i32>,
    /// Exit codes meaning "threat found".
    pub infected_codes: Vec<i32>,
    /// Arguments used to probe availability.
    pub version_args: Vec<String>,
    /// Program and arguments refreshing the definitions, if supported.
    pub update_command: Option<Vec<String>>,
}

impl CommandSpec {
    /// ClamAV's `clamscan`, updated through `freshclam`.
    pub fn clamscan() -> Self {
        Self {
            name: "clamscan".to_string(),
            program: PathBuf::from("clamscan"),
            args: vec![
                "--no-summary".to_string(),
                "--stdout".to_string(),
                PATH_PLACEHOLDER.to_string(),
            ],
            clean_codes: vec![0],
            infected_codes: vec![1],
            version_args: vec!["--version".to_string()],
            update_command: Some(vec!["freshclam".to_string()]),
        }
    }

    /// ClamAV's `clamdscan`, talking to a running `clamd` daemon.
    pub fn clamdscan() -> Self {
        Self {
            name: "clamdscan".to_string(),
            program: PathBuf::from("clamdscan"),
            args: vec![
                "--no-summary".to_string(),
                "--fdpass".to_string(),
                PATH_PLACEHOLDER.to_string(),
            ],
            ..Self::clamscan()
        }
    }

    /// Arguments for one file.
    pub fn args_for(&self, task: &ScanTask) -> Vec<String> {
        let path = task.path.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(PATH_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(PATH_PLACEHOLDER, &path)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(path.into_owned());
        }
        args
    }
}

/// Output of a finished engine process.
struct Finished {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Runs a command-line engine once per file.
pub struct CommandAdapter {
    spec: CommandSpec,
    kind: EngineKind,
    timeout: Duration,
}

impl CommandAdapter {
    pub fn new(spec: CommandSpec, kind: EngineKind, timeout: Duration) -> Self {
        Self {
            spec,
            kind,
            timeout,
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Map the exit status when the output itself carried no verdict.
    fn classify_exit(&self, task: &ScanTask, finished: &Finished, elapsed: Duration) -> ScanOutcome {
        match finished.status.code() {
            Some(code) if self.spec.clean_codes.contains(&code) => ScanOutcome::clean(task, elapsed),
            Some(code) if self.spec.infected_codes.contains(&code) => {
                ScanOutcome::infected(task, "Unknown", elapsed)
            }
            code => {
                let reason = finished
                    .stderr
                    .lines()
                    .find(|line| !line.trim().is_empty())
                    .unwrap_or("no diagnostic output");
                let status = code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
                ScanOutcome::error(
                    task,
                    format!("{} exited with {status}: {reason}", self.spec.name),
                    elapsed,
                )
            }
        }
    }
}

impl EngineAdapter for CommandAdapter {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn invoke(
        &self,
        task: &ScanTask,
        token: &CancellationToken,
    ) -> Result<ScanOutcome, EngineError> {
        if token.is_cancelled() {
            return Ok(ScanOutcome::skipped(task, "cancelled"));
        }

        let started = Instant::now();
        let mut command = Command::new(&self.spec.program);
        command.args(self.spec.args_for(task));
        let finished = run_with_timeout(command, &self.spec.name, self.timeout)?.map_err(
            |elapsed| EngineError::Timeout {
                path: task.path.clone(),
                elapsed,
            },
        )?;
        let elapsed = started.elapsed();

        tracing::debug!(
            engine = %self.spec.name,
            path = %task.path.display(),
            code = ?finished.status.code(),
            "engine finished"
        );

        let report = RawReport::parse(&finished.stdout);
        Ok(report
            .into_outcome(task, elapsed)
            .unwrap_or_else(|| self.classify_exit(task, &finished, elapsed)))
    }

    fn update_definitions(&self) -> bool {
        let Some((program, args)) = self
            .spec
            .update_command
            .as_ref()
            .and_then(|cmd| cmd.split_first())
        else {
            return false;
        };

        let mut command = Command::new(program);
        command.args(args);
        match run_with_timeout(command, program, UPDATE_TIMEOUT) {
            Ok(Ok(finished)) if finished.status.success() => true,
            Ok(Ok(finished)) => {
                tracing::warn!(
                    engine = %self.spec.name,
                    code = ?finished.status.code(),
                    "definition update failed"
                );
                false
            }
            Ok(Err(_)) => {
                tracing::warn!(engine = %self.spec.name, "definition update timed out");
                false
            }
            Err(e) => {
                tracing::warn!(engine = %self.spec.name, error = %e, "definition update failed");
                false
            }
        }
    }

    fn is_available(&self) -> bool {
        let mut command = Command::new(&self.spec.program);
        command.args(&self.spec.version_args);
        matches!(
            run_with_timeout(command, &self.spec.name, PROBE_TIMEOUT),
            Ok(Ok(finished)) if finished.status.success()
        )
    }
}

/// Spawn `command` and wait for it, killing it once `timeout` elapses.
///
/// The deadline covers both the process and its output pipes, so a helper
/// that inherits stdout cannot hold the call open after the engine exits.
/// The outer error covers spawn and wait failures; the inner error carries
/// the elapsed time when the process had to be killed.
fn run_with_timeout(
    mut command: Command,
    name: &str,
    timeout: Duration,
) -> Result<Result<Finished, Duration>, EngineError> {
    let started = Instant::now();
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut command, 0);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::unavailable(format!("{name} not found")),
            _ => EngineError::unavailable(format!("cannot start {name}: {e}")),
        })?;

    let (tx, rx) = mpsc::channel();
    drain(Pipe::Stdout, child.stdout.take(), tx.clone());
    drain(Pipe::Stderr, child.stderr.take(), tx);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                kill(&mut child);
                return Ok(Err(started.elapsed()));
            }
            Ok(None) => thread::sleep(WAIT_POLL),
            Err(e) => {
                kill(&mut child);
                return Err(EngineError::Protocol {
                    message: format!("waiting for {name} failed: {e}"),
                });
            }
        }
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    for _ in 0..2 {
        let remaining = timeout.saturating_sub(started.elapsed());
        match rx.recv_timeout(remaining) {
            Ok((Pipe::Stdout, text)) => stdout = text,
            Ok((Pipe::Stderr, text)) => stderr = text,
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!(engine = %name, "output still held open after exit");
                kill_group(child.id());
                return Ok(Err(started.elapsed()));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(Ok(Finished {
        status,
        stdout,
        stderr,
    }))
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

/// Read a child pipe to completion on a helper thread so the child never
/// blocks on a full pipe.
fn drain<R: Read + Send + 'static>(
    which: Pipe,
    pipe: Option<R>,
    tx: mpsc::Sender<(Pipe, String)>,
) {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        let _ = tx.send((which, String::from_utf8_lossy(&buffer).into_owned()));
    });
}

fn kill(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

/// Kill every process left in the engine's process group.
#[cfg(unix)]
fn kill_group(pgid: u32) {
    let _ = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pgid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
