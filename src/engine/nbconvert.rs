//! Execution through `jupyter nbconvert --execute`.
//!
//! nbconvert hands the notebook to nbclient, which starts a kernel, runs each
//! code cell with a per-cell timeout and writes the executed notebook back
//! out. With `--allow-errors`, exceptions in notebook code are recorded as
//! `error` outputs instead of aborting the run.
//!
//! # Working directory
//!
//! nbconvert starts the kernel in the directory of its *input* file, so the
//! scratch input is written as a hidden file next to the original notebook.
//! The executed result goes to a private temporary directory.
//!
//! # Notes on stdout/stderr capture and timeouts
//!
//! stdout/stderr are drained on their own threads while we wait: a child
//! that fills a pipe would otherwise block forever and never exit. The
//! process deadline is enforced here with a hard kill, independent of
//! nbclient's own per-cell timeout.
//!
//! On Unix the engine leads its own process group, and the kill goes to the
//! whole group so a kernel left behind cannot keep the pipes open. Drain
//! threads are never joined on the timeout path; a descendant that escaped
//! the group only keeps its thread alive, not the caller.

use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use super::{ExecutionConfig, ExecutionEngine};
use crate::error::ExecutionError;
use crate::notebook::NotebookDocument;

/// Basename nbconvert writes the executed notebook under.
const OUTPUT_BASENAME: &str = "executed";

/// Number of stderr lines kept in engine error messages.
const STDERR_TAIL_LINES: usize = 20;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for pipes to close once the engine has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Output from one engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    /// Standard output from the engine.
    pub stdout: String,
    /// Standard error from the engine.
    pub stderr: String,
    /// Exit code; `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl EngineOutput {
    /// Returns `true` if the engine exited successfully.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Returns true if nbclient gave up on a cell because of its timeout.
    #[must_use]
    pub fn is_cell_timeout(&self) -> bool {
        self.stderr.contains("CellTimeoutError")
            || self.stderr.contains("Cell execution timed out")
    }

    /// Returns true if the kernel never became ready.
    #[must_use]
    pub fn is_startup_timeout(&self) -> bool {
        self.stderr.contains("Kernel didn't respond")
    }

    /// Last lines of stderr, for error messages.
    #[must_use]
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.trim_end().lines().collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Runs notebooks with `jupyter nbconvert --to notebook --execute`.
#[derive(Debug, Clone)]
pub struct NbconvertEngine {
    config: ExecutionConfig,
}

impl NbconvertEngine {
    /// Creates a new engine with the given configuration.
    #[must_use]
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the engine configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Builds the nbconvert argument list for one run.
    #[must_use]
    pub fn build_args(&self, input: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "nbconvert".into(),
            "--to".into(),
            "notebook".into(),
            "--execute".into(),
            "--allow-errors".into(),
            format!(
                "--ExecutePreprocessor.timeout={}",
                self.config.timeout.as_secs().max(1)
            )
            .into(),
            format!(
                "--ExecutePreprocessor.startup_timeout={}",
                self.config.startup_timeout.as_secs().max(1)
            )
            .into(),
        ];

        if let Some(kernel) = &self.config.kernel_name {
            args.push(format!("--ExecutePreprocessor.kernel_name={kernel}").into());
        }

        args.push("--output".into());
        args.push(OUTPUT_BASENAME.into());
        args.push("--output-dir".into());
        args.push(output_dir.as_os_str().to_owned());
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Spawns the engine and waits for it, killing it after `deadline`.
    #[instrument(skip(self, args), fields(command = %self.config.jupyter_command, deadline_ms = %deadline.as_millis()))]
    fn run(
        &self,
        args: &[OsString],
        working_dir: &Path,
        deadline: Duration,
    ) -> Result<EngineOutput, ExecutionError> {
        let mut cmd = Command::new(&self.config.jupyter_command);
        cmd.args(args)
            .current_dir(working_dir)
            .envs(&self.config.env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        trace!("Spawning engine process");
        let mut child = cmd.spawn().map_err(|e| ExecutionError::Engine {
            reason: format!(
                "failed to spawn '{}': {e}",
                self.config.jupyter_command
            ),
        })?;

        let mut stdout_reader = child.stdout.take();
        let mut stderr_reader = child.stderr.take();

        let (stdout_tx, stdout_rx) = mpsc::channel::<Vec<u8>>();
        let (stderr_tx, stderr_rx) = mpsc::channel::<Vec<u8>>();

        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut r) = stdout_reader.take() {
                let _ = r.read_to_end(&mut buf);
            }
            let _ = stdout_tx.send(buf);
        });

        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut r) = stderr_reader.take() {
                let _ = r.read_to_end(&mut buf);
            }
            let _ = stderr_tx.send(buf);
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > deadline {
                        warn!(elapsed_ms = %start.elapsed().as_millis(), "Engine exceeded deadline, killing it");
                        kill_process_group(child.id());
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ExecutionError::Timeout { timeout: deadline });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    kill_process_group(child.id());
                    return Err(ExecutionError::Engine {
                        reason: format!("failed to wait for engine: {e}"),
                    });
                }
            }
        };

        // Stragglers such as an orphaned kernel would hold the pipes open.
        kill_process_group(child.id());

        let stdout_bytes = stdout_rx.recv_timeout(DRAIN_GRACE).unwrap_or_default();
        let stderr_bytes = stderr_rx.recv_timeout(DRAIN_GRACE).unwrap_or_default();

        debug!(exit_code = ?status.code(), elapsed_ms = %start.elapsed().as_millis(), "Engine finished");
        Ok(EngineOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code(),
        })
    }
}

/// Sends SIGKILL to the process group led by `pgid`.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => trace!(pgid, "Killed engine process group"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill engine process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

impl ExecutionEngine for NbconvertEngine {
    #[instrument(skip(self, document), fields(cells = document.cells.len(), working_dir = %working_dir.display()))]
    fn execute(
        &self,
        document: &NotebookDocument,
        working_dir: &Path,
    ) -> Result<NotebookDocument, ExecutionError> {
        let output_dir = tempfile::Builder::new()
            .prefix("nbmcp-")
            .tempdir()
            .map_err(|e| ExecutionError::Workspace {
                context: "failed to create output directory".to_string(),
                source: e,
            })?;

        let json = document
            .to_json_string()
            .map_err(|e| ExecutionError::Engine {
                reason: format!("failed to serialize notebook: {e}"),
            })?;

        let mut input = tempfile::Builder::new()
            .prefix(".nbmcp-")
            .suffix(".ipynb")
            .tempfile_in(working_dir)
            .map_err(|e| ExecutionError::Workspace {
                context: format!("failed to create input file in {}", working_dir.display()),
                source: e,
            })?;
        input
            .write_all(json.as_bytes())
            .and_then(|()| input.flush())
            .map_err(|e| ExecutionError::Workspace {
                context: format!("failed to write input file {}", input.path().display()),
                source: e,
            })?;

        let code_cells = document
            .cells
            .iter()
            .filter(|cell| cell.get("cell_type").and_then(Value::as_str) == Some("code"))
            .count();
        let deadline = self.config.process_deadline(code_cells);

        let args = self.build_args(input.path(), output_dir.path());
        let output = self.run(&args, working_dir, deadline)?;

        if !output.success() {
            if output.is_cell_timeout() {
                return Err(ExecutionError::Timeout {
                    timeout: self.config.timeout,
                });
            }
            if output.is_startup_timeout() {
                return Err(ExecutionError::Timeout {
                    timeout: self.config.startup_timeout,
                });
            }
            return Err(ExecutionError::Engine {
                reason: format!(
                    "nbconvert exited with {}: {}",
                    output
                        .exit_code
                        .map_or_else(|| "a signal".to_string(), |code| format!("code {code}")),
                    output.stderr_tail()
                ),
            });
        }

        let executed_path = output_dir
            .path()
            .join(OUTPUT_BASENAME)
            .with_extension("ipynb");
        let content = fs::read_to_string(&executed_path).map_err(|e| ExecutionError::Engine {
            reason: format!(
                "failed to read executed notebook {}: {e}",
                executed_path.display()
            ),
        })?;

        NotebookDocument::from_json_str(&content).map_err(|reason| ExecutionError::Engine {
            reason: format!("engine returned an invalid notebook: {reason}"),
        })
    }
}
