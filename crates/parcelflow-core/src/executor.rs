//! # Executor Module
//!
//! The single narrow interface through which every stage runs its tool.
//!
//! An [`Invocation`] carries everything a run needs: the rendered command,
//! the subjects directory the tool resolves data from, and where the
//! artifact is written. The subjects directory is passed to the child
//! process only; the orchestrating process environment is never mutated,
//! so invocations for different subjects may run concurrently.
//!
//! Tools write to a temporary sibling of the canonical output. The
//! orchestrator commits it with [`commit_output`] after a zero exit and
//! removes it with [`discard_output`] otherwise, so a canonical path never
//! holds a partial artifact.

use crate::command::{CommandLine, TemplateId};
use crate::primitives::{POLL_INTERVAL_MS, SUBJECTS_DIR_VAR};
use crate::types::Stage;
use crate::PipelineError;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

// =============================================================================
// CANCELLATION
// =============================================================================

/// Shared cancellation flag for a run.
///
/// Cloning shares the flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// INVOCATION
// =============================================================================

/// One external-tool run.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Stage the run belongs to.
    pub stage: Stage,
    /// Template the command was rendered from.
    pub template: TemplateId,
    /// The rendered command.
    pub command: CommandLine,
    /// Subjects directory the tool resolves subject data from.
    pub subjects_dir: PathBuf,
    /// Temporary path the tool writes its artifact to.
    pub partial: PathBuf,
    /// Canonical path the artifact is committed to.
    pub output: PathBuf,
}

/// What a successful run reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub exit_code: Option<i32>,
    /// Combined standard output and standard error.
    pub log: String,
}

/// Runs external tools.
///
/// Implementations block until the tool exits. A non-zero exit is an
/// `ExecutionError`; cancellation observed while waiting is `Cancelled`.
pub trait StageExecutor: Send + Sync {
    fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutput, PipelineError>;
}

// =============================================================================
// PROCESS EXECUTOR
// =============================================================================

/// Executes invocations as child processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    subjects_dir_var: String,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            subjects_dir_var: SUBJECTS_DIR_VAR.to_string(),
        }
    }
}

impl ProcessExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different environment variable for the subjects directory.
    #[must_use]
    pub fn with_subjects_dir_var(mut self, name: impl Into<String>) -> Self {
        self.subjects_dir_var = name.into();
        self
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl StageExecutor for ProcessExecutor {
    fn execute(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutput, PipelineError> {
        cancel.checkpoint()?;
        let command_text = invocation.command.to_string();

        let mut child = Command::new(&invocation.command.program)
            .args(&invocation.command.args)
            .env(&self.subjects_dir_var, &invocation.subjects_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                tracing::warn!(command = %command_text, error = %e, "Failed to spawn tool");
                PipelineError::ExecutionError {
                    command: command_text.clone(),
                    exit_code: None,
                }
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::IoError(format!(
                        "Waiting for '{}': {}",
                        invocation.command.program, e
                    )));
                }
            }
            if cancel.is_cancelled() {
                tracing::warn!(command = %command_text, "Cancelling running tool");
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout.join();
                let _ = stderr.join();
                return Err(PipelineError::Cancelled);
            }
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        };

        let mut log = stdout.join().unwrap_or_default();
        log.push_str(&stderr.join().unwrap_or_default());
        tracing::debug!(stage = %invocation.stage, output = %log, "Tool output");

        if status.success() {
            Ok(ExecutionOutput {
                exit_code: status.code(),
                log,
            })
        } else {
            tracing::warn!(
                command = %command_text,
                exit_code = ?status.code(),
                output = %log,
                "Tool failed"
            );
            Err(PipelineError::ExecutionError {
                command: command_text,
                exit_code: status.code(),
            })
        }
    }
}

// =============================================================================
// OUTPUT COMMIT
// =============================================================================

/// Move the temporary artifact onto its canonical path.
///
/// A tool that exits zero without writing its artifact yields
/// `FileNotFound` for the canonical path.
pub fn commit_output(invocation: &Invocation) -> Result<(), PipelineError> {
    if !invocation.partial.exists() {
        return Err(PipelineError::FileNotFound(invocation.output.clone()));
    }
    std::fs::rename(&invocation.partial, &invocation.output)
        .map_err(|e| PipelineError::io(&invocation.output, &e))
}

/// Remove a leftover temporary artifact, if any.
pub fn discard_output(invocation: &Invocation) {
    if invocation.partial.exists() {
        if let Err(e) = std::fs::remove_file(&invocation.partial) {
            tracing::warn!(
                path = %invocation.partial.display(),
                error = %e,
                "Could not remove partial output"
            );
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
