//! Process runner: spawns the evaluator and streams its output into the log.
//!
//! Spawning and waiting are separate steps so the caller can record the
//! launch (the experiment enters `PROCESSING`) before blocking on the exit.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::EvalError;
use crate::eval::invocation::Invocation;
use crate::experiment::ExperimentId;

/// Exit code reported when the child was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// How long `wait` keeps forwarding output after the child has exited.
/// Descendants that inherited the pipes can hold them open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Process-runner collaborator consumed by the worker.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Start the command. `Err` means the process never started.
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningProcess>, EvalError>;
}

/// A started evaluator.
#[async_trait]
pub trait RunningProcess: Send {
    /// OS process id, when known.
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Block until the process exits and return its exit code.
    async fn wait(&mut self) -> Result<i32, EvalError>;
}

/// Which child pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Runs invocations as real child processes with tokio.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn RunningProcess>, EvalError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group: a terminal Ctrl-C aimed at the worker must not
        // reach the evaluator.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| EvalError::LaunchFailed {
                program: invocation.program.clone(),
                reason: e.to_string(),
            })?;

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward_lines(
                stdout,
                invocation.experiment_id.clone(),
                OutputStream::Stdout,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward_lines(
                stderr,
                invocation.experiment_id.clone(),
                OutputStream::Stderr,
            ));
        }

        Ok(Box::new(TokioProcess {
            experiment_id: invocation.experiment_id.clone(),
            child,
            forwarders,
        }))
    }
}

struct TokioProcess {
    experiment_id: ExperimentId,
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

#[async_trait]
impl RunningProcess for TokioProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<i32, EvalError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| EvalError::WaitFailed(e.to_string()))?;

        // Drain whatever the child wrote before exiting, but never let a
        // lingering descendant delay the exit report.
        let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        for mut handle in self.forwarders.drain(..) {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(
                    experiment_id = %self.experiment_id,
                    "Evaluator output still open after exit, detaching"
                );
                handle.abort();
            }
        }

        Ok(status.code().unwrap_or(SIGNAL_EXIT_CODE))
    }
}

/// Log each line of `reader` as it arrives.
fn forward_lines<R>(reader: R, experiment_id: ExperimentId, stream: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match stream {
                    OutputStream::Stdout => {
                        info!(experiment_id = %experiment_id, stream = %stream, "{line}")
                    }
                    OutputStream::Stderr => {
                        warn!(experiment_id = %experiment_id, stream = %stream, "{line}")
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        experiment_id = %experiment_id,
                        stream = %stream,
                        error = %e,
                        "Stopped reading evaluator output"
                    );
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation {
            experiment_id: ExperimentId::from("test"),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let runner = TokioProcessRunner::new();
        let mut proc = runner.spawn(&sh("echo out; echo err >&2; exit 3")).await.unwrap();
        assert!(proc.pid().is_some());
        assert_eq!(proc.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reports_success() {
        let runner = TokioProcessRunner::new();
        let mut proc = runner.spawn(&sh("true")).await.unwrap();
        assert_eq!(proc.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let runner = TokioProcessRunner::new();
        let inv = Invocation {
            experiment_id: ExperimentId::from("test"),
            program: "/nonexistent/evaluator-binary".into(),
            args: vec![],
        };
        let err = runner.spawn(&inv).await.err().unwrap();
        assert!(matches!(err, EvalError::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn signal_exit_maps_to_minus_one() {
        let runner = TokioProcessRunner::new();
        let mut proc = runner.spawn(&sh("kill -9 $$")).await.unwrap();
        assert_eq!(proc.wait().await.unwrap(), SIGNAL_EXIT_CODE);
    }

    #[tokio::test]
    async fn large_output_does_not_block_exit() {
        let runner = TokioProcessRunner::new();
        let mut proc = runner
            .spawn(&sh("i=0; while [ $i -lt 5000 ]; do echo line $i; i=$((i+1)); done"))
            .await
            .unwrap();
        assert_eq!(proc.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn background_descendant_does_not_delay_exit() {
        let runner = TokioProcessRunner::new();
        let mut proc = runner.spawn(&sh("sleep 30 & exit 0")).await.unwrap();

        let started = std::time::Instant::now();
        let code = tokio::time::timeout(Duration::from_secs(5), proc.wait())
            .await
            .expect("exit not reported while a descendant holds the pipes")
            .unwrap();
        assert_eq!(code, 0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Process group id (field 5) from `/proc/{pid}/stat`.
    #[cfg(target_os = "linux")]
    fn process_group(pid: &str) -> i32 {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();
        let after_comm = &stat[stat.rfind(')').unwrap() + 1..];
        after_comm.split_whitespace().nth(2).unwrap().parse().unwrap()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn evaluator_runs_in_its_own_process_group() {
        let runner = TokioProcessRunner::new();
        let mut proc = runner.spawn(&sh("sleep 1")).await.unwrap();
        let pid = proc.pid().unwrap();

        let child_group = process_group(&pid.to_string());
        assert_eq!(child_group, pid as i32);
        assert_ne!(child_group, process_group("self"));

        assert_eq!(proc.wait().await.unwrap(), 0);
    }
}
