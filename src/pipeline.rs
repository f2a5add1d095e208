//! Two-stage build/publish execution pipeline.
//!
//! Each admitted task runs its build command, then (only on success) its
//! publish command, as external processes receiving the six execution
//! parameters as positional arguments. The sequence is an explicit state
//! machine: `Idle → Building → Publishing → Succeeded / Failed(stage)`, so
//! "never publish after a failed build" is a structural property of the
//! transitions.
//!
//! There is no timeout and no cancellation. Once spawned, a process runs to
//! completion or natural failure; a hung script blocks the whole queue. That
//! is a known limitation of the service, not a feature.

use std::fmt;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::notify::Notifier;
use crate::queue::HookTask;
use crate::{Config, ScriptPair};

/// One external-process step of the two-stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Build => "build",
            Stage::Publish => "publish",
        })
    }
}

/// Pipeline states. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Building,
    Publishing,
    Succeeded,
    Failed(Stage),
}

/// Terminal result of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Failed(Stage),
}

/// Executes one queued task end to end: resolve the branch's scripts, run
/// the pipeline, report the outcome. Script resolution failure is an
/// operator misconfiguration; the task is aborted without a notification.
pub async fn process(task: HookTask, config: &Config, notifier: &Notifier) {
    info!(
        "task {} - push for {}/{} on '{}', starting pipeline",
        task.id,
        task.event.owner,
        task.event.repo,
        task.event.branch()
    );

    let scripts = match config.resolve_scripts(task.event.branch()) {
        Ok(scripts) => scripts,
        Err(e) => {
            error!("task {} aborted: {}", task.id, e);
            return;
        }
    };

    match execute(scripts, &task).await {
        PipelineOutcome::Succeeded => {
            info!(
                "task {} - successfully rendered {}/{}",
                task.id, task.event.owner, task.event.repo
            );
            notifier.report_success(&task).await;
        }
        PipelineOutcome::Failed(stage) => {
            error!(
                "task {} - failed to {} {}/{}",
                task.id, stage, task.event.owner, task.event.repo
            );
            notifier.report_failure(&task, stage).await;
        }
    }
}

/// Drives the state machine to a terminal state. The pipeline owns at most
/// one external process at a time.
pub async fn execute(scripts: &ScriptPair, task: &HookTask) -> PipelineOutcome {
    let mut state = PipelineState::Idle;
    loop {
        state = match state {
            PipelineState::Idle => PipelineState::Building,
            PipelineState::Building => {
                if run_stage(Stage::Build, &scripts.build, task).await {
                    PipelineState::Publishing
                } else {
                    PipelineState::Failed(Stage::Build)
                }
            }
            PipelineState::Publishing => {
                if run_stage(Stage::Publish, &scripts.publish, task).await {
                    PipelineState::Succeeded
                } else {
                    PipelineState::Failed(Stage::Publish)
                }
            }
            PipelineState::Succeeded => return PipelineOutcome::Succeeded,
            PipelineState::Failed(stage) => return PipelineOutcome::Failed(stage),
        };
    }
}

/// Spawns `command` with the six positional parameters and streams its
/// output as it arrives: stdout as info lines, stderr as warning lines.
/// Returns true only for a clean exit (code 0).
async fn run_stage(stage: Stage, command: &str, task: &HookTask) -> bool {
    info!("task {} - running {} script: {}", task.id, stage, command);

    let mut child = match Command::new(command)
        .args(task.params.as_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!(
                "task {} - failed to start {} script '{}': {}",
                task.id, stage, command, e
            );
            return false;
        }
    };

    let out_pump = tokio::spawn(pump_lines(child.stdout.take(), false));
    let err_pump = tokio::spawn(pump_lines(child.stderr.take(), true));

    let status = child.wait().await;
    let _ = out_pump.await;
    let _ = err_pump.await;

    match status {
        Ok(status) if status.success() => {
            info!("task {} - {} script finished", task.id, stage);
            true
        }
        Ok(status) => {
            error!(
                "task {} - {} script exited with {}",
                task.id, stage, status
            );
            false
        }
        Err(e) => {
            error!(
                "task {} - failed waiting for {} script: {}",
                task.id, stage, e
            );
            false
        }
    }
}

/// Forwards one output stream line by line. Each stream preserves its own
/// emission order; ordering between stdout and stderr is not guaranteed.
async fn pump_lines<R>(reader: Option<R>, as_warning: bool)
where
    R: AsyncRead + Unpin + Send,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if as_warning {
            warn!("{line}");
        } else {
            info!("{line}");
        }
    }
}
