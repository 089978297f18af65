use crate::builtin;
use crate::interpreter::Shell;
use crate::jobs::JobError;
use crate::parser::{self, ParseError, Pipeline, Redirect, RedirectKind};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use thiserror::Error;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Distinguished exit status for "the external program could not be found",
/// letting conditional logic tell "ran and failed" apart from "never started".
pub const NOT_FOUND: ExitCode = 127;

/// Errors from realizing a pipeline as live processes. A spawn failure aborts
/// only the remainder of the stage chain; stages that already started are
/// left running rather than rolled back.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("cannot open {path}: {source}")]
    Redirect { path: String, source: io::Error },
    #[error("failed to start `{command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("failed to wait for `{command}`: {source}")]
    Wait { command: String, source: io::Error },
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Builtin(#[from] anyhow::Error),
}

/// What a launch produced.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// Foreground launch (or in-process builtin): the final stage's exit
    /// status, propagated verbatim.
    Exited(ExitCode),
    /// Background launch: registered as a single job for the whole pipeline.
    Background { job_id: usize, pid: u32 },
}

/// The single entry point for running one logical command.
///
/// The input must be already variable-expanded, `;`-split and stripped of a
/// trailing `&` (the front end's responsibility; `background` carries what
/// the `&` said). A single-stage pipeline whose `argv[0]` names a builtin is
/// executed in the calling process — builtins observe and mutate interpreter
/// state and must not run in a child. A builtin with `&` still runs
/// in-process.
pub fn execute_line(
    shell: &mut Shell,
    line: &str,
    background: bool,
) -> Result<LaunchOutcome, LaunchError> {
    let pipeline = parser::parse_pipeline(line)?;
    if let [stage] = pipeline.stages.as_slice() {
        let args: Vec<&str> = stage.argv[1..].iter().map(String::as_str).collect();
        if let Some(cmd) = builtin::lookup(&stage.argv[0], &args) {
            let code = cmd.invoke(&mut io::stdout(), shell)?;
            return Ok(LaunchOutcome::Exited(code));
        }
    }
    run_pipeline(shell, &pipeline, background, line)
}

/// Run one logical command in the foreground and return its exit status.
pub fn execute_foreground(shell: &mut Shell, line: &str) -> Result<ExitCode, LaunchError> {
    match execute_line(shell, line, false)? {
        LaunchOutcome::Exited(code) => Ok(code),
        LaunchOutcome::Background { .. } => unreachable!("foreground launch produced a job"),
    }
}

/// Spawn every stage of `pipeline`, wiring stage *i*'s stdout to stage
/// *i+1*'s stdin through a real OS pipe, with explicit redirections applied
/// last so they win the final descriptor assignment.
///
/// Foreground: blocks until every spawned stage has terminated and returns
/// the final stage's exit status. Background: returns immediately after
/// registering one job keyed by the final stage's process.
fn run_pipeline(
    shell: &mut Shell,
    pipeline: &Pipeline,
    background: bool,
    raw: &str,
) -> Result<LaunchOutcome, LaunchError> {
    let count = pipeline.stages.len();
    let mut children: Vec<Child> = Vec::with_capacity(count);
    // Read end of the pipe the previous stage writes to, if any. Dropping an
    // untaken handle closes it, so no descriptor outlives its stage.
    let mut carry: Option<ChildStdout> = None;
    let mut final_spawned = false;

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i + 1 == count;
        let program = &stage.argv[0];

        let mut cmd = Command::new(program);
        cmd.args(&stage.argv[1..])
            .envs(&shell.env.vars)
            .current_dir(&shell.env.current_dir);

        // stdin: pipe wiring first, explicit redirection last (it wins).
        let upstream = carry.take();
        if let Some(redirect) = stage.input() {
            let file = File::open(&redirect.target).map_err(|source| LaunchError::Redirect {
                path: redirect.target.clone(),
                source,
            })?;
            cmd.stdin(Stdio::from(file));
        } else if let Some(prev) = upstream {
            cmd.stdin(Stdio::from(prev));
        } else if !is_first {
            // The upstream stage either redirected its output to a file or
            // never started: the pipe this stage would read has no writer,
            // which reads as immediate end-of-input.
            cmd.stdin(Stdio::null());
        }

        // stdout: same ordering; a redirection wins even mid-pipeline.
        if let Some(redirect) = stage.output() {
            cmd.stdout(Stdio::from(open_output(redirect)?));
        } else if !is_last {
            cmd.stdout(Stdio::piped());
        }

        match cmd.spawn() {
            Ok(mut child) => {
                debug!("stage {i}: spawned `{program}` (pid={})", child.id());
                carry = child.stdout.take();
                children.push(child);
                final_spawned = is_last;
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                // Reported via the distinguished 127 status, not as an
                // interpreter-level error; the rest of the chain still runs.
                eprintln!("jobsh: {program}: command not found");
            }
            Err(source) => {
                // Stages already launched are left running; only the
                // remainder of the chain is abandoned.
                return Err(LaunchError::Spawn {
                    command: program.clone(),
                    source,
                });
            }
        }
    }

    if background {
        let Some(final_stage) = children.pop() else {
            // No stage started at all; nothing to track.
            return Ok(LaunchOutcome::Exited(NOT_FOUND));
        };
        let pid = final_stage.id();
        let job_id = shell.jobs.add(final_stage, children, raw.trim().to_string())?;
        return Ok(LaunchOutcome::Background { job_id, pid });
    }

    // Foreground: wait for every stage in order; the pipeline's status is the
    // final stage's, or 127 when the final stage never started.
    let mut code = NOT_FOUND;
    let last = children.len().checked_sub(1);
    for (i, child) in children.iter_mut().enumerate() {
        let status = child.wait().map_err(|source| LaunchError::Wait {
            command: raw.trim().to_string(),
            source,
        })?;
        if final_spawned && Some(i) == last {
            code = status_code(status);
        }
    }
    Ok(LaunchOutcome::Exited(code))
}

fn open_output(redirect: &Redirect) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    match redirect.kind {
        RedirectKind::Append => options.append(true),
        _ => options.truncate(true),
    };
    options
        .open(&redirect.target)
        .map_err(|source| LaunchError::Redirect {
            path: redirect.target.clone(),
            source,
        })
}

/// Map a wait status to an exit code: the child's own code when it exited,
/// 128+signal when it was terminated by a signal.
pub(crate) fn status_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: ExitStatus) -> ExitCode {
    -1
}
