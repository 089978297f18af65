use crate::exec::{self, ExitCode};
use log::{debug, warn};
use std::io;
use std::process::Child;
use thiserror::Error;

/// Fixed number of job slots. Ids are permanent for the table's lifetime, so
/// the table never shrinks and never reuses an id; once all slots are
/// assigned, new background jobs are rejected.
pub const CAPACITY: usize = 64;

/// Lifecycle state of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "running"),
            JobState::Done => write!(f, "done"),
        }
    }
}

/// Errors from job-table operations. All of these are reported to the caller
/// and never terminate the interpreter.
#[derive(Debug, Error)]
pub enum JobError {
    /// Id below 1, above the highest assigned id, or naming a job that is
    /// already done.
    #[error("invalid job id: {0}")]
    InvalidJobId(usize),
    /// All job slots are assigned; the new background pipeline is running but
    /// untracked.
    #[error("job table full ({CAPACITY} entries)")]
    CapacityExceeded,
    /// The termination signal could not be delivered.
    #[error("failed to signal job {id}: {source}")]
    SignalFailed { id: usize, source: io::Error },
    /// The underlying wait failed; the job's state is unknown.
    #[error("failed to wait for job {id}: {source}")]
    WaitFailed { id: usize, source: io::Error },
}

/// A tracked background pipeline.
///
/// One job represents the whole pipeline and is keyed by its final stage's
/// process: `pid` and the state transition to `Done` follow the final stage
/// only. Upstream stage processes are retained so the reaper can collect
/// them once they exit, but they never drive the job's state.
#[derive(Debug)]
pub struct Job {
    id: usize,
    pid: u32,
    command: String,
    state: JobState,
    final_stage: Child,
    upstream: Vec<Child>,
}

impl Job {
    /// 1-based id, stable for the table's lifetime.
    pub fn id(&self) -> usize {
        self.id
    }

    /// OS pid of the pipeline's final stage.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The command text the job was started with.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn state(&self) -> JobState {
        self.state
    }
}

/// Registry of background jobs.
///
/// The table is the single owner of every child handle once a pipeline is
/// backgrounded; the launcher inserts through [`JobTable::add`] and never
/// keeps a handle of its own. The interpreter is single-threaded, so
/// foreground waits and reaping are serialized simply by going through one
/// `&mut JobTable`.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::with_capacity(CAPACITY),
        }
    }

    /// Register one job for a whole background pipeline.
    ///
    /// `final_stage` is the process the job is keyed by; `upstream` holds the
    /// earlier stages, in pipeline order. Returns the new job's id, or
    /// [`JobError::CapacityExceeded`] without touching existing entries.
    pub fn add(
        &mut self,
        final_stage: Child,
        upstream: Vec<Child>,
        command: String,
    ) -> Result<usize, JobError> {
        if self.jobs.len() >= CAPACITY {
            return Err(JobError::CapacityExceeded);
        }
        let id = self.jobs.len() + 1;
        let pid = final_stage.id();
        debug!("job [{id}] registered (pid={pid}): {command}");
        self.jobs.push(Job {
            id,
            pid,
            command,
            state: JobState::Running,
            final_stage,
            upstream,
        });
        Ok(id)
    }

    /// All jobs, running and done, ordered by id ascending.
    pub fn list(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    fn entry_mut(&mut self, id: usize) -> Result<&mut Job, JobError> {
        match self.jobs.get_mut(id.wrapping_sub(1)) {
            Some(job) if job.state == JobState::Running => Ok(job),
            _ => Err(JobError::InvalidJobId(id)),
        }
    }

    /// Block until the job's final stage terminates, mark the job done, and
    /// return the final stage's exit status.
    ///
    /// Only the keyed process is waited for synchronously; upstream stages
    /// that are still draining are left to the reaper.
    pub fn bring_to_foreground(&mut self, id: usize) -> Result<ExitCode, JobError> {
        let job = self.entry_mut(id)?;
        let status = job
            .final_stage
            .wait()
            .map_err(|source| JobError::WaitFailed { id, source })?;
        job.state = JobState::Done;
        collect_upstream(job);
        Ok(exec::status_code(status))
    }

    /// Forcibly terminate every process of the job and mark it done.
    ///
    /// Sends SIGKILL; there is no drain period. On signal failure the job is
    /// left as-is and a later reap picks up whatever actually died.
    pub fn terminate(&mut self, id: usize) -> Result<(), JobError> {
        let job = self.entry_mut(id)?;
        for child in job.upstream.iter_mut().chain([&mut job.final_stage]) {
            child
                .kill()
                .map_err(|source| JobError::SignalFailed { id, source })?;
        }
        // SIGKILL cannot be blocked, so these waits complete promptly.
        if let Err(e) = job.final_stage.wait() {
            warn!("job [{id}]: wait after kill failed: {e}");
        }
        for child in &mut job.upstream {
            if let Err(e) = child.wait() {
                warn!("job [{id}]: wait after kill failed: {e}");
            }
        }
        job.state = JobState::Done;
        Ok(())
    }

    /// Non-blocking collection of terminated children.
    ///
    /// Polls every running job's final stage once; jobs whose final stage has
    /// exited flip to `Done`. Upstream stage processes of running *and* done
    /// jobs are polled too so no zombie outlives the next reap. Returns the
    /// number of jobs that transitioned to `Done`; calling this when nothing
    /// has exited returns 0 and mutates no state.
    pub fn reap_finished(&mut self) -> usize {
        let mut reaped = 0;
        for job in &mut self.jobs {
            if job.state == JobState::Running {
                match job.final_stage.try_wait() {
                    Ok(Some(status)) => {
                        debug!("job [{}] finished: {status}", job.id);
                        job.state = JobState::Done;
                        reaped += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("job [{}]: wait failed, state unknown: {e}", job.id);
                        continue;
                    }
                }
            }
            collect_upstream(job);
        }
        reaped
    }
}

/// Poll upstream stage processes without blocking. Stages that have not yet
/// exited (e.g. still waiting on a pipe) stay around for the next reap.
fn collect_upstream(job: &mut Job) {
    for child in &mut job.upstream {
        match child.try_wait() {
            Ok(_) => {}
            Err(e) => warn!("job [{}]: upstream wait failed: {e}", job.id),
        }
    }
}
