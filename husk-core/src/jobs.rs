//! The background job table.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::FutureExt;

use crate::error::Error;
use crate::processes::ChildProcess;
use crate::results::StatementOutcome;
use crate::sys;
use crate::traps::TrapCondition;

pub(crate) type JobJoinHandle = tokio::task::JoinHandle<Result<StatementOutcome, Error>>;

/// One task within a job: an external process, or a session-internal task
/// evaluating shell code.
pub enum JobTask {
    /// An external child process.
    External(ChildProcess),
    /// An in-process asynchronous task.
    Internal(JobJoinHandle),
}

impl JobTask {
    async fn wait(&mut self) -> Result<StatementOutcome, Error> {
        match self {
            Self::External(process) => Ok(process.wait().await?.into()),
            Self::Internal(handle) => handle.await?,
        }
    }

    fn poll(&mut self) -> Option<Result<StatementOutcome, Error>> {
        match self {
            Self::External(process) => process
                .poll()
                .map(|result| result.map(StatementOutcome::from)),
            Self::Internal(handle) => handle
                .now_or_never()
                .map(|result| result.map_err(Error::from).and_then(|inner| inner)),
        }
    }
}

/// The lifecycle state of a job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    /// The job is running.
    Running,
    /// The job has finished.
    Done,
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Positional annotation of a job within the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobAnnotation {
    /// No annotation.
    None,
    /// The current job (`%+`).
    Current,
    /// The previous job (`%-`).
    Previous,
}

impl Display for JobAnnotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, " "),
            Self::Current => write!(f, "+"),
            Self::Previous => write!(f, "-"),
        }
    }
}

/// A tracked background job.
pub struct Job {
    pub(crate) tasks: VecDeque<JobTask>,
    annotation: JobAnnotation,

    /// The job's table id (`%N`).
    pub id: usize,
    /// The source text that launched the job.
    pub command_line: String,
    /// The job's lifecycle state.
    pub state: JobState,
    /// The last exit status observed from the job, once done.
    pub last_status: Option<u8>,
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]{}  {}\t{}",
            self.id, self.annotation, self.state, self.command_line
        )
    }
}

impl Job {
    pub(crate) fn new<I>(tasks: I, command_line: String) -> Self
    where
        I: IntoIterator<Item = JobTask>,
    {
        Self {
            tasks: tasks.into_iter().collect(),
            annotation: JobAnnotation::None,
            id: 0,
            command_line,
            state: JobState::Running,
            last_status: None,
        }
    }

    /// Formats the job the way background-launch reports do (`[1] 1234`).
    pub fn to_pid_style_string(&self) -> String {
        let pid = self
            .representative_pid()
            .map_or_else(|| String::from("?"), |pid| pid.to_string());
        format!("[{}]{} {pid}", self.id, self.annotation)
    }

    /// Returns the job's annotation.
    pub const fn annotation(&self) -> JobAnnotation {
        self.annotation
    }

    /// Waits for every task in the job; the job's status is its last task's.
    pub async fn wait(&mut self) -> Result<StatementOutcome, Error> {
        let mut outcome = StatementOutcome::success();

        while let Some(task) = self.tasks.back_mut() {
            outcome = task.wait().await?;
            self.tasks.pop_back();
        }

        self.state = JobState::Done;
        self.last_status = Some(outcome.exit_code);

        Ok(outcome)
    }

    /// Polls whether the job has finished; returns its outcome if so.
    pub fn poll_done(&mut self) -> Option<Result<StatementOutcome, Error>> {
        let mut result = None;

        while !self.tasks.is_empty() {
            match self.tasks[0].poll() {
                Some(outcome) => {
                    self.tasks.remove(0);
                    result = Some(outcome);
                }
                None => return None,
            }
        }

        self.state = JobState::Done;
        if let Some(Ok(outcome)) = &result {
            self.last_status = Some(outcome.exit_code);
        }

        result
    }

    /// Sends a signal to the job.
    pub fn kill(&self, condition: TrapCondition) -> Result<(), Error> {
        if let Some(pid) = self.representative_pid() {
            sys::kill_process(pid, condition)
        } else {
            Err(crate::error::ErrorKind::FailedToSendSignal.into())
        }
    }

    /// Returns a representative pid for the job, if one exists.
    pub fn representative_pid(&self) -> Option<sys::ProcessId> {
        self.tasks.iter().find_map(|task| match task {
            JobTask::External(p) => p.pid(),
            JobTask::Internal(_) => None,
        })
    }
}

/// The session's job table.
#[derive(Default)]
pub struct JobManager {
    /// The tracked jobs.
    pub jobs: Vec<Job>,
}

impl JobManager {
    /// Returns an empty job table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job, marking it current; returns a reference to it.
    pub fn add_as_current(&mut self, mut job: Job) -> &Job {
        for existing in &mut self.jobs {
            if matches!(existing.annotation, JobAnnotation::Current) {
                existing.annotation = JobAnnotation::Previous;
            } else if matches!(existing.annotation, JobAnnotation::Previous) {
                existing.annotation = JobAnnotation::None;
            }
        }

        // Table slots are reused: pick the smallest unused positive id.
        let mut id = 1;
        while self.jobs.iter().any(|j| j.id == id) {
            id += 1;
        }

        job.id = id;
        job.annotation = JobAnnotation::Current;
        self.jobs.push(job);

        #[allow(clippy::unwrap_used)]
        self.jobs.last().unwrap()
    }

    /// Returns the current job.
    pub fn current_job(&self) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|j| matches!(j.annotation, JobAnnotation::Current))
    }

    /// Returns a mutable reference to the current job.
    pub fn current_job_mut(&mut self) -> Option<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| matches!(j.annotation, JobAnnotation::Current))
    }

    /// Returns the previous job, mutably.
    pub fn prev_job_mut(&mut self) -> Option<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| matches!(j.annotation, JobAnnotation::Previous))
    }

    /// Removes the job with the given id.
    pub fn remove(&mut self, id: usize) -> Option<Job> {
        let index = self.jobs.iter().position(|j| j.id == id)?;
        Some(self.jobs.remove(index))
    }

    /// Resolves a `%`-prefixed job spec.
    pub fn resolve_job_spec(&mut self, spec: &str) -> Option<&mut Job> {
        let remainder = spec.strip_prefix('%')?;

        match remainder {
            "%" | "+" => self.current_job_mut(),
            "-" => self.prev_job_mut(),
            s if s.chars().all(|c| c.is_ascii_digit()) => {
                let id = s.parse::<usize>().ok()?;
                self.jobs.iter_mut().find(|j| j.id == id)
            }
            s => {
                // Fall back to a prefix match on the command text.
                self.jobs
                    .iter_mut()
                    .find(|j| j.command_line.starts_with(s))
            }
        }
    }

    /// Waits for all jobs; returns the last job's exit code.
    pub async fn wait_all(&mut self) -> Result<u8, Error> {
        let mut last_status = 0;
        for job in &mut self.jobs {
            last_status = job.wait().await?.exit_code;
        }

        self.jobs.clear();
        Ok(last_status)
    }

    /// Polls all jobs, removing and returning those that have finished.
    pub fn reap_completed(&mut self) -> Vec<Job> {
        let mut completed = vec![];

        let mut i = 0;
        while i != self.jobs.len() {
            if self.jobs[i].poll_done().is_some()
                || matches!(self.jobs[i].state, JobState::Done)
            {
                completed.push(self.jobs.remove(i));
            } else {
                i += 1;
            }
        }

        completed
    }
}
