use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::BigQueryError;
use crate::structs;
use crate::structs::error_proto::ErrorProto;

/// Lifecycle state of a job: waiting to run, running, or finished.
/// `Done` covers both success and failure; a failed run carries the terminal
/// error on its [`JobStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Running,
    Done,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Pending => "PENDING",
            State::Running => "RUNNING",
            State::Done => "DONE",
        }
    }
}

impl FromStr for State {
    type Err = BigQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(State::Pending),
            "RUNNING" => Ok(State::Running),
            "DONE" => Ok(State::Done),
            other => Err(BigQueryError::UnknownJobState(other.to_string())),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a job as observed at one point in time.
///
/// `error` is the terminal error of an unsuccessful run; its absence on a
/// `Done` job means the job succeeded. `execution_errors` are errors observed
/// while the job ran, in the order the service reported them, and do not by
/// themselves mean the job failed.
///
/// Equality and hashing go through the wire projection, so two statuses
/// fetched independently compare equal whenever their wire forms match.
#[derive(Debug, Clone)]
pub struct JobStatus {
    state: State,
    error: Option<ErrorProto>,
    execution_errors: Option<Vec<ErrorProto>>,
}

impl JobStatus {
    pub fn new(state: State) -> Self {
        JobStatus {
            state,
            error: None,
            execution_errors: None,
        }
    }

    pub fn builder(state: State) -> JobStatusBuilder {
        JobStatusBuilder {
            state,
            error: None,
            execution_errors: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn error(&self) -> Option<&ErrorProto> {
        self.error.as_ref()
    }

    pub fn execution_errors(&self) -> Option<&[ErrorProto]> {
        self.execution_errors.as_deref()
    }

    pub fn to_wire(&self) -> structs::job_status::JobStatus {
        structs::job_status::JobStatus {
            state: Some(self.state.as_str().to_string()),
            error_result: self.error.clone(),
            errors: self.execution_errors.clone(),
        }
    }

    /// Parses a wire status. Fails if the state tag is absent or not one of
    /// the three known values; there is no fallback state.
    pub fn from_wire(status: structs::job_status::JobStatus) -> Result<Self, BigQueryError> {
        let state = status
            .state
            .as_deref()
            .ok_or(BigQueryError::MissingJobStateInGoogleApiResponse)?
            .parse()?;
        Ok(JobStatus {
            state,
            error: status.error_result,
            execution_errors: status.errors,
        })
    }
}

// The wire projection is the single source of truth for structural equality,
// so the in-memory and transport representations cannot diverge.
impl PartialEq for JobStatus {
    fn eq(&self, other: &Self) -> bool {
        self.to_wire() == other.to_wire()
    }
}

impl Eq for JobStatus {}

impl Hash for JobStatus {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.to_wire().hash(hasher);
    }
}

/// Builds an immutable [`JobStatus`]. No cross-field validation is applied:
/// any state/error combination the service could conceivably report is
/// constructible.
#[derive(Debug)]
pub struct JobStatusBuilder {
    state: State,
    error: Option<ErrorProto>,
    execution_errors: Option<Vec<ErrorProto>>,
}

impl JobStatusBuilder {
    pub fn error(mut self, error: ErrorProto) -> Self {
        self.error = Some(error);
        self
    }

    pub fn execution_errors(mut self, errors: Vec<ErrorProto>) -> Self {
        self.execution_errors = Some(errors);
        self
    }

    pub fn build(self) -> JobStatus {
        JobStatus {
            state: self.state,
            error: self.error,
            execution_errors: self.execution_errors,
        }
    }
}
