use std::fmt;

use crate::error::BigQueryError;
use crate::structs::job_reference::JobReference;

/// Fully qualified identifier of a job: owning project, job id, and the
/// optional location the job runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

impl JobId {
    pub fn new(project_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        JobId {
            project_id: project_id.into(),
            job_id: job_id.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Parses a wire job reference; project id and job id are both required.
    pub fn from_wire(reference: JobReference) -> Result<Self, BigQueryError> {
        match (reference.project_id, reference.job_id) {
            (Some(project_id), Some(job_id)) => Ok(JobId {
                project_id,
                job_id,
                location: reference.location,
            }),
            _ => Err(BigQueryError::MissingJobIdInGoogleApiResponse),
        }
    }

    pub fn to_wire(&self) -> JobReference {
        JobReference {
            project_id: Some(self.project_id.clone()),
            job_id: Some(self.job_id.clone()),
            location: self.location.clone(),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}:{}.{}", self.project_id, location, self.job_id),
            None => write!(f, "{}:{}", self.project_id, self.job_id),
        }
    }
}
