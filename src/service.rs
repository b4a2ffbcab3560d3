use async_trait::async_trait;

use crate::error::BigQueryError;
use crate::job_id::JobId;
use crate::structs;

/// Job resource fields that can be requested individually on a fetch.
/// Polling code asks for [`JobField::Status`] only, which keeps each poll
/// round-trip small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobField {
    Etag,
    Id,
    JobReference,
    Status,
    Configuration,
    UserEmail,
}

impl JobField {
    pub fn selector(&self) -> &'static str {
        match self {
            JobField::Etag => "etag",
            JobField::Id => "id",
            JobField::JobReference => "jobReference",
            JobField::Status => "status",
            JobField::Configuration => "configuration",
            JobField::UserEmail => "userEmail",
        }
    }

    /// Builds the REST `fields` parameter for a projection. The job reference
    /// is always part of the projection so a fetched resource stays
    /// attributable to its job.
    pub fn selector_for(fields: &[JobField]) -> String {
        let mut out = String::from("jobReference");
        for field in fields {
            if matches!(field, JobField::JobReference) {
                continue;
            }
            out.push(',');
            out.push_str(field.selector());
        }
        out
    }
}

/// Capability surface of the remote BigQuery service that job handles poll
/// against. Implementations are shared behind `Arc<dyn BigQuery>` and must be
/// safe to call from any task.
///
/// A missing job is data, not an error: `get_job` reports it as `Ok(None)`
/// and `cancel_job` as `Ok(false)`. Remote failures surface unchanged; no
/// implementation retries on behalf of the caller.
#[async_trait]
pub trait BigQuery: Send + Sync {
    /// Fetches the job resource for `id`. An empty `fields` slice requests
    /// the full resource; a non-empty slice restricts the response to the
    /// listed fields plus the job reference.
    async fn get_job(
        &self,
        id: &JobId,
        fields: &[JobField],
    ) -> Result<Option<structs::job::Job>, BigQueryError>;

    /// Requests cancellation of the job. `Ok(true)` means the service
    /// acknowledged the request against an existing job, not that the job
    /// has stopped.
    async fn cancel_job(&self, id: &JobId) -> Result<bool, BigQueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_projection_still_selects_the_job_reference() {
        assert_eq!(JobField::selector_for(&[]), "jobReference");
    }

    #[test]
    fn status_projection() {
        assert_eq!(
            JobField::selector_for(&[JobField::Status]),
            "jobReference,status"
        );
    }

    #[test]
    fn job_reference_is_not_selected_twice() {
        assert_eq!(
            JobField::selector_for(&[JobField::JobReference, JobField::Status, JobField::Etag]),
            "jobReference,status,etag"
        );
    }
}
