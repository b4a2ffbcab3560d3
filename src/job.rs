use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::time::{sleep, Instant};

use crate::error::BigQueryError;
use crate::job_id::JobId;
use crate::job_status::{JobStatus, State};
use crate::service::{BigQuery, JobField};
use crate::structs;
use crate::structs::job_configuration::JobConfiguration;

/// Polling configuration for [`Job::wait_for`]: how often to check, and for
/// how long in total. The default checks every 500ms with no overall timeout.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    checking_period: Duration,
    timeout: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        WaitOptions {
            checking_period: Duration::from_millis(500),
            timeout: None,
        }
    }
}

impl WaitOptions {
    pub fn check_every(mut self, period: Duration) -> Self {
        self.checking_period = period;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Handle for a job tracked by the remote service.
///
/// A handle is an immutable snapshot: [`Job::reload`] and [`Job::wait_for`]
/// return a fresh handle instead of mutating the one they were called on.
/// The service reference is shared with the owning client and is not part of
/// the snapshot.
#[derive(Clone)]
pub struct Job {
    service: Arc<dyn BigQuery>,
    id: JobId,
    etag: Option<String>,
    status: Option<JobStatus>,
    configuration: Option<JobConfiguration>,
    user_email: Option<String>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the service reference is transient and carries no job state
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("etag", &self.etag)
            .field("status", &self.status)
            .field("configuration", &self.configuration)
            .field("user_email", &self.user_email)
            .finish()
    }
}

impl Job {
    /// Creates a handle for a known job id without contacting the service.
    pub fn attach(service: Arc<dyn BigQuery>, id: JobId) -> Self {
        Job {
            service,
            id,
            etag: None,
            status: None,
            configuration: None,
            user_email: None,
        }
    }

    /// Creates a handle from a fetched job resource. Fails if the resource
    /// carries no usable job reference, or a status that does not parse.
    pub fn from_wire(
        service: Arc<dyn BigQuery>,
        job: structs::job::Job,
    ) -> Result<Self, BigQueryError> {
        let id = JobId::from_wire(
            job.job_reference
                .ok_or(BigQueryError::MissingJobIdInGoogleApiResponse)?,
        )?;
        let status = job.status.map(JobStatus::from_wire).transpose()?;
        Ok(Job {
            service,
            id,
            etag: job.etag,
            status,
            configuration: job.configuration,
            user_email: job.user_email,
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Status as of the snapshot this handle was built from; `None` for a
    /// handle attached by id and never reloaded.
    pub fn status(&self) -> Option<&JobStatus> {
        self.status.as_ref()
    }

    pub fn configuration(&self) -> Option<&JobConfiguration> {
        self.configuration.as_ref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user_email.as_deref()
    }

    /// Checks whether the job exists, with one minimal fetch.
    pub async fn exists(&self) -> Result<bool, BigQueryError> {
        let job = self.service.get_job(&self.id, &[JobField::Id]).await?;
        Ok(job.is_some())
    }

    /// Checks whether the job has finished, successfully or not, with one
    /// status-only fetch. A job the service no longer knows about counts as
    /// done; a job with no reported state yet does not.
    pub async fn is_done(&self) -> Result<bool, BigQueryError> {
        let job = self.service.get_job(&self.id, &[JobField::Status]).await?;
        let done = match &job {
            None => true,
            Some(job) => match job.status.as_ref().and_then(|status| status.state.as_deref()) {
                Some(tag) => tag.parse::<State>()? == State::Done,
                None => false,
            },
        };
        debug!("job {}: done={}", self.id, done);
        Ok(done)
    }

    /// Polls until the job completes, then reloads and returns the final
    /// snapshot; `Ok(None)` if the job no longer exists by then.
    ///
    /// Checks run strictly one after another, every
    /// `options.checking_period`. With a bounded timeout the wait fails with
    /// [`BigQueryError::WaitTimeout`] once the deadline passes; the overrun is
    /// at most one checking period plus one fetch. Remote failures propagate
    /// unchanged. Dropping the returned future (for example losing a
    /// `tokio::select!` race) stops the polling immediately and is never
    /// reported as a timeout.
    pub async fn wait_for(&self, options: WaitOptions) -> Result<Option<Job>, BigQueryError> {
        let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
        while !self.is_done().await? {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!("job {}: gave up waiting after {:?}", self.id, options.timeout);
                    return Err(BigQueryError::WaitTimeout);
                }
            }
            trace!(
                "job {}: not done, next check in {:?}",
                self.id,
                options.checking_period
            );
            sleep(options.checking_period).await;
        }
        self.reload(&[]).await
    }

    /// Fetches the job's latest state and returns it as a new handle;
    /// `Ok(None)` if the job does not exist. `fields` restricts the fetched
    /// resource; an empty slice fetches everything.
    pub async fn reload(&self, fields: &[JobField]) -> Result<Option<Job>, BigQueryError> {
        match self.service.get_job(&self.id, fields).await? {
            Some(job) => {
                let status = job.status.map(JobStatus::from_wire).transpose()?;
                Ok(Some(Job {
                    service: self.service.clone(),
                    id: self.id.clone(),
                    etag: job.etag,
                    status,
                    configuration: job.configuration,
                    user_email: job.user_email,
                }))
            }
            None => Ok(None),
        }
    }

    /// Asks the service to cancel the job. `Ok(true)` acknowledges the
    /// request; it does not mean the job has stopped, only a later
    /// [`Job::is_done`] or [`Job::reload`] can show that.
    pub async fn cancel(&self) -> Result<bool, BigQueryError> {
        self.service.cancel_job(&self.id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::structs::job_reference::JobReference;

    fn wire_job(state: Option<&str>) -> structs::job::Job {
        structs::job::Job {
            job_reference: Some(JobReference {
                project_id: Some("my-project".to_string()),
                job_id: Some("job_1234".to_string()),
                location: None,
            }),
            status: state.map(|tag| structs::job_status::JobStatus {
                state: Some(tag.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Serves a scripted sequence of `get_job` responses; once the script is
    /// down to its last entry, that entry repeats forever. Records every
    /// projection and rejects overlapping fetches.
    struct ScriptedService {
        responses: Mutex<VecDeque<Option<structs::job::Job>>>,
        projections: Mutex<Vec<Vec<JobField>>>,
        cancel_acknowledged: bool,
        cancel_calls: AtomicUsize,
        in_flight: AtomicBool,
    }

    impl ScriptedService {
        fn new(responses: Vec<Option<structs::job::Job>>) -> Arc<Self> {
            Arc::new(ScriptedService {
                responses: Mutex::new(responses.into()),
                projections: Mutex::new(Vec::new()),
                cancel_acknowledged: false,
                cancel_calls: AtomicUsize::new(0),
                in_flight: AtomicBool::new(false),
            })
        }

        fn with_cancel(acknowledged: bool) -> Arc<Self> {
            Arc::new(ScriptedService {
                responses: Mutex::new(VecDeque::new()),
                projections: Mutex::new(Vec::new()),
                cancel_acknowledged: acknowledged,
                cancel_calls: AtomicUsize::new(0),
                in_flight: AtomicBool::new(false),
            })
        }

        fn get_calls(&self) -> usize {
            self.projections.lock().unwrap().len()
        }

        fn projections(&self) -> Vec<Vec<JobField>> {
            self.projections.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BigQuery for ScriptedService {
        async fn get_job(
            &self,
            _id: &JobId,
            fields: &[JobField],
        ) -> Result<Option<structs::job::Job>, BigQueryError> {
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "overlapping get_job calls"
            );
            self.projections.lock().unwrap().push(fields.to_vec());
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap_or(None)
            };
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(response)
        }

        async fn cancel_job(&self, _id: &JobId) -> Result<bool, BigQueryError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.cancel_acknowledged)
        }
    }

    fn handle(service: Arc<ScriptedService>) -> Job {
        Job::attach(service, JobId::new("my-project", "job_1234"))
    }

    #[tokio::test]
    async fn exists_uses_a_minimal_projection() {
        let service = ScriptedService::new(vec![Some(wire_job(None))]);
        let job = handle(service.clone());
        assert!(job.exists().await.unwrap());
        assert_eq!(service.projections(), vec![vec![JobField::Id]]);
    }

    #[tokio::test]
    async fn exists_is_false_for_a_missing_job() {
        let service = ScriptedService::new(vec![None]);
        let job = handle(service);
        assert!(!job.exists().await.unwrap());
    }

    #[tokio::test]
    async fn is_done_fetches_only_the_status_field() {
        let service = ScriptedService::new(vec![Some(wire_job(Some("RUNNING")))]);
        let job = handle(service.clone());
        assert!(!job.is_done().await.unwrap());
        assert_eq!(service.projections(), vec![vec![JobField::Status]]);
    }

    #[tokio::test]
    async fn is_done_is_true_when_the_job_is_missing() {
        let service = ScriptedService::new(vec![None]);
        let job = handle(service);
        assert!(job.is_done().await.unwrap());
    }

    #[tokio::test]
    async fn is_done_is_true_only_for_done_state() {
        for (tag, expected) in [("PENDING", false), ("RUNNING", false), ("DONE", true)] {
            let service = ScriptedService::new(vec![Some(wire_job(Some(tag)))]);
            let job = handle(service);
            assert_eq!(job.is_done().await.unwrap(), expected, "state {}", tag);
        }
    }

    #[tokio::test]
    async fn is_done_treats_a_job_without_state_as_not_done() {
        let service = ScriptedService::new(vec![Some(wire_job(None))]);
        let job = handle(service);
        assert!(!job.is_done().await.unwrap());
    }

    #[tokio::test]
    async fn is_done_surfaces_a_malformed_state_tag() {
        let service = ScriptedService::new(vec![Some(wire_job(Some("COMPLETED")))]);
        let job = handle(service);
        assert!(matches!(
            job.is_done().await,
            Err(BigQueryError::UnknownJobState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_an_already_done_job_checks_once_and_reloads() {
        let service = ScriptedService::new(vec![Some(wire_job(Some("DONE")))]);
        let job = handle(service.clone());

        let started = Instant::now();
        let options = WaitOptions::default().check_every(Duration::ZERO);
        let completed = job.wait_for(options).await.unwrap().unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(service.get_calls(), 2);
        assert_eq!(
            service.projections(),
            vec![vec![JobField::Status], vec![]]
        );
        assert_eq!(completed.status().unwrap().state(), State::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_polls_until_done() {
        let service = ScriptedService::new(vec![
            Some(wire_job(Some("PENDING"))),
            Some(wire_job(Some("PENDING"))),
            Some(wire_job(Some("RUNNING"))),
            Some(wire_job(Some("DONE"))),
        ]);
        let job = handle(service.clone());

        let started = Instant::now();
        let options = WaitOptions::default()
            .check_every(Duration::from_millis(100))
            .timeout(Duration::from_secs(10));
        let completed = job.wait_for(options).await.unwrap().unwrap();

        // three sleeps between the four status checks, then the reload
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(10));
        let projections = service.projections();
        assert_eq!(projections.len(), 5);
        assert!(projections[..4].iter().all(|p| p == &[JobField::Status]));
        assert_eq!(projections[4], Vec::<JobField>::new());
        assert_eq!(completed.status().unwrap().state(), State::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_times_out_before_completion() {
        let service = ScriptedService::new(vec![Some(wire_job(Some("RUNNING")))]);
        let job = handle(service);

        let options = WaitOptions::default()
            .check_every(Duration::from_millis(100))
            .timeout(Duration::from_millis(350));
        assert!(matches!(
            job.wait_for(options).await,
            Err(BigQueryError::WaitTimeout)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_a_job_deleted_mid_wait_returns_none() {
        let service = ScriptedService::new(vec![
            Some(wire_job(Some("PENDING"))),
            Some(wire_job(Some("RUNNING"))),
            None,
        ]);
        let job = handle(service.clone());

        let options = WaitOptions::default().check_every(Duration::from_millis(100));
        let completed = job.wait_for(options).await.unwrap();
        assert!(completed.is_none());
        // two not-done polls, the poll that saw the job gone, and the reload
        assert_eq!(service.get_calls(), 4);
    }

    #[tokio::test]
    async fn cancel_reports_acknowledgement() {
        let service = ScriptedService::with_cancel(true);
        let job = handle(service.clone());
        assert!(job.cancel().await.unwrap());
        assert_eq!(service.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_reports_a_missing_job_as_false() {
        let service = ScriptedService::with_cancel(false);
        let job = handle(service);
        assert!(!job.cancel().await.unwrap());
    }

    #[tokio::test]
    async fn reload_returns_a_fresh_handle() {
        let service = ScriptedService::new(vec![Some(structs::job::Job {
            etag: Some("etag-2".to_string()),
            user_email: Some("robot@example.com".to_string()),
            ..wire_job(Some("DONE"))
        })]);
        let job = handle(service);
        assert!(job.status().is_none());

        let reloaded = job.reload(&[]).await.unwrap().unwrap();
        assert_eq!(reloaded.status().unwrap().state(), State::Done);
        assert_eq!(reloaded.etag(), Some("etag-2"));
        assert_eq!(reloaded.user_email(), Some("robot@example.com"));
        // the original handle is untouched
        assert!(job.status().is_none());
        assert!(job.etag().is_none());
    }

    #[tokio::test]
    async fn reload_of_a_missing_job_returns_none() {
        let service = ScriptedService::new(vec![None]);
        let job = handle(service);
        assert!(job.reload(&[]).await.unwrap().is_none());
    }

    #[test]
    fn from_wire_requires_a_job_reference() {
        let service = ScriptedService::new(vec![]);
        let resource = structs::job::Job {
            status: Some(structs::job_status::JobStatus {
                state: Some("DONE".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            Job::from_wire(service, resource),
            Err(BigQueryError::MissingJobIdInGoogleApiResponse)
        ));
    }

    #[test]
    fn from_wire_parses_the_snapshot() {
        let service = ScriptedService::new(vec![]);
        let job = Job::from_wire(service, wire_job(Some("PENDING"))).unwrap();
        assert_eq!(job.id().to_string(), "my-project:job_1234");
        assert_eq!(job.status().unwrap().state(), State::Pending);
    }

    #[test]
    fn debug_output_omits_the_service_reference() {
        let service = ScriptedService::new(vec![]);
        let job = handle(service);
        let debugged = format!("{:?}", job);
        assert!(debugged.contains("job_1234"));
        assert!(!debugged.contains("service"));
    }
}
