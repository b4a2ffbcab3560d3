use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use yup_oauth2::authenticator::DefaultAuthenticator;

use crate::error::BigQueryError;
use crate::job::Job;
use crate::job_id::JobId;
use crate::service::{BigQuery, JobField};
use crate::structs;

const API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const SCOPES: &[&str; 1] = &["https://www.googleapis.com/auth/bigquery"];

#[derive(Clone)]
struct InnerClient {
    authenticator: DefaultAuthenticator,
    reqwest_client: reqwest::Client,
}

/// REST client for the BigQuery v2 jobs surface. Cheap to clone; all clones
/// share one connection pool and one authenticator.
///
/// The authenticator is built by the caller; this client only attaches the
/// bearer token it is handed. Requests are issued exactly once, with no
/// retrying.
#[derive(Clone)]
pub struct Client {
    inner_client: Arc<InnerClient>,
    base_url: String,
}

impl Client {
    pub fn new(authenticator: DefaultAuthenticator) -> Self {
        Self::with_base_url(authenticator, API_URL.to_string())
    }

    /// Points the client at a custom endpoint (useful for testing).
    pub fn with_base_url(authenticator: DefaultAuthenticator, base_url: String) -> Self {
        Client {
            inner_client: Arc::new(InnerClient {
                authenticator,
                reqwest_client: reqwest::Client::new(),
            }),
            base_url,
        }
    }

    /// Returns a handle for the given job id without contacting the service.
    pub fn job(&self, id: JobId) -> Job {
        Job::attach(Arc::new(self.clone()), id)
    }
}

fn job_url(base_url: &str, id: &JobId) -> String {
    format!(
        "{base_url}/projects/{project_id}/jobs/{job_id}",
        base_url = base_url,
        project_id = id.project_id(),
        job_id = id.job_id(),
    )
}

fn cancel_url(base_url: &str, id: &JobId) -> String {
    format!("{}/cancel", job_url(base_url, id))
}

fn get_job_params(id: &JobId, fields: &[JobField]) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if !fields.is_empty() {
        params.push(("fields", JobField::selector_for(fields)));
    }
    if let Some(location) = id.location() {
        params.push(("location", location.to_string()));
    }
    params
}

async fn error_for_response(res: reqwest::Response) -> Result<reqwest::Response, BigQueryError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let msg = res
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(BigQueryError::ApiResponseError {
        code: status.as_u16(),
        msg,
    })
}

#[async_trait]
impl BigQuery for Client {
    async fn get_job(
        &self,
        id: &JobId,
        fields: &[JobField],
    ) -> Result<Option<structs::job::Job>, BigQueryError> {
        let api_url = job_url(&self.base_url, id);
        debug!("GET {}", api_url);
        let tok = self.inner_client.authenticator.token(SCOPES).await?;
        let res = self
            .inner_client
            .reqwest_client
            .get(api_url)
            .query(&get_job_params(id, fields))
            .bearer_auth(tok.as_str())
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let res = error_for_response(res).await?;
        let job: structs::job::Job = res.json().await?;
        Ok(Some(job))
    }

    async fn cancel_job(&self, id: &JobId) -> Result<bool, BigQueryError> {
        let api_url = cancel_url(&self.base_url, id);
        debug!("POST {}", api_url);
        let tok = self.inner_client.authenticator.token(SCOPES).await?;
        let mut req = self
            .inner_client
            .reqwest_client
            .post(api_url)
            .bearer_auth(tok.as_str());
        if let Some(location) = id.location() {
            req = req.query(&[("location", location)]);
        }
        let res = req.send().await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        error_for_response(res).await?;
        Ok(true)
    }
}
