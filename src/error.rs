#[derive(thiserror::Error, Debug)]
pub enum BigQueryError {
    #[error("Authentication error (error: {0})")]
    YupAuthError(#[from] yup_oauth2::Error),
    #[error("Request to google api error (error: {0})")]
    ApiRequestError(#[from] reqwest::Error),
    #[error("Google api returned status {code}: {msg}")]
    ApiResponseError { code: u16, msg: String },
    #[error("Malformed google api response: missing project_id or job_id in job reference")]
    MissingJobIdInGoogleApiResponse,
    #[error("Malformed google api response: missing job state")]
    MissingJobStateInGoogleApiResponse,
    #[error("Unknown job state: {0}")]
    UnknownJobState(String),
    #[error("Timed out waiting for job completion")]
    WaitTimeout,
}
