pub mod client;
pub mod error;
pub mod job;
pub mod job_id;
pub mod job_status;
pub mod service;
pub mod structs;

pub use client::Client;
pub use error::BigQueryError;
pub use job::{Job, WaitOptions};
pub use job_id::JobId;
pub use job_status::{JobStatus, JobStatusBuilder, State};
pub use service::{BigQuery, JobField};
