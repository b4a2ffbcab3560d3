use anyhow::{Context, Result};
use bq_jobs::{Client, JobId, WaitOptions};

const USAGE: &str = "usage: bq_jobs <project_id> <job_id> [location]";

async fn authenticator() -> Result<yup_oauth2::authenticator::DefaultAuthenticator> {
    let secret_path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").unwrap_or_else(|_| {
        format!(
            "{}/.config/gcloud/application_default_credentials.json",
            std::env::var("HOME").unwrap_or_default()
        )
    });
    let secret = yup_oauth2::read_authorized_user_secret(&secret_path)
        .await
        .with_context(|| format!("failed to read credentials from {}", secret_path))?;
    yup_oauth2::AuthorizedUserAuthenticator::builder(secret)
        .build()
        .await
        .context("failed to create authenticator")
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let project_id = args.next().context(USAGE)?;
    let job_id = args.next().context(USAGE)?;

    let mut id = JobId::new(project_id, job_id);
    if let Some(location) = args.next() {
        id = id.with_location(location);
    }

    let client = Client::new(authenticator().await?);
    let job = client.job(id);

    println!("Waiting for job {} ...", job.id());
    match job.wait_for(WaitOptions::default()).await? {
        None => println!("Job no longer exists"),
        Some(completed) => match completed.status().and_then(|status| status.error()) {
            Some(error) => println!(
                "Job failed: {}",
                error.message.as_deref().unwrap_or("unknown error")
            ),
            None => println!("Job completed successfully"),
        },
    }
    Ok(())
}
