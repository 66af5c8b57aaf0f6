use lambda_runtime::tracing;
use model::{Error, JobKey};
use std::time::Duration;

/// The protected work for one job invocation.
pub(crate) async fn process(key: JobKey) -> Result<(), Error> {
    tracing::info!("Processing {key}");

    // Placeholder for the real work
    tokio::time::sleep(Duration::from_secs(1)).await;

    tracing::info!("Processed {key}");

    Ok(())
}
