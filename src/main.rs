use crate::handler::{JobEvent, job_handler};
use aws_config::{BehaviorVersion, SdkConfig};
use guard::IdempotencyGuard;
use lambda_runtime::{Error, LambdaEvent, service_fn, tracing};
use model::clock::SystemClock;
use model::config::GuardConfig;
use state_dynamodb::DynamoDbClaimStore;
use std::sync::Arc;

mod handler;
mod job;
mod logger;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config: GuardConfig = GuardConfig::from_env();
    logger::init(config.log_level);

    tracing::info!("Starting with {config:?}");

    let sdk_config: SdkConfig = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let dynamodb: aws_sdk_dynamodb::Client = aws_sdk_dynamodb::Client::new(&sdk_config);
    let store: DynamoDbClaimStore = DynamoDbClaimStore::new(dynamodb, config.table_name.as_str());

    let guard = IdempotencyGuard::new(Arc::new(store), Arc::new(SystemClock));
    let guard: Arc<IdempotencyGuard> = Arc::new(guard);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<JobEvent>| {
        let guard: Arc<IdempotencyGuard> = guard.clone();

        async move { job_handler(&guard, event, job::process).await }
    }))
    .await
}
