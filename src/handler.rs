use guard::{GuardOutcome, IdempotencyGuard};
use lambda_runtime::{Error, LambdaEvent, tracing};
use model::{ClaimRequest, JobKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;

/// Payload the function is invoked with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct JobEvent {
    pub(crate) job_id: String,
    pub(crate) obj_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobResponse {
    pub(crate) status_code: u16,
    pub(crate) body: String,
}

impl JobResponse {
    fn ok(outcome: &str) -> Self {
        JobResponse {
            status_code: 200,
            body: json!({ "outcome": outcome }).to_string(),
        }
    }
}

/// Run `job` for the event at most once across all attempts.
///
/// Any error returned here fails the invocation, leaving retries to the trigger.
/// A duplicate attempt succeeds without running the job.
pub(crate) async fn job_handler<Job, Fut>(
    guard: &IdempotencyGuard,
    event: LambdaEvent<JobEvent>,
    job: Job,
) -> Result<JobResponse, Error>
where
    Job: FnOnce(JobKey) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let LambdaEvent { payload, context } = event;

    tracing::info!("Handling {payload:?}");
    log_runtime_versions();

    let key: JobKey = JobKey::new(payload.job_id, payload.obj_key);
    let request: ClaimRequest = ClaimRequest::new(
        key.clone(),
        context.request_id.as_str(),
        context.env_config.function_name.as_str(),
    );

    let outcome: GuardOutcome<()> = guard.run(request, || job(key)).await.map_err(|err| {
        tracing::error!(job = %err.key(), "Job invocation failed: {err}");
        err
    })?;

    let response: JobResponse = match outcome {
        GuardOutcome::Executed(()) => JobResponse::ok("executed"),
        GuardOutcome::Duplicate => JobResponse::ok("duplicate"),
    };

    tracing::info!("Finished with {}", response.body);

    Ok(response)
}

fn log_runtime_versions() {
    tracing::info!(
        package = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        arch = std::env::consts::ARCH,
        os = std::env::consts::OS,
        aws_sdk_dynamodb = aws_sdk_dynamodb::meta::PKG_VERSION,
        "Runtime versions"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::json_subscriber;
    use lambda_runtime::Context;
    use model::clock::SystemClock;
    use model::config::LogLevel;
    use model::record::{Status, StatusRecord};
    use state::ClaimStore;
    use state_dynamodb::DynamoDbClaimStore;
    use state_in_memory::InMemoryClaimStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_utils::{CapturedLogs, TEST_TABLE, create_mock_dynamodb_client};
    use tracing_subscriber::util::SubscriberInitExt;

    fn job_event(request_id: &str) -> LambdaEvent<JobEvent> {
        let mut context: Context = Context::default();
        context.request_id = request_id.to_string();

        LambdaEvent::new(
            JobEvent {
                job_id: "J1".to_string(),
                obj_key: "O1".to_string(),
            },
            context,
        )
    }

    fn in_memory() -> (Arc<InMemoryClaimStore>, IdempotencyGuard) {
        let store = Arc::new(InMemoryClaimStore::default());
        let guard = IdempotencyGuard::new(store.clone(), Arc::new(SystemClock));

        (store, guard)
    }

    #[test]
    fn event_uses_table_key_names() {
        let raw: &str = r#"{"JobId": "J1", "ObjKey": "bucket/item.csv"}"#;
        let event: JobEvent = serde_json::from_str(raw).unwrap();

        assert_eq!("J1", event.job_id);
        assert_eq!("bucket/item.csv", event.obj_key);
    }

    #[test]
    fn response_is_an_http_style_ack() {
        let value = serde_json::to_value(JobResponse::ok("executed")).unwrap();

        assert_eq!(
            json!({ "statusCode": 200, "body": "{\"outcome\":\"executed\"}" }),
            value
        );
    }

    #[test]
    fn runtime_versions_name_the_sdk() {
        let logs = CapturedLogs::default();
        let _default = json_subscriber(LogLevel::Info, logs.clone()).set_default();

        log_runtime_versions();

        let event: serde_json::Value = serde_json::from_str(logs.contents().trim()).unwrap();
        assert_eq!("Runtime versions", event["fields"]["message"]);
        assert_eq!(env!("CARGO_PKG_VERSION"), event["fields"]["version"]);
        assert_eq!(
            aws_sdk_dynamodb::meta::PKG_VERSION,
            event["fields"]["aws_sdk_dynamodb"]
        );
    }

    #[tokio::test]
    async fn runs_job_and_records_request() {
        let (store, guard) = in_memory();
        let runs = AtomicUsize::new(0);
        let counter: &AtomicUsize = &runs;

        let response: JobResponse = job_handler(&guard, job_event("req-1"), move |key| async move {
            assert_eq!(JobKey::new("J1", "O1"), key);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .expect("Handler should succeed");

        assert_eq!(JobResponse::ok("executed"), response);
        assert_eq!(1, runs.load(Ordering::SeqCst));

        let record: StatusRecord = store
            .get_record(&JobKey::new("J1", "O1"))
            .await
            .unwrap()
            .expect("Record should exist");
        assert_eq!(Status::Success, record.status);
        assert_eq!("req-1", record.request_id);
    }

    #[tokio::test]
    async fn retried_event_is_absorbed() {
        let (_, guard) = in_memory();
        let runs = AtomicUsize::new(0);
        let counter: &AtomicUsize = &runs;
        let job = move |_: JobKey| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), Error>(())
        };

        job_handler(&guard, job_event("req-1"), job)
            .await
            .expect("First attempt should succeed");
        let response: JobResponse = job_handler(&guard, job_event("req-2"), job)
            .await
            .expect("Retry should succeed");

        assert_eq!(JobResponse::ok("duplicate"), response);
        assert_eq!(1, runs.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_job_fails_invocation() {
        let (store, guard) = in_memory();

        let job = |_: JobKey| async { Err::<(), Error>("disk full".into()) };

        let err: Error = job_handler(&guard, job_event("req-1"), job)
            .await
            .expect_err("Handler should fail");
        assert!(err.to_string().contains("disk full"));

        let record: StatusRecord = store
            .get_record(&JobKey::new("J1", "O1"))
            .await
            .unwrap()
            .expect("Record should exist");
        assert_eq!(Status::Error, record.status);
        assert_eq!("disk full", record.detail);
    }

    #[tokio::test]
    async fn runs_against_dynamodb_store() {
        let store = DynamoDbClaimStore::new(create_mock_dynamodb_client(), TEST_TABLE);
        let guard = IdempotencyGuard::new(Arc::new(store), Arc::new(SystemClock));

        let job = |_: JobKey| async { Ok::<(), Error>(()) };

        let response: JobResponse = job_handler(&guard, job_event("req-1"), job)
            .await
            .expect("Handler should succeed");

        assert_eq!(JobResponse::ok("executed"), response);
    }
}
