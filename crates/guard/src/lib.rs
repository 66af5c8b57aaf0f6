//! Idempotency guard for at-least-once job invocations.
//!
//! An attempt first claims the `(JobId, ObjKey)` pair with a conditional insert.
//! Only the attempt which wins the claim runs the job, and that attempt always
//! records the final status afterwards. Losing attempts return without doing anything.
//!
//! ```ignore
//! let guard = IdempotencyGuard::new(Arc::new(store), Arc::new(SystemClock));
//! let request = ClaimRequest::new(JobKey::new("J1", "O1"), request_id, function_name);
//!
//! match guard.run(request, || process(item)).await? {
//!     GuardOutcome::Executed(output) => tracing::info!("Processed {output:?}"),
//!     GuardOutcome::Duplicate => tracing::info!("Already handled by another attempt"),
//! }
//! ```

use futures::FutureExt;
use model::clock::Clock;
use model::record::{Completion, Status, StatusRecord};
use model::{ClaimRequest, JobKey};
use state::{ClaimStore, InsertOutcome};
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, Span};

pub use crate::claim::Claim;
pub use crate::error::GuardError;

mod claim;
mod error;

/// Result of a guarded invocation attempt which did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// This attempt won the claim and the job ran successfully.
    Executed(T),
    /// Another attempt already holds or held the claim, the job was not run.
    Duplicate,
}

impl<T> GuardOutcome<T> {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, GuardOutcome::Duplicate)
    }
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn ClaimStore>,
    clock: Arc<dyn Clock>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn ClaimStore>, clock: Arc<dyn Clock>) -> Self {
        IdempotencyGuard { store, clock }
    }

    /// Try to take exclusive ownership of the job invocation.
    ///
    /// Returns `None` when a record for the key already exists.
    /// Store faults are errors and are never read as a lost claim.
    pub async fn claim(&self, request: ClaimRequest) -> Result<Option<Claim>, GuardError> {
        let key: JobKey = request.key.clone();
        let record: StatusRecord = StatusRecord::running(request, self.clock.now());

        let outcome: InsertOutcome = self
            .store
            .insert_if_absent(&record)
            .await
            .map_err(|source| GuardError::Claim { key, source })?;

        match outcome {
            InsertOutcome::Inserted => {
                tracing::debug!("Claim won");

                Ok(Some(Claim::new(record, self.store.clone(), self.clock.clone())))
            }
            InsertOutcome::AlreadyExists => Ok(None),
        }
    }

    /// Claim the invocation, run `operation` if the claim was won, then record its outcome.
    ///
    /// The final status is written whenever the claim was won, including when the
    /// operation fails or panics. A failure to write it takes precedence over the
    /// operation's own result. An operation failure is reported as `JobFailed` once
    /// the status has been written.
    pub async fn run<Operation, Fut, T, E>(
        &self,
        request: ClaimRequest,
        operation: Operation,
    ) -> Result<GuardOutcome<T>, GuardError>
    where
        Operation: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let span: Span = tracing::info_span!(
            "Guarded job",
            job_id = request.key.job_id.as_str(),
            obj_key = request.key.obj_key.as_str(),
            request_id = request.request_id.as_str(),
        );

        self.run_claimed(request, operation).instrument(span).await
    }

    async fn run_claimed<Operation, Fut, T, E>(
        &self,
        request: ClaimRequest,
        operation: Operation,
    ) -> Result<GuardOutcome<T>, GuardError>
    where
        Operation: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let Some(claim) = self.claim(request).await? else {
            tracing::warn!("Invocation already claimed by another attempt, skipping job");

            return Ok(GuardOutcome::Duplicate);
        };

        tracing::info!("Job started");

        let result = AssertUnwindSafe(async move { operation().await })
            .catch_unwind()
            .await;

        let (completion, output): (Completion, Option<T>) = match result {
            Ok(Ok(output)) => {
                tracing::info!("Job finished");
                (Completion::Success, Some(output))
            }
            Ok(Err(err)) => {
                tracing::error!("Job failed: {err}");
                (Completion::Error(err.to_string()), None)
            }
            Err(panic) => {
                let detail: String = panic_detail(panic);
                tracing::error!("Job panicked: {detail}");
                (Completion::Error(detail), None)
            }
        };

        let record: StatusRecord = claim.finalize(completion).await?;

        match (record.status, output) {
            (Status::Success, Some(output)) => Ok(GuardOutcome::Executed(output)),
            _ => {
                tracing::error!("{}", record.detail);

                Err(GuardError::JobFailed {
                    key: record.key(),
                    detail: record.detail,
                })
            }
        }
    }
}

fn panic_detail(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "job panicked".to_string()
    }
}
