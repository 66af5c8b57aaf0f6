use crate::error::GuardError;
use model::JobKey;
use model::clock::Clock;
use model::record::{Completion, FinalUpdate, StatusRecord};
use state::ClaimStore;
use std::sync::Arc;

/// Exclusive ownership of a job invocation, held by the attempt that won the claim.
///
/// Consuming the claim with [`Claim::finalize`] writes the terminal status.
/// Only a won claim can be finalized, and only once.
#[must_use = "a won claim must be finalized or the record stays running until its TTL"]
pub struct Claim {
    record: StatusRecord,
    store: Arc<dyn ClaimStore>,
    clock: Arc<dyn Clock>,
    finalized: bool,
}

impl Claim {
    pub(crate) fn new(
        record: StatusRecord,
        store: Arc<dyn ClaimStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Claim {
            record,
            store,
            clock,
            finalized: false,
        }
    }

    /// The record as written by the claim.
    pub fn record(&self) -> &StatusRecord {
        &self.record
    }

    pub fn key(&self) -> JobKey {
        self.record.key()
    }

    /// Record how the job ended, refreshing the TTL and appending to the history.
    /// Returns the record as it now stands in the store.
    pub async fn finalize(mut self, completion: Completion) -> Result<StatusRecord, GuardError> {
        self.finalized = true;

        let key: JobKey = self.key();
        let update: FinalUpdate = FinalUpdate::new(&completion, self.clock.now());

        tracing::debug!(status = %update.status, "Writing final status");

        if let Err(source) = self.store.update_existing(&key, &update).await {
            tracing::error!("Failed to write final status: {source}");

            return Err(GuardError::Finalize { key, source });
        }

        let mut record: StatusRecord = self.record.clone();
        record.apply(&update);

        Ok(record)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.finalized {
            tracing::warn!(
                job_id = self.record.job_id.as_str(),
                obj_key = self.record.obj_key.as_str(),
                "Claim dropped without a final status, record stays running until {}",
                self.record.expire_at
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdempotencyGuard;
    use model::ClaimRequest;
    use state_in_memory::InMemoryClaimStore;
    use test_utils::{CapturedLogs, ManualClock};
    use tracing::Level;

    const ABANDONED: &str = "Claim dropped without a final status";

    async fn won_claim(guard: &IdempotencyGuard) -> Claim {
        let request = ClaimRequest::new(JobKey::new("J1", "O1"), "req-1", "job-fn");

        guard
            .claim(request)
            .await
            .expect("Claim should not fail")
            .expect("Claim should be won")
    }

    fn in_memory_guard() -> IdempotencyGuard {
        let clock = Arc::new(ManualClock::at_default_start());

        IdempotencyGuard::new(Arc::new(InMemoryClaimStore::new(clock.clone())), clock)
    }

    fn capture() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .finish();

        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn dropping_unfinalized_claim_warns() {
        let (logs, _default) = capture();
        let guard = in_memory_guard();

        let claim: Claim = won_claim(&guard).await;
        drop(claim);

        let output: String = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains(ABANDONED));
        assert!(output.contains("job_id") && output.contains("J1"));
    }

    #[tokio::test]
    async fn finalized_claim_drops_quietly() {
        let (logs, _default) = capture();
        let guard = in_memory_guard();

        let claim: Claim = won_claim(&guard).await;
        claim
            .finalize(Completion::Success)
            .await
            .expect("Finalize should succeed");

        assert!(!logs.contents().contains(ABANDONED));
    }
}
