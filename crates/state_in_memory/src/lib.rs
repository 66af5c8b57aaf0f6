use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use model::JobKey;
use model::clock::{Clock, SystemClock};
use model::record::{FinalUpdate, StatusRecord};
use state::StateErrorReason::{BackendFailure, MissingEntry};
use state::StateOperation::{GetRecord, InsertRecord, UpdateRecord};
use state::{ClaimStore, InsertOutcome, StateError, StateOperation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Claim store held in process memory.
///
/// Rows past their expiry are treated as absent, the same as a table whose TTL sweep
/// has already run.
pub struct InMemoryClaimStore {
    records: Arc<Mutex<HashMap<JobKey, StatusRecord>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryClaimStore {
    fn default() -> Self {
        InMemoryClaimStore::new(Arc::new(SystemClock))
    }
}

impl InMemoryClaimStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        InMemoryClaimStore {
            records: Arc::new(Mutex::new(Default::default())),
            clock,
        }
    }

    /// Drop every expired row, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StateError> {
        let now: DateTime<Tz> = self.clock.now();
        let mut records = self.lock("*", GetRecord)?;

        let before: usize = records.len();
        records.retain(|_, record| !record.is_expired(&now));

        Ok(before - records.len())
    }

    fn lock(
        &self,
        state_key: &str,
        operation: StateOperation,
    ) -> Result<MutexGuard<'_, HashMap<JobKey, StatusRecord>>, StateError> {
        self.records.lock().map_err(|err| {
            StateError::new(
                state_key.to_string(),
                operation,
                BackendFailure(err.to_string().into()),
            )
        })
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn insert_if_absent(&self, record: &StatusRecord) -> Result<InsertOutcome, StateError> {
        let key: JobKey = record.key();
        let now: DateTime<Tz> = self.clock.now();
        let mut records = self.lock(&key.to_string(), InsertRecord)?;

        if let Some(existing) = records.get(&key) {
            if !existing.is_expired(&now) {
                return Ok(InsertOutcome::AlreadyExists);
            }
        }

        records.insert(key, record.clone());

        Ok(InsertOutcome::Inserted)
    }

    async fn update_existing(&self, key: &JobKey, update: &FinalUpdate) -> Result<(), StateError> {
        let state_key: String = key.to_string();
        let mut records = self.lock(&state_key, UpdateRecord)?;

        let record: &mut StatusRecord = records
            .get_mut(key)
            .ok_or_else(|| StateError::new(state_key.clone(), UpdateRecord, MissingEntry))?;

        record.apply(update);

        Ok(())
    }

    async fn get_record(&self, key: &JobKey) -> Result<Option<StatusRecord>, StateError> {
        let now: DateTime<Tz> = self.clock.now();
        let records = self.lock(&key.to_string(), GetRecord)?;

        Ok(records
            .get(key)
            .filter(|record| !record.is_expired(&now))
            .cloned())
    }
}
