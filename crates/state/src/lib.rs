use async_trait::async_trait;
use model::Error;
use model::JobKey;
use model::record::{FinalUpdate, StatusRecord};
use std::fmt::{Display, Formatter};

/// Durable storage of status records, keyed by `(JobId, ObjKey)`.
///
/// Implementations must make `insert_if_absent` an atomic test-and-set over the key.
/// It is the only point where concurrent attempts synchronise.
/// Rows may also be removed by the backend once their expiry has passed.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Insert the record only if no row exists for its key.
    async fn insert_if_absent(&self, record: &StatusRecord) -> Result<InsertOutcome, StateError>;

    /// Set the final fields of an existing row and append one history entry.
    /// Fails with `MissingEntry` when the row does not exist.
    async fn update_existing(&self, key: &JobKey, update: &FinalUpdate) -> Result<(), StateError>;

    async fn get_record(&self, key: &JobKey) -> Result<Option<StatusRecord>, StateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    // A row for the key exists already
    AlreadyExists,
}

/// Errors arising from reading or writing state.
#[derive(Debug)]
pub struct StateError {
    pub state_key: String,

    pub operation: StateOperation,
    pub reason: StateErrorReason,
}

#[derive(Debug)]
pub enum StateErrorReason {
    // An expected state entry was missing.
    MissingEntry,
    // The state could not be converted to or from a record
    BadState(String),
    // An error from the underlying state store
    BackendFailure(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOperation {
    InsertRecord,
    UpdateRecord,
    GetRecord,
}

impl StateError {
    pub fn new(state_key: String, operation: StateOperation, reason: StateErrorReason) -> Self {
        StateError {
            state_key,
            operation,
            reason,
        }
    }

    pub fn is_missing_entry(&self) -> bool {
        matches!(self.reason, StateErrorReason::MissingEntry)
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} of {} failed: ", self.operation, self.state_key)?;

        match &self.reason {
            StateErrorReason::MissingEntry => f.write_str("no such record"),
            StateErrorReason::BadState(msg) => write!(f, "bad state {msg}"),
            StateErrorReason::BackendFailure(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.reason {
            StateErrorReason::BackendFailure(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation_and_key() {
        let err = StateError::new(
            "J1/O1".to_string(),
            StateOperation::UpdateRecord,
            StateErrorReason::MissingEntry,
        );

        assert_eq!(
            "UpdateRecord of J1/O1 failed: no such record",
            err.to_string()
        );
        assert!(err.is_missing_entry());
    }

    #[test]
    fn backend_failure_exposes_source() {
        let err = StateError::new(
            "J1/O1".to_string(),
            StateOperation::InsertRecord,
            StateErrorReason::BackendFailure("throttled".into()),
        );

        assert_eq!("InsertRecord of J1/O1 failed: throttled", err.to_string());
        assert!(std::error::Error::source(&err).is_some());
    }
}
