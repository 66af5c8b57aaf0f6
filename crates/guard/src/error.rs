use model::JobKey;
use state::StateError;
use thiserror::Error;

/// Ways a guarded invocation attempt can fail.
///
/// A lost claim is not among them: a duplicate attempt is a successful no-op.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("failed to claim {key}: {source}")]
    Claim {
        key: JobKey,
        #[source]
        source: StateError,
    },

    // The record may be left running until its TTL elapses
    #[error("failed to record final status for {key}: {source}")]
    Finalize {
        key: JobKey,
        #[source]
        source: StateError,
    },

    #[error("job {key} was not successful: {detail}")]
    JobFailed { key: JobKey, detail: String },
}

impl GuardError {
    pub fn key(&self) -> &JobKey {
        match self {
            GuardError::Claim { key, .. } => key,
            GuardError::Finalize { key, .. } => key,
            GuardError::JobFailed { key, .. } => key,
        }
    }
}
