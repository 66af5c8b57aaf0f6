use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod clock;
pub mod config;
pub mod env;
pub mod record;

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Composite key identifying one job invocation.
/// At most one status record exists per key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub struct JobKey {
    pub job_id: String,
    pub obj_key: String,
}

impl JobKey {
    pub fn new(job_id: impl Into<String>, obj_key: impl Into<String>) -> Self {
        JobKey {
            job_id: job_id.into(),
            obj_key: obj_key.into(),
        }
    }
}

impl Display for JobKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.job_id, self.obj_key)
    }
}

/// Everything needed to attempt a claim for one invocation attempt.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub key: JobKey,
    // Unique per attempt, supplied by the runtime
    pub request_id: String,
    pub invoker_name: String,
    pub detail: String,
}

impl ClaimRequest {
    pub fn new(
        key: JobKey,
        request_id: impl Into<String>,
        invoker_name: impl Into<String>,
    ) -> Self {
        ClaimRequest {
            key,
            request_id: request_id.into(),
            invoker_name: invoker_name.into(),
            detail: String::new(),
        }
    }
}
