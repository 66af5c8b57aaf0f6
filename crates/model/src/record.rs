use crate::clock::{audit_time, expire_at};
use crate::{ClaimRequest, JobKey};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Lifecycle state of a job invocation.
/// A record only ever moves from `Running` to one of the terminal states.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Success,
    Error,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Status::Running => "running",
            Status::Success => "success",
            Status::Error => "error",
        })
    }
}

/// How the protected job ended. Only terminal states can be finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success,
    Error(String),
}

impl Completion {
    pub fn status(&self) -> Status {
        match self {
            Completion::Success => Status::Success,
            Completion::Error(_) => Status::Error,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Completion::Success => "",
            Completion::Error(detail) => detail,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEntry {
    #[serde(with = "audit_time")]
    pub created_at: DateTime<Tz>,
    pub status: Status,
    pub detail: String,
}

/// One row of the status table.
///
/// Field names follow the table's attribute names.
/// `created_at` is the time of the most recent write, not of the first one.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct StatusRecord {
    pub job_id: String,
    pub obj_key: String,
    #[serde(rename = "RequestID")]
    pub request_id: String,
    #[serde(rename = "Function")]
    pub invoker_name: String,
    pub status: Status,
    pub detail: String,
    #[serde(with = "audit_time")]
    pub created_at: DateTime<Tz>,
    #[serde(rename = "ExpireTTL", with = "chrono::serde::ts_seconds")]
    pub expire_at: DateTime<Utc>,
    pub histories: Vec<HistoryEntry>,
}

impl StatusRecord {
    /// A freshly claimed record, seeded with a single history entry.
    pub fn running(request: ClaimRequest, now: DateTime<Tz>) -> Self {
        let ClaimRequest {
            key,
            request_id,
            invoker_name,
            detail,
        } = request;

        let seed: HistoryEntry = HistoryEntry {
            created_at: now,
            status: Status::Running,
            detail: detail.clone(),
        };

        StatusRecord {
            job_id: key.job_id,
            obj_key: key.obj_key,
            request_id,
            invoker_name,
            status: Status::Running,
            detail,
            created_at: now,
            expire_at: expire_at(&now),
            histories: vec![seed],
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.job_id.clone(), self.obj_key.clone())
    }

    pub fn is_expired(&self, now: &DateTime<Tz>) -> bool {
        self.expire_at <= now.with_timezone(&Utc)
    }

    /// Mirror of the store-side update performed by finalize.
    pub fn apply(&mut self, update: &FinalUpdate) {
        debug_assert!(update.status.is_terminal(), "final status must be terminal");

        self.status = update.status;
        self.detail = update.detail.clone();
        self.created_at = update.created_at;
        self.expire_at = update.expire_at;
        self.histories.push(update.history_entry());
    }
}

/// Fields written by finalize. The store sets them and appends one history entry atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalUpdate {
    pub status: Status,
    pub detail: String,
    pub created_at: DateTime<Tz>,
    pub expire_at: DateTime<Utc>,
}

impl FinalUpdate {
    pub fn new(completion: &Completion, now: DateTime<Tz>) -> Self {
        FinalUpdate {
            status: completion.status(),
            detail: completion.detail().to_string(),
            created_at: now,
            expire_at: expire_at(&now),
        }
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            created_at: self.created_at,
            status: self.status,
            detail: self.detail.clone(),
        }
    }
}
