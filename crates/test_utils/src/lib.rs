use async_trait::async_trait;
use aws_sdk_dynamodb::operation::put_item::PutItemOutput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemOutput;
use aws_smithy_mocks::{Rule, RuleMode, mock, mock_client};
use chrono::{DateTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use model::JobKey;
use model::clock::{AUDIT_TIME_ZONE, Clock};
use model::record::{FinalUpdate, StatusRecord};
use state::StateErrorReason::BackendFailure;
use state::StateOperation::{InsertRecord, UpdateRecord};
use state::{ClaimStore, InsertOutcome, StateError};
use state_in_memory::InMemoryClaimStore;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Test status table name
pub const TEST_TABLE: &str = "job_status";

/// A clock which only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Tz>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        ManualClock {
            now: Mutex::new(now),
        }
    }

    /// 2024-05-01 09:00:00 in the audit time zone
    pub fn at_default_start() -> Self {
        let start: DateTime<Tz> = AUDIT_TIME_ZONE
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .unwrap();

        Self::new(start)
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap();
        *now = *now + delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock().unwrap()
    }
}

/// In-memory store which counts calls and can be told to fail them.
pub struct ScriptedClaimStore {
    inner: InMemoryClaimStore,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl ScriptedClaimStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        ScriptedClaimStore {
            inner: InMemoryClaimStore::new(clock),
            fail_insert: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn failing_updates(clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(clock);
        store.fail_update.store(true, Ordering::SeqCst);
        store
    }

    /// Insert attempts, whether or not they won
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClaimStore for ScriptedClaimStore {
    async fn insert_if_absent(&self, record: &StatusRecord) -> Result<InsertOutcome, StateError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);

        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(StateError::new(
                record.key().to_string(),
                InsertRecord,
                BackendFailure("connection reset".into()),
            ));
        }

        self.inner.insert_if_absent(record).await
    }

    async fn update_existing(&self, key: &JobKey, update: &FinalUpdate) -> Result<(), StateError> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StateError::new(
                key.to_string(),
                UpdateRecord,
                BackendFailure("network partition".into()),
            ));
        }

        self.inner.update_existing(key, update).await
    }

    async fn get_record(&self, key: &JobKey) -> Result<Option<StatusRecord>, StateError> {
        self.inner.get_record(key).await
    }
}

/// A default mock DynamoDB client which accepts every claim and final update
pub fn create_mock_dynamodb_client() -> aws_sdk_dynamodb::Client {
    let put_item_rule: Rule = mock!(aws_sdk_dynamodb::Client::put_item)
        .match_requests(|_| true)
        .sequence()
        .output(|| PutItemOutput::builder().build())
        .repeatedly()
        .build();

    let update_item_rule: Rule = mock!(aws_sdk_dynamodb::Client::update_item)
        .match_requests(|_| true)
        .sequence()
        .output(|| UpdateItemOutput::builder().build())
        .repeatedly()
        .build();

    mock_client!(
        aws_sdk_dynamodb,
        RuleMode::MatchAny,
        [&put_item_rule, &update_item_rule]
    )
}

/// Log sink for asserting on what a subscriber wrote.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
