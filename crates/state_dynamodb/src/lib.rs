use async_trait::async_trait;
use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::get_item::{GetItemError, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemError, PutItemOutput};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemError, UpdateItemOutput};
use aws_sdk_dynamodb::types::AttributeValue;
use model::JobKey;
use model::clock::audit_time;
use model::record::{FinalUpdate, HistoryEntry, StatusRecord};
use state::StateErrorReason::{BackendFailure, BadState, MissingEntry};
use state::StateOperation::{GetRecord, InsertRecord, UpdateRecord};
use state::{ClaimStore, InsertOutcome, StateError, StateOperation};
use std::collections::HashMap;

const JOB_ID: &str = "JobId";
const OBJ_KEY: &str = "ObjKey";
const CREATED_AT: &str = "CreatedAt";
const STATUS: &str = "Status";
const DETAIL: &str = "Detail";
const EXPIRE_TTL: &str = "ExpireTTL";
const HISTORIES: &str = "Histories";

const ROW_ABSENT: &str = "attribute_not_exists(JobId) AND attribute_not_exists(ObjKey)";
const ROW_PRESENT: &str = "attribute_exists(JobId) AND attribute_exists(ObjKey)";
const FINAL_UPDATE: &str = "SET #time = :upd_time, #stat = :upd_stat, #dtls = :upd_dtls, \
    #ttl = :upd_ttl, #hist = list_append(#hist, :add_hist)";

type Item = HashMap<String, AttributeValue>;
type SdkResult<T, E> = Result<T, SdkError<E, HttpResponse>>;

/// Status table in DynamoDB.
///
/// The table is keyed by `JobId` (partition) and `ObjKey` (sort),
/// with TTL enabled on the `ExpireTTL` attribute.
pub struct DynamoDbClaimStore {
    table_name: String,
    dynamodb_client: aws_sdk_dynamodb::Client,
    consistent_read: bool,
}

impl DynamoDbClaimStore {
    pub fn new(dynamodb_client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        DynamoDbClaimStore {
            table_name: table_name.into(),
            dynamodb_client,
            consistent_read: true,
        }
    }

    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    async fn put_item_if_absent(&self, item: Item) -> SdkResult<PutItemOutput, PutItemError> {
        self.dynamodb_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression(ROW_ABSENT)
            .send()
            .await
    }

    async fn append_final_status(
        &self,
        key: &JobKey,
        update: &FinalUpdate,
        entry: Item,
    ) -> SdkResult<UpdateItemOutput, UpdateItemError> {
        let created_at = AttributeValue::S(audit_time::render(&update.created_at));
        let status = AttributeValue::S(update.status.to_string());
        let detail = AttributeValue::S(update.detail.clone());
        let expire_at = AttributeValue::N(update.expire_at.timestamp().to_string());
        let history = AttributeValue::L(vec![AttributeValue::M(entry)]);

        self.dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key_item(key)))
            .condition_expression(ROW_PRESENT)
            .update_expression(FINAL_UPDATE)
            .expression_attribute_names("#time", CREATED_AT)
            .expression_attribute_names("#stat", STATUS)
            .expression_attribute_names("#dtls", DETAIL)
            .expression_attribute_names("#ttl", EXPIRE_TTL)
            .expression_attribute_names("#hist", HISTORIES)
            .expression_attribute_values(":upd_time", created_at)
            .expression_attribute_values(":upd_stat", status)
            .expression_attribute_values(":upd_dtls", detail)
            .expression_attribute_values(":upd_ttl", expire_at)
            .expression_attribute_values(":add_hist", history)
            .send()
            .await
    }

    async fn get_item(&self, key: &JobKey) -> SdkResult<GetItemOutput, GetItemError> {
        self.dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .consistent_read(self.consistent_read)
            .set_key(Some(key_item(key)))
            .send()
            .await
    }
}

#[async_trait]
impl ClaimStore for DynamoDbClaimStore {
    async fn insert_if_absent(&self, record: &StatusRecord) -> Result<InsertOutcome, StateError> {
        let state_key: String = record.key().to_string();

        let item: Item = serde_dynamo::to_item(record)
            .map_err(|err| bad_state(state_key.clone(), InsertRecord, err))?;

        match self.put_item_if_absent(item).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(PutItemError::is_conditional_check_failed_exception) =>
            {
                Ok(InsertOutcome::AlreadyExists)
            }
            Err(err) => Err(StateError::new(state_key, InsertRecord, BackendFailure(err.into()))),
        }
    }

    async fn update_existing(&self, key: &JobKey, update: &FinalUpdate) -> Result<(), StateError> {
        let state_key: String = key.to_string();

        let entry: HistoryEntry = update.history_entry();
        let entry: Item = serde_dynamo::to_item(&entry)
            .map_err(|err| bad_state(state_key.clone(), UpdateRecord, err))?;

        match self.append_final_status(key, update, entry).await {
            Ok(_) => Ok(()),
            // The row must have been claimed first
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(UpdateItemError::is_conditional_check_failed_exception) =>
            {
                Err(StateError::new(state_key, UpdateRecord, MissingEntry))
            }
            Err(err) => Err(StateError::new(state_key, UpdateRecord, BackendFailure(err.into()))),
        }
    }

    async fn get_record(&self, key: &JobKey) -> Result<Option<StatusRecord>, StateError> {
        let state_key: String = key.to_string();

        let output: GetItemOutput = self.get_item(key).await.map_err(|err| {
            StateError::new(state_key.clone(), GetRecord, BackendFailure(err.into()))
        })?;

        let Some(item) = output.item else {
            return Ok(None);
        };

        serde_dynamo::from_item(item)
            .map(Some)
            .map_err(|err| bad_state(state_key, GetRecord, err))
    }
}

fn key_item(key: &JobKey) -> Item {
    HashMap::from([
        (JOB_ID.to_string(), AttributeValue::S(key.job_id.clone())),
        (OBJ_KEY.to_string(), AttributeValue::S(key.obj_key.clone())),
    ])
}

fn bad_state(state_key: String, operation: StateOperation, err: serde_dynamo::Error) -> StateError {
    StateError::new(state_key, operation, BadState(err.to_string()))
}
