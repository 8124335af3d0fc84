use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{check_status, FirebaseError, GoogleTokenSource};
use crate::models::record::SortingRecord;

const RECORDS_PATH: &str = "records";

/// Append-only store of sorting records.
///
/// Carried in `AppState` as `Arc<dyn RecordStore>`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Appends one record under a generated key and returns the key.
    async fn append(&self, record: &SortingRecord) -> Result<String, FirebaseError>;

    /// The record with the highest timestamp, or `None` when the store is empty.
    async fn latest(&self) -> Result<Option<SortingRecord>, FirebaseError>;
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Realtime Database REST client for the `records` list.
pub struct RealtimeRecords {
    client: Client,
    tokens: GoogleTokenSource,
    records_url: String,
}

impl RealtimeRecords {
    pub fn new(client: Client, tokens: GoogleTokenSource, database_url: &str) -> Self {
        Self {
            client,
            tokens,
            records_url: format!("{}/{RECORDS_PATH}.json", database_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl RecordStore for RealtimeRecords {
    async fn append(&self, record: &SortingRecord) -> Result<String, FirebaseError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&self.records_url)
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;
        let pushed: PushResponse = check_status(response).await?.json().await?;
        debug!("Appended record {}", pushed.name);
        Ok(pushed.name)
    }

    // Reads the whole list on every call; fine while the collection stays small.
    async fn latest(&self) -> Result<Option<SortingRecord>, FirebaseError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(&self.records_url)
            .bearer_auth(token)
            .send()
            .await?;
        let body: Value = check_status(response).await?.json().await?;

        match body {
            Value::Null => Ok(None),
            Value::Object(records) => Ok(latest_by_timestamp(&records)),
            other => Err(FirebaseError::Malformed(format!(
                "expected an object at /{RECORDS_PATH}, got {other}"
            ))),
        }
    }
}

/// Linear scan for the record with the greatest timestamp. Entries that do not decode
/// as a [`SortingRecord`] are skipped.
pub fn latest_by_timestamp(records: &Map<String, Value>) -> Option<SortingRecord> {
    records
        .iter()
        .filter_map(
            |(key, value)| match serde_json::from_value::<SortingRecord>(value.clone()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping malformed record {key}: {e}");
                    None
                }
            },
        )
        .max_by_key(|record| record.timestamp)
}
