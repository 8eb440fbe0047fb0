//! In-memory collaborators for tests.
//!
//! Every fake records what it was asked so tests can assert on side effects,
//! including those made by handlers after their invocation timed out.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::collaborators::{
    Attributes, HttpFetcher, HttpMethod, LogSink, SecretPayload, SecretStore, TableStore, WriteAck,
};
use crate::error::CollaboratorError;

/// Keeps every emitted log in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    logs: Mutex<Vec<Value>>,
}

impl RecordingSink {
    pub fn logs(&self) -> Vec<Value> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, log: &Value) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(log.clone());
    }
}

#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, SecretPayload>,
}

impl MemorySecretStore {
    pub fn with_text(mut self, name: &str, text: &str) -> Self {
        self.secrets
            .insert(name.to_string(), SecretPayload::Text(text.to_string()));
        self
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<SecretPayload, CollaboratorError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| CollaboratorError::Secret {
                name: name.to_string(),
                message: "secret not found".to_string(),
            })
    }
}

type RecordKey = (String, String, String);

#[derive(Debug, Default)]
pub struct MemoryTableStore {
    records: Mutex<HashMap<RecordKey, Attributes>>,
}

impl MemoryTableStore {
    pub fn record(&self, table: &str, partition_key: &str, sort_key: &str) -> Option<Attributes> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(table, partition_key, sort_key))
            .cloned()
    }
}

fn key(table: &str, partition_key: &str, sort_key: &str) -> RecordKey {
    (
        table.to_string(),
        partition_key.to_string(),
        sort_key.to_string(),
    )
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn get_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Attributes>, CollaboratorError> {
        Ok(self.record(table, partition_key, sort_key))
    }

    async fn put_record(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: &str,
        attributes: Attributes,
    ) -> Result<WriteAck, CollaboratorError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(table, partition_key, sort_key), attributes);
        Ok(WriteAck {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
            sort_key: sort_key.to_string(),
        })
    }
}

/// Answers every request with the same body and records the calls.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    body: String,
    calls: Mutex<Vec<(String, HttpMethod)>>,
}

impl StaticFetcher {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, HttpMethod)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HttpFetcher for StaticFetcher {
    async fn outbound_request(
        &self,
        url: &str,
        method: HttpMethod,
    ) -> Result<String, CollaboratorError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_string(), method));
        Ok(self.body.clone())
    }
}
