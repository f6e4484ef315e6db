//! In-process repository. Records are kept in their stored params form so
//! projection-only fields are dropped exactly as the SQLite store drops them.

use super::RecordRepository;
use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{Record, UploadOptions},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct MemoryRecordRepository {
    options: Arc<UploadOptions>,
    rows: Arc<RwLock<HashMap<String, (i64, Map<String, Value>)>>>,
}

impl MemoryRecordRepository {
    pub fn new(options: Arc<UploadOptions>) -> Self {
        Self {
            options,
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Raw stored params, as a backing database would hold them.
    pub async fn stored_params(&self, id: &str) -> Option<Map<String, Value>> {
        self.rows.read().await.get(id).map(|(_, params)| params.clone())
    }
}

#[async_trait]
impl RecordRepository for MemoryRecordRepository {
    async fn find(&self, id: &str) -> AttachmentResult<Option<Record>> {
        let rows = self.rows.read().await;
        rows.get(id)
            .map(|(version, params)| Record::from_params(id, *version, params.clone(), &self.options))
            .transpose()
    }

    async fn insert(&self, record: &Record) -> AttachmentResult<Record> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.id) {
            return Err(AttachmentError::Conflict(record.id.clone()));
        }
        let params = record.to_params(&self.options, false);
        rows.insert(record.id.clone(), (record.version, params.clone()));
        Record::from_params(&record.id, record.version, params, &self.options)
    }

    async fn update(&self, record: &Record) -> AttachmentResult<Record> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&record.id)
            .ok_or_else(|| AttachmentError::RecordNotFound(record.id.clone()))?;
        if row.0 != record.version {
            return Err(AttachmentError::Conflict(record.id.clone()));
        }
        let params = record.to_params(&self.options, false);
        *row = (record.version + 1, params.clone());
        Record::from_params(&record.id, record.version + 1, params, &self.options)
    }

    async fn delete(&self, id: &str) -> AttachmentResult<()> {
        self.rows
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AttachmentError::RecordNotFound(id.to_string()))
    }
}
