//! Entry point tying the orchestrators together for one record action.
//!
//! A write runs uploads first, then deletions, then projects paths for the
//! response. Writes to the same record are serialized in-process; the
//! repository's version check rejects anything that still races across
//! processes.

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{ActionContext, Record, RecordJson, UploadOptions},
    providers::Provider,
    repositories::RecordRepository,
    services::{
        delete_service::DeletionOrchestrator,
        path_resolver::PathResolver,
        payload::{WritePayload, parse_delete_markers},
        upload_service::UploadOrchestrator,
    },
};
use axum::http::Method;
use serde_json::{Map, Value};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a write: the record with resolved paths and the slot positions
/// the write asked to delete.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub record: Record,
    pub deleted: BTreeSet<usize>,
}

impl WriteOutcome {
    /// Record JSON with the delete marker echoed back under
    /// `<deleteMarker>.<file>`.
    pub fn to_json(&self, options: &UploadOptions) -> RecordJson {
        let mut json = self.record.to_json(options);
        if !self.deleted.is_empty() {
            let props = options.properties();
            let indices: Vec<String> = self.deleted.iter().map(ToString::to_string).collect();
            let mut marker = Map::new();
            marker.insert(props.file.clone(), Value::from(indices));
            json.params
                .insert(props.delete_marker.clone(), Value::Object(marker));
        }
        json
    }
}

#[derive(Clone)]
pub struct AttachmentService {
    options: Arc<UploadOptions>,
    provider: Arc<dyn Provider>,
    repository: Arc<dyn RecordRepository>,
    uploads: UploadOrchestrator,
    deletions: DeletionOrchestrator,
    paths: PathResolver,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AttachmentService {
    pub fn new(
        options: Arc<UploadOptions>,
        provider: Arc<dyn Provider>,
        repository: Arc<dyn RecordRepository>,
    ) -> Self {
        Self {
            uploads: UploadOrchestrator::new(options.clone(), provider.clone(), repository.clone()),
            deletions: DeletionOrchestrator::new(provider.clone(), repository.clone()),
            paths: PathResolver::new(provider.clone()),
            options,
            provider,
            repository,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Create a record with the given plain params and no attachment.
    pub async fn create(&self, params: Map<String, Value>) -> AttachmentResult<Record> {
        self.ensure_plain_params(&params)?;
        let mut record = Record::new(Uuid::new_v4().to_string(), &self.options);
        record.params = params;
        let record = self.repository.insert(&record).await?;
        info!(record = %record.id, "created record");
        Ok(record)
    }

    /// Fetch a record and project retrievable paths onto a copy of it.
    pub async fn show(&self, id: &str, ctx: &ActionContext) -> AttachmentResult<Record> {
        let record = self.load(id).await?;
        self.paths.resolve(&record, ctx).await
    }

    /// Apply a write to a record. Only `POST` mutates; any other verb
    /// returns the record as stored.
    pub async fn write(
        &self,
        method: &Method,
        id: &str,
        payload: WritePayload,
        ctx: &ActionContext,
    ) -> AttachmentResult<WriteOutcome> {
        if *method != Method::POST {
            debug!(record = %id, %method, "not a write verb, skipping attachment handling");
            let record = self.load(id).await?;
            return Ok(WriteOutcome {
                record,
                deleted: BTreeSet::new(),
            });
        }

        self.ensure_plain_params(&payload.params)?;
        let _guard = self.lock_record(id).await;
        let mut record = self.load(id).await?;

        let markers = match record.slots() {
            Some(slots) => parse_delete_markers(&payload.delete_markers, slots.len())?,
            None => BTreeSet::new(),
        };
        self.uploads.validate(&record, &payload.files)?;

        if !payload.params.is_empty() {
            record.params.extend(payload.params);
            record = self.repository.update(&record).await?;
        }

        let record = self.uploads.run(record, &payload.files, ctx).await?;
        let record = self
            .deletions
            .run(record, &payload.files, &markers, ctx)
            .await?;
        let record = self.paths.resolve(&record, ctx).await?;

        Ok(WriteOutcome {
            record,
            deleted: markers,
        })
    }

    /// Delete a record, then every object it referenced. The row goes first
    /// so a failed object delete leaves an orphan, never a dangling record.
    pub async fn destroy(&self, id: &str, ctx: &ActionContext) -> AttachmentResult<Record> {
        let _guard = self.lock_record(id).await;
        let record = self.load(id).await?;
        self.repository.delete(id).await?;
        info!(record = %id, "deleted record");
        self.deletions.remove_all(&record, ctx).await?;
        Ok(record)
    }

    /// Attachment fields are only ever written by the orchestrators.
    fn ensure_plain_params(&self, params: &Map<String, Value>) -> AttachmentResult<()> {
        let props = self.options.properties();
        match params.keys().find(|name| props.is_reserved(name)) {
            Some(name) => Err(AttachmentError::Validation(format!(
                "`{name}` is managed by attachment handling and cannot be set directly"
            ))),
            None => Ok(()),
        }
    }

    async fn load(&self, id: &str) -> AttachmentResult<Record> {
        self.repository
            .find(id)
            .await?
            .ok_or_else(|| AttachmentError::RecordNotFound(id.to_string()))
    }

    /// Acquire the per-record write lock. Idle locks are dropped from the map
    /// whenever a new one is requested.
    async fn lock_record(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
