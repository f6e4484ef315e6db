//! Deletion orchestration: remove remote objects a write (or a record
//! deletion) no longer references, then clean up the record metadata.

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{ActionContext, Attachment, Record},
    providers::Provider,
    repositories::RecordRepository,
    services::payload::FileField,
};
use futures::future::join_all;
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

#[derive(Clone)]
pub struct DeletionOrchestrator {
    provider: Arc<dyn Provider>,
    repository: Arc<dyn RecordRepository>,
}

impl DeletionOrchestrator {
    pub fn new(provider: Arc<dyn Provider>, repository: Arc<dyn RecordRepository>) -> Self {
        Self {
            provider,
            repository,
        }
    }

    /// Apply the removals a write asks for. Multi mode removes the slots named
    /// by `markers`; single mode removes the stored file when `files` is
    /// [`FileField::Cleared`].
    pub async fn run(
        &self,
        record: Record,
        files: &FileField,
        markers: &BTreeSet<usize>,
        ctx: &ActionContext,
    ) -> AttachmentResult<Record> {
        match &record.attachment {
            Attachment::Multiple(_) if !markers.is_empty() => {
                self.remove_slots(record, markers, ctx).await
            }
            Attachment::Single(_) if matches!(files, FileField::Cleared) => {
                self.clear_single(record, ctx).await
            }
            _ => Ok(record),
        }
    }

    /// Delete the objects behind `markers` concurrently. Slots whose delete
    /// succeeded are marked removed and persisted even when a peer failed;
    /// the first failure is returned afterwards.
    async fn remove_slots(
        &self,
        mut record: Record,
        markers: &BTreeSet<usize>,
        ctx: &ActionContext,
    ) -> AttachmentResult<Record> {
        let default_bucket = self.provider.bucket();
        let targets: Vec<(usize, String, String)> = match record.slots() {
            Some(slots) => markers
                .iter()
                .filter_map(|&index| match slots.get(index) {
                    Some(entry) if !entry.removed => Some((
                        index,
                        entry.key.clone(),
                        entry.bucket_or(default_bucket).to_string(),
                    )),
                    Some(_) => {
                        warn!(record = %record.id, index, "file already removed, skipping");
                        None
                    }
                    None => {
                        warn!(record = %record.id, index, "no file at position, skipping");
                        None
                    }
                })
                .collect(),
            None => Vec::new(),
        };
        if targets.is_empty() {
            return Ok(record);
        }

        let results = join_all(
            targets
                .iter()
                .map(|(_, key, bucket)| self.delete(key, bucket, ctx)),
        )
        .await;

        let mut first_error = None;
        let mut removed = 0;
        if let Attachment::Multiple(slots) = &mut record.attachment {
            for ((index, _, _), result) in targets.iter().zip(results) {
                match result {
                    Ok(()) => {
                        slots.mark_removed(*index);
                        removed += 1;
                    }
                    Err(err) => {
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        let saved = if removed > 0 {
            let saved = self.repository.update(&record).await?;
            info!(record = %saved.id, removed, "removed attachments");
            saved
        } else {
            record
        };

        match first_error {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }

    async fn clear_single(&self, mut record: Record, ctx: &ActionContext) -> AttachmentResult<Record> {
        let Some(entry) = record.single().cloned() else {
            warn!(record = %record.id, "removal requested but no file is stored");
            return Ok(record);
        };

        let bucket = entry.bucket_or(self.provider.bucket()).to_string();
        self.delete(&entry.key, &bucket, ctx).await?;

        record.attachment = Attachment::Single(None);
        let saved = self.repository.update(&record).await?;
        info!(record = %saved.id, key = %entry.key, "removed attachment");
        Ok(saved)
    }

    /// Remove every object a record references, after the record itself is
    /// gone. Used when the record is deleted.
    pub async fn remove_all(&self, record: &Record, ctx: &ActionContext) -> AttachmentResult<()> {
        let default_bucket = self.provider.bucket();
        let targets: Vec<(&str, &str)> = match &record.attachment {
            Attachment::Single(entry) => entry
                .iter()
                .map(|e| (e.key.as_str(), e.bucket_or(default_bucket)))
                .collect(),
            Attachment::Multiple(slots) => slots
                .active()
                .map(|(_, e)| (e.key.as_str(), e.bucket_or(default_bucket)))
                .collect(),
        };
        if targets.is_empty() {
            return Ok(());
        }

        let results = join_all(
            targets
                .iter()
                .map(|(key, bucket)| self.delete(key, bucket, ctx)),
        )
        .await;
        results.into_iter().collect::<AttachmentResult<Vec<()>>>()?;

        info!(record = %record.id, removed = targets.len(), "removed all attachments");
        Ok(())
    }

    async fn delete(&self, key: &str, bucket: &str, ctx: &ActionContext) -> AttachmentResult<()> {
        self.provider
            .delete(key, bucket, ctx)
            .await
            .map_err(|source| AttachmentError::Delete {
                key: key.to_string(),
                bucket: bucket.to_string(),
                source,
            })
    }
}
