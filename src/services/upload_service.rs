//! Upload orchestration: send newly submitted files to the provider and merge
//! the resulting metadata into the record.
//!
//! Metadata for a new upload is persisted before anything it supersedes is
//! deleted, so a failure in between leaves an unreferenced old object rather
//! than a record pointing at nothing.

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{ActionContext, Attachment, FileEntry, Record, UploadOptions, UploadedFile},
    providers::Provider,
    repositories::RecordRepository,
    services::payload::{FileField, SubmittedFile},
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct UploadOrchestrator {
    options: Arc<UploadOptions>,
    provider: Arc<dyn Provider>,
    repository: Arc<dyn RecordRepository>,
}

impl UploadOrchestrator {
    pub fn new(
        options: Arc<UploadOptions>,
        provider: Arc<dyn Provider>,
        repository: Arc<dyn RecordRepository>,
    ) -> Self {
        Self {
            options,
            provider,
            repository,
        }
    }

    /// Check every file this write would upload. Must pass before `run`.
    pub fn validate(&self, record: &Record, files: &FileField) -> AttachmentResult<()> {
        let pending = self.pending_uploads(record, files)?;
        if !pending.is_empty() && record.id.trim().is_empty() {
            return Err(AttachmentError::NotPersisted);
        }
        pending
            .iter()
            .try_for_each(|(_, file)| self.options.validate_file(file))
    }

    /// Files at positions the record does not hold yet. In single mode that
    /// is the first submitted file, if it carries content.
    fn pending_uploads<'a>(
        &self,
        record: &Record,
        files: &'a FileField,
    ) -> AttachmentResult<Vec<(usize, &'a UploadedFile)>> {
        let submitted = files.files();
        match &record.attachment {
            Attachment::Single(_) => Ok(match submitted.first() {
                Some(SubmittedFile::Upload(file)) => vec![(0, file)],
                _ => Vec::new(),
            }),
            Attachment::Multiple(slots) => submitted
                .iter()
                .enumerate()
                .skip(slots.len())
                .map(|(index, submitted)| match submitted {
                    SubmittedFile::Upload(file) => Ok((index, file)),
                    SubmittedFile::Retained => Err(AttachmentError::Validation(format!(
                        "file at position {index} is new but carries no content"
                    ))),
                })
                .collect(),
        }
    }

    /// Upload what `files` adds and persist the merged record. Returns the
    /// record unchanged when there is nothing to upload.
    pub async fn run(
        &self,
        record: Record,
        files: &FileField,
        ctx: &ActionContext,
    ) -> AttachmentResult<Record> {
        let pending = self.pending_uploads(&record, files)?;
        if pending.is_empty() {
            return Ok(record);
        }

        if record.slots().is_some() {
            self.upload_multiple(record, pending, ctx).await
        } else {
            self.upload_single(record, pending[0].1, ctx).await
        }
    }

    async fn upload_single(
        &self,
        mut record: Record,
        file: &UploadedFile,
        ctx: &ActionContext,
    ) -> AttachmentResult<Record> {
        let key = self.options.build_key(&record.id, file);
        let bucket = self.provider.bucket().to_string();
        self.upload(file, &key, ctx).await?;

        let previous = record.single().cloned();
        record.attachment = Attachment::Single(Some(self.entry_for(file, key.clone())));
        let saved = self.repository.update(&record).await?;
        info!(record = %saved.id, key = %key, "stored attachment");

        if let Some(old) = previous {
            let old_bucket = old.bucket_or(&bucket);
            if old.key != key || old_bucket != bucket {
                self.provider
                    .delete(&old.key, old_bucket, ctx)
                    .await
                    .map_err(|source| AttachmentError::Delete {
                        key: old.key.clone(),
                        bucket: old_bucket.to_string(),
                        source,
                    })?;
                info!(record = %saved.id, key = %old.key, "removed replaced attachment");
            }
        }

        Ok(saved)
    }

    async fn upload_multiple(
        &self,
        mut record: Record,
        pending: Vec<(usize, &UploadedFile)>,
        ctx: &ActionContext,
    ) -> AttachmentResult<Record> {
        let keyed: Vec<(usize, &UploadedFile, String)> = pending
            .into_iter()
            .map(|(index, file)| (index, file, self.options.build_key(&record.id, file)))
            .collect();

        debug!(record = %record.id, count = keyed.len(), "uploading new attachments");
        let results = join_all(
            keyed
                .iter()
                .map(|(_, file, key)| self.upload(file, key, ctx)),
        )
        .await;
        results.into_iter().collect::<AttachmentResult<Vec<()>>>()?;

        if let Attachment::Multiple(slots) = &mut record.attachment {
            for (index, file, key) in keyed {
                let position = slots.push(self.entry_for(file, key));
                debug_assert_eq!(position, index);
            }
        }

        let saved = self.repository.update(&record).await?;
        info!(
            record = %saved.id,
            files = saved.slots().map_or(0, |s| s.len()),
            "stored attachments"
        );
        Ok(saved)
    }

    async fn upload(&self, file: &UploadedFile, key: &str, ctx: &ActionContext) -> AttachmentResult<()> {
        self.provider
            .upload(file, key, ctx)
            .await
            .map_err(|source| AttachmentError::Upload {
                key: key.to_string(),
                bucket: self.provider.bucket().to_string(),
                source,
            })
    }

    fn entry_for(&self, file: &UploadedFile, key: String) -> FileEntry {
        FileEntry {
            key,
            bucket: Some(self.provider.bucket().to_string()),
            size: Some(file.size),
            mime_type: file.mime_type.clone(),
            filename: Some(file.name.clone()),
            path: None,
            removed: false,
        }
    }
}
