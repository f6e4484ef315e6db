//! Read-time projection of retrievable paths onto a record.

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{ActionContext, Attachment, Record},
    providers::Provider,
};
use futures::future::join_all;
use std::sync::Arc;

#[derive(Clone)]
pub struct PathResolver {
    provider: Arc<dyn Provider>,
}

impl PathResolver {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Return a copy of `record` with the path of every live file filled in.
    /// `record` itself is left untouched, and entries without a key (or
    /// removed slots) get no path and cause no provider call.
    pub async fn resolve(&self, record: &Record, ctx: &ActionContext) -> AttachmentResult<Record> {
        let mut view = record.clone();
        let default_bucket = self.provider.bucket();

        match &mut view.attachment {
            Attachment::Single(Some(entry)) => {
                entry.path = Some(
                    self.path(&entry.key, entry.bucket_or(default_bucket), ctx)
                        .await?,
                );
            }
            Attachment::Single(None) => {}
            Attachment::Multiple(slots) => {
                let targets: Vec<(usize, String, String)> = slots
                    .active()
                    .filter(|(_, entry)| !entry.key.is_empty())
                    .map(|(index, entry)| {
                        (index, entry.key.clone(), entry.bucket_or(default_bucket).to_string())
                    })
                    .collect();

                let paths = join_all(
                    targets
                        .iter()
                        .map(|(_, key, bucket)| self.path(key, bucket, ctx)),
                )
                .await;

                for ((index, _, _), path) in targets.iter().zip(paths) {
                    if let Some(entry) = slots.get_mut(*index) {
                        entry.path = Some(path?);
                    }
                }
            }
        }

        Ok(view)
    }

    async fn path(&self, key: &str, bucket: &str, ctx: &ActionContext) -> AttachmentResult<String> {
        self.provider
            .path(key, bucket, ctx)
            .await
            .map_err(|source| AttachmentError::ResolvePath {
                key: key.to_string(),
                bucket: bucket.to_string(),
                source,
            })
    }
}
