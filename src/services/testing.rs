//! Provider double that records every call and can delay or fail by key.

use crate::{
    errors::ProviderError,
    models::{ActionContext, UploadedFile},
    providers::{Provider, ProviderResult},
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Upload { key: String },
    Delete { key: String, bucket: String },
    Path { key: String, bucket: String },
}

#[derive(Default)]
pub struct RecordingProvider {
    bucket: String,
    calls: Mutex<Vec<Call>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
}

impl RecordingProvider {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Self::default()
        }
    }

    /// Hold any call on `key` for `delay` before it completes.
    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    /// Make every call on `key` fail.
    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { key } => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete { key, bucket } => Some((key, bucket)),
                _ => None,
            })
            .collect()
    }

    pub fn path_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Path { .. }))
            .count()
    }

    async fn settle(&self, key: &str, call: Call) -> ProviderResult<()> {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        self.calls.lock().unwrap().push(call);
        if self.failing.contains(key) {
            return Err(ProviderError::Rejected(format!("refusing `{key}`")));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, _file: &UploadedFile, key: &str, _ctx: &ActionContext) -> ProviderResult<()> {
        self.settle(key, Call::Upload { key: key.to_string() }).await
    }

    async fn delete(&self, key: &str, bucket: &str, _ctx: &ActionContext) -> ProviderResult<()> {
        self.settle(
            key,
            Call::Delete {
                key: key.to_string(),
                bucket: bucket.to_string(),
            },
        )
        .await
    }

    async fn path(&self, key: &str, bucket: &str, _ctx: &ActionContext) -> ProviderResult<String> {
        self.settle(
            key,
            Call::Path {
                key: key.to_string(),
                bucket: bucket.to_string(),
            },
        )
        .await?;
        Ok(format!("/files/{bucket}/{key}"))
    }
}
