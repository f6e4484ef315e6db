//! Storage backends. Orchestrators only see the [`Provider`] trait.

use crate::{
    errors::ProviderError,
    models::{ActionContext, UploadedFile},
};
use async_trait::async_trait;

pub mod local;

pub use local::LocalProvider;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Capability surface every remote-storage backend implements.
///
/// Failures are returned as-is; callers never retry. What `delete` does for
/// a key that does not exist is up to the backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Bucket new uploads are written to.
    fn bucket(&self) -> &str;

    /// Store `file` under `key` in the default bucket.
    async fn upload(&self, file: &UploadedFile, key: &str, ctx: &ActionContext)
    -> ProviderResult<()>;

    async fn delete(&self, key: &str, bucket: &str, ctx: &ActionContext) -> ProviderResult<()>;

    /// A path or URL the stored object can be retrieved from.
    async fn path(&self, key: &str, bucket: &str, ctx: &ActionContext) -> ProviderResult<String>;
}
