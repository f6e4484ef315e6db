//! Persistence of records. Orchestrators talk to [`RecordRepository`] only.

use crate::{errors::AttachmentResult, models::Record};
use async_trait::async_trait;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecordRepository;
pub use sqlite::SqliteRecordRepository;

#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn find(&self, id: &str) -> AttachmentResult<Option<Record>>;

    /// Store a new record. Fails with `Conflict` if the id is taken.
    async fn insert(&self, record: &Record) -> AttachmentResult<Record>;

    /// Overwrite the stored record if its version still matches
    /// `record.version`, returning it with the bumped version.
    async fn update(&self, record: &Record) -> AttachmentResult<Record>;

    async fn delete(&self, id: &str) -> AttachmentResult<()>;
}
