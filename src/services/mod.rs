//! Attachment orchestration: uploads, deletions and path projection, plus the
//! service that runs them for a record action.

pub mod attachment_service;
pub mod delete_service;
pub mod path_resolver;
pub mod payload;
pub mod upload_service;

pub use attachment_service::{AttachmentService, WriteOutcome};
pub use delete_service::DeletionOrchestrator;
pub use path_resolver::PathResolver;
pub use payload::{FileField, SubmittedFile, WritePayload};
pub use upload_service::UploadOrchestrator;

#[cfg(test)]
pub(crate) mod testing;
