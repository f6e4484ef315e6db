//! Core data models for attachment management.
//!
//! `Record` is the persisted entity, `FileEntry`/`FileSlots` the attachment
//! metadata it owns, and `UploadOptions` the validated configuration every
//! orchestrator reads.

pub mod file_entry;
pub mod record;
pub mod upload;
pub mod upload_options;

pub use file_entry::{FileEntry, FileSlots};
pub use record::{Attachment, Record, RecordJson};
pub use upload::{ActionContext, UploadedFile};
pub use upload_options::{UploadOptions, UploadProperties};
