//! HTTP handlers. All of them share [`AppState`].

use crate::{providers::LocalProvider, services::AttachmentService};
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod file_handlers;
pub mod health_handlers;
pub mod record_handlers;

#[derive(Clone)]
pub struct AppState {
    pub attachments: AttachmentService,
    /// Backend the download route streams from.
    pub files: LocalProvider,
    pub db: Arc<SqlitePool>,
}
