//! Request-scoped values handed to providers: the submitted file blob and the
//! context of the action that triggered the call.

use bytes::Bytes;
use uuid::Uuid;

/// A file blob pulled out of an inbound write payload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as submitted by the client.
    pub name: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub content: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            size: content.len() as u64,
            mime_type,
            content,
        }
    }
}

/// Passed through to every provider call so backends can scope or audit
/// the operation.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub request_id: Uuid,
    pub actor: Option<String>,
}

impl ActionContext {
    pub fn new(actor: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            actor,
        }
    }
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::new(None)
    }
}
