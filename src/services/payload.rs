//! Shape of an inbound write as the orchestrators consume it.

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::UploadedFile,
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Sentinel form value meaning "set this field to null".
pub const NULL_SENTINEL: &str = "__FORM_VALUE_NULL__";

/// One position of the submitted file list.
#[derive(Debug, Clone)]
pub enum SubmittedFile {
    /// Client re-sent a file the record already holds; carries no content.
    Retained,
    Upload(UploadedFile),
}

/// What the write says about the file field.
#[derive(Debug, Clone, Default)]
pub enum FileField {
    /// Field absent: leave attachments as they are.
    #[default]
    Omitted,
    /// Field explicitly set to null: remove the stored file (single mode).
    Cleared,
    Files(Vec<SubmittedFile>),
}

impl FileField {
    pub fn files(&self) -> &[SubmittedFile] {
        match self {
            FileField::Files(files) => files,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WritePayload {
    pub files: FileField,
    /// Raw index strings from the delete marker field.
    pub delete_markers: Vec<String>,
    /// Plain record fields to update alongside the files.
    pub params: Map<String, Value>,
}

/// Parse delete marker strings into slot positions, rejecting anything that
/// is not an index into a sequence of `len` slots.
pub fn parse_delete_markers(markers: &[String], len: usize) -> AttachmentResult<BTreeSet<usize>> {
    markers
        .iter()
        .map(|raw| {
            let index: usize = raw.trim().parse().map_err(|_| {
                AttachmentError::Validation(format!("delete marker `{raw}` is not an index"))
            })?;
            if index >= len {
                return Err(AttachmentError::Validation(format!(
                    "delete marker {index} is out of range for {len} files"
                )));
            }
            Ok(index)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_and_dedups_indices() {
        let parsed = parse_delete_markers(&markers(&["2", "0", " 2 "]), 3).unwrap();
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn rejects_garbage_and_out_of_range() {
        assert!(parse_delete_markers(&markers(&["x"]), 3).is_err());
        assert!(parse_delete_markers(&markers(&["-1"]), 3).is_err());
        assert!(parse_delete_markers(&markers(&["3"]), 3).is_err());
        assert!(parse_delete_markers(&[], 0).unwrap().is_empty());
    }
}
