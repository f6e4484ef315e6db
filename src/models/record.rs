//! The persisted entity owning attachment metadata, and its mapping to the
//! external params layout.
//!
//! Single mode flattens the entry onto the params object
//! (`key`, `bucket`, `size`, ...); multi mode stores an array of entry objects
//! under the file property. Field names come from [`UploadProperties`].

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{
        file_entry::{FileEntry, FileSlots},
        upload_options::{UploadOptions, UploadProperties},
    },
};
use serde::Serialize;
use serde_json::{Map, Value};

/// Field flagging a multi-mode slot whose remote object has been deleted.
pub const REMOVED_FIELD: &str = "removed";

#[derive(Clone, Debug, PartialEq)]
pub enum Attachment {
    Single(Option<FileEntry>),
    Multiple(FileSlots),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: String,

    /// Bumped on every successful update; used to reject stale writers.
    pub version: i64,

    /// Fields unrelated to attachments.
    pub params: Map<String, Value>,

    pub attachment: Attachment,
}

/// Wire shape of a record returned to clients.
#[derive(Serialize, Debug)]
pub struct RecordJson {
    pub id: String,
    pub version: i64,
    pub params: Map<String, Value>,
}

impl Record {
    /// A record with no attachment, shaped for the configured mode.
    pub fn new(id: impl Into<String>, options: &UploadOptions) -> Self {
        let attachment = if options.multiple() {
            Attachment::Multiple(FileSlots::new())
        } else {
            Attachment::Single(None)
        };
        Self {
            id: id.into(),
            version: 0,
            params: Map::new(),
            attachment,
        }
    }

    pub fn single(&self) -> Option<&FileEntry> {
        match &self.attachment {
            Attachment::Single(entry) => entry.as_ref(),
            Attachment::Multiple(_) => None,
        }
    }

    pub fn slots(&self) -> Option<&FileSlots> {
        match &self.attachment {
            Attachment::Multiple(slots) => Some(slots),
            Attachment::Single(_) => None,
        }
    }

    /// Render the record into the external params layout. Resolved paths are
    /// only emitted when `with_paths` is set, so the storage form never
    /// carries them.
    pub fn to_params(&self, options: &UploadOptions, with_paths: bool) -> Map<String, Value> {
        let props = options.properties();
        let mut params = self.params.clone();
        params.retain(|name, _| !props.is_reserved(name));

        match &self.attachment {
            Attachment::Single(entry) => {
                if let Some(entry) = entry {
                    write_entry(&mut params, entry, props);
                }
                if with_paths {
                    let path = entry.as_ref().and_then(|e| e.path.clone());
                    params.insert(props.file_path.clone(), path.map_or(Value::Null, Value::String));
                }
            }
            Attachment::Multiple(slots) => {
                let files = slots
                    .iter()
                    .map(|entry| {
                        let mut obj = Map::new();
                        write_entry(&mut obj, entry, props);
                        if entry.removed {
                            obj.insert(REMOVED_FIELD.into(), Value::Bool(true));
                        }
                        if with_paths {
                            obj.insert(
                                props.file_path.clone(),
                                entry.path.clone().map_or(Value::Null, Value::String),
                            );
                        }
                        Value::Object(obj)
                    })
                    .collect();
                params.insert(props.file.clone(), Value::Array(files));
            }
        }

        params
    }

    /// Rebuild a record from its stored params, separating attachment fields
    /// from the rest.
    pub fn from_params(
        id: impl Into<String>,
        version: i64,
        mut params: Map<String, Value>,
        options: &UploadOptions,
    ) -> AttachmentResult<Self> {
        let props = options.properties();
        params.remove(&props.file_path);
        params.remove(&props.delete_marker);

        let attachment = if options.multiple() {
            let slots = match params.remove(&props.file) {
                None | Some(Value::Null) => FileSlots::new(),
                Some(Value::Array(items)) => items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| match item {
                        Value::Object(mut obj) => {
                            let mut entry = read_entry(&mut obj, props).ok_or_else(|| {
                                AttachmentError::Validation(format!(
                                    "stored file entry {index} has no key"
                                ))
                            })?;
                            entry.removed =
                                matches!(obj.get(REMOVED_FIELD), Some(Value::Bool(true)));
                            Ok(entry)
                        }
                        _ => Err(AttachmentError::Validation(format!(
                            "stored file entry {index} is not an object"
                        ))),
                    })
                    .collect::<AttachmentResult<FileSlots>>()?,
                Some(_) => {
                    return Err(AttachmentError::Validation(format!(
                        "`{}` must hold a list of files",
                        props.file
                    )));
                }
            };
            Attachment::Multiple(slots)
        } else {
            params.remove(&props.file);
            Attachment::Single(read_entry(&mut params, props))
        };

        Ok(Self {
            id: id.into(),
            version,
            params,
            attachment,
        })
    }

    pub fn to_json(&self, options: &UploadOptions) -> RecordJson {
        RecordJson {
            id: self.id.clone(),
            version: self.version,
            params: self.to_params(options, true),
        }
    }
}

fn write_entry(target: &mut Map<String, Value>, entry: &FileEntry, props: &UploadProperties) {
    target.insert(props.key.clone(), Value::String(entry.key.clone()));
    if let (Some(name), Some(bucket)) = (&props.bucket, &entry.bucket) {
        target.insert(name.clone(), Value::String(bucket.clone()));
    }
    if let (Some(name), Some(size)) = (&props.size, entry.size) {
        target.insert(name.clone(), Value::from(size));
    }
    if let (Some(name), Some(mime)) = (&props.mime_type, &entry.mime_type) {
        target.insert(name.clone(), Value::String(mime.clone()));
    }
    if let (Some(name), Some(filename)) = (&props.filename, &entry.filename) {
        target.insert(name.clone(), Value::String(filename.clone()));
    }
}

/// Pull entry fields out of `source`. Returns `None` when no key is stored;
/// the other entry fields are removed either way.
fn read_entry(source: &mut Map<String, Value>, props: &UploadProperties) -> Option<FileEntry> {
    let mut take_string = |name: &Option<String>| {
        name.as_ref()
            .and_then(|n| source.remove(n))
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
    };
    let bucket = take_string(&props.bucket);
    let mime_type = take_string(&props.mime_type);
    let filename = take_string(&props.filename);

    let size = props
        .size
        .as_ref()
        .and_then(|n| source.remove(n))
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

    let key = match source.remove(&props.key) {
        Some(Value::String(key)) if !key.is_empty() => key,
        _ => return None,
    };

    Some(FileEntry {
        key,
        bucket,
        size,
        mime_type,
        filename,
        path: None,
        removed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_options(multiple: bool) -> UploadOptions {
        UploadOptions::builder()
            .bucket_property("bucket")
            .size_property("size")
            .mime_type_property("mimeType")
            .filename_property("filename")
            .multiple(multiple)
            .build()
            .unwrap()
    }

    fn entry(key: &str) -> FileEntry {
        FileEntry {
            key: key.into(),
            bucket: Some("public".into()),
            size: Some(12),
            mime_type: Some("image/png".into()),
            filename: Some("a.png".into()),
            path: Some(format!("/files/public/{key}")),
            removed: false,
        }
    }

    #[test]
    fn single_entry_is_flattened_without_path() {
        let opts = full_options(false);
        let mut record = Record::new("r1", &opts);
        record.params.insert("title".into(), json!("hello"));
        record.attachment = Attachment::Single(Some(entry("r1/a.png")));

        let stored = record.to_params(&opts, false);
        assert_eq!(
            Value::Object(stored.clone()),
            json!({
                "title": "hello",
                "key": "r1/a.png",
                "bucket": "public",
                "size": 12,
                "mimeType": "image/png",
                "filename": "a.png"
            })
        );

        let restored = Record::from_params("r1", 3, stored, &opts).unwrap();
        assert_eq!(restored.version, 3);
        assert_eq!(restored.params.get("title"), Some(&json!("hello")));
        let restored_entry = restored.single().unwrap();
        assert_eq!(restored_entry.key, "r1/a.png");
        assert_eq!(restored_entry.path, None);
    }

    #[test]
    fn plain_params_cannot_shadow_attachment_fields() {
        let opts = full_options(false);
        let mut record = Record::new("r1", &opts);
        record.params.insert("title".into(), json!("hello"));
        record.params.insert("key".into(), json!("other/secret.pdf"));
        record.params.insert("bucket".into(), json!("private"));

        let stored = record.to_params(&opts, false);
        assert_eq!(Value::Object(stored.clone()), json!({ "title": "hello" }));
        let restored = Record::from_params("r1", 0, stored, &opts).unwrap();
        assert_eq!(restored.single(), None);

        record.attachment = Attachment::Single(Some(entry("r1/a.png")));
        let stored = record.to_params(&opts, false);
        assert_eq!(stored.get("key"), Some(&json!("r1/a.png")));
        assert_eq!(stored.get("bucket"), Some(&json!("public")));
    }

    #[test]
    fn projection_emits_path_field() {
        let opts = full_options(false);
        let mut record = Record::new("r1", &opts);
        let view = record.to_params(&opts, true);
        assert_eq!(view.get("filePath"), Some(&Value::Null));

        record.attachment = Attachment::Single(Some(entry("r1/a.png")));
        let view = record.to_params(&opts, true);
        assert_eq!(view.get("filePath"), Some(&json!("/files/public/r1/a.png")));
    }

    #[test]
    fn unconfigured_fields_are_not_written() {
        let opts = UploadOptions::builder().build().unwrap();
        let mut record = Record::new("r1", &opts);
        record.attachment = Attachment::Single(Some(entry("r1/a.png")));
        assert_eq!(
            Value::Object(record.to_params(&opts, false)),
            json!({ "key": "r1/a.png" })
        );
    }

    #[test]
    fn multiple_entries_keep_removed_slots() {
        let opts = full_options(true);
        let mut slots: FileSlots = [entry("r1/a"), entry("r1/b")].into_iter().collect();
        slots.mark_removed(0);
        let mut record = Record::new("r1", &opts);
        record.attachment = Attachment::Multiple(slots);

        let stored = record.to_params(&opts, false);
        let files = stored.get("file").and_then(Value::as_array).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].get("removed"), Some(&json!(true)));
        assert_eq!(files[1].get("removed"), None);
        assert!(files[1].get("filePath").is_none());

        let restored = Record::from_params("r1", 1, stored, &opts).unwrap();
        let slots = restored.slots().unwrap();
        assert!(slots.get(0).unwrap().removed);
        assert_eq!(slots.get(0).unwrap().key, "r1/a");
        assert!(!slots.get(1).unwrap().removed);
    }

    #[test]
    fn path_and_marker_fields_are_dropped_on_read() {
        let opts = full_options(false);
        let params = json!({
            "key": "k",
            "size": "42",
            "filePath": "/should/not/stick",
            "filesToDelete": { "file": ["0"] }
        });
        let Value::Object(params) = params else { unreachable!() };
        let record = Record::from_params("r1", 0, params, &opts).unwrap();
        assert!(record.params.is_empty());
        let entry = record.single().unwrap();
        assert_eq!(entry.size, Some(42));
        assert_eq!(entry.path, None);
    }

    #[test]
    fn malformed_multi_entries_are_rejected() {
        let opts = full_options(true);
        let Value::Object(params) = json!({ "file": [{ "bucket": "b" }] }) else {
            unreachable!()
        };
        assert!(Record::from_params("r1", 0, params, &opts).is_err());

        let Value::Object(params) = json!({ "file": "nope" }) else { unreachable!() };
        assert!(Record::from_params("r1", 0, params, &opts).is_err());
    }
}
