//! Upload configuration: which record fields hold file metadata, whether the
//! record carries one file or an ordered list, and what submitted files must
//! look like before any byte is sent to a provider.

use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{record::REMOVED_FIELD, upload::UploadedFile},
};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

pub const DEFAULT_UPLOAD_PATH: &str = "{id}/{filename}";

/// Names of the record fields the attachment metadata is stored under.
///
/// `key`, `file`, `file_path` and `delete_marker` are always present; the
/// remaining fields are only written when configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProperties {
    pub key: String,
    pub file: String,
    /// Read-only projection field, never persisted.
    pub file_path: String,
    pub delete_marker: String,
    pub bucket: Option<String>,
    pub size: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
}

impl Default for UploadProperties {
    fn default() -> Self {
        Self {
            key: "key".into(),
            file: "file".into(),
            file_path: "filePath".into(),
            delete_marker: "filesToDelete".into(),
            bucket: None,
            size: None,
            mime_type: None,
            filename: None,
        }
    }
}

impl UploadProperties {
    /// Every configured field name. None of them may appear among the
    /// plain params of a record.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [
            Some(&self.key),
            Some(&self.file),
            Some(&self.file_path),
            Some(&self.delete_marker),
            self.bucket.as_ref(),
            self.size.as_ref(),
            self.mime_type.as_ref(),
            self.filename.as_ref(),
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.names().any(|reserved| reserved == name)
    }
}

/// Validated, immutable upload configuration. Build it with
/// [`UploadOptions::builder`] and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    properties: UploadProperties,
    upload_path: String,
    multiple: bool,
    allowed_mime_types: Option<BTreeSet<String>>,
    max_size: Option<u64>,
}

impl UploadOptions {
    pub fn builder() -> UploadOptionsBuilder {
        UploadOptionsBuilder::default()
    }

    pub fn properties(&self) -> &UploadProperties {
        &self.properties
    }

    pub fn upload_path(&self) -> &str {
        &self.upload_path
    }

    pub fn multiple(&self) -> bool {
        self.multiple
    }

    pub fn allowed_mime_types(&self) -> Option<&BTreeSet<String>> {
        self.allowed_mime_types.as_ref()
    }

    pub fn max_size(&self) -> Option<u64> {
        self.max_size
    }

    /// Reject a submitted file whose mime type or size falls outside the
    /// configured bounds. Runs before any provider call.
    pub fn validate_file(&self, file: &UploadedFile) -> AttachmentResult<()> {
        if let Some(max) = self.max_size {
            if file.size > max {
                return Err(AttachmentError::Validation(format!(
                    "file `{}` is {} bytes, limit is {}",
                    file.name, file.size, max
                )));
            }
        }

        if let Some(allowed) = &self.allowed_mime_types {
            let mime = file
                .mime_type
                .as_deref()
                .map(str::to_ascii_lowercase)
                .ok_or_else(|| {
                    AttachmentError::Validation(format!(
                        "file `{}` has no mime type",
                        file.name
                    ))
                })?;
            if !allowed.iter().any(|pattern| mime_matches(pattern, &mime)) {
                return Err(AttachmentError::Validation(format!(
                    "file `{}` has disallowed mime type `{}`",
                    file.name, mime
                )));
            }
        }

        Ok(())
    }

    /// Render the upload path template into a provider key.
    ///
    /// Placeholders: `{id}`, `{filename}` (last path segment only) and
    /// `{uuid}` (fresh per call). Unknown placeholders are kept verbatim.
    pub fn build_key(&self, record_id: &str, file: &UploadedFile) -> String {
        let filename = sanitize_filename(&file.name);
        let mut out = String::with_capacity(self.upload_path.len() + filename.len());
        let mut rest = self.upload_path.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start..];
            let Some(end) = after.find('}') else {
                out.push_str(after);
                rest = "";
                break;
            };
            match &after[1..end] {
                "id" => out.push_str(record_id),
                "filename" => out.push_str(&filename),
                "uuid" => out.push_str(&Uuid::new_v4().to_string()),
                _ => out.push_str(&after[..=end]),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(kind) => mime
            .split_once('/')
            .is_some_and(|(mime_kind, _)| mime_kind == kind),
        None => pattern == mime,
    }
}

fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if last.is_empty() || last == "." || last == ".." {
        "file".to_string()
    } else {
        last.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptionsBuilder {
    properties: UploadProperties,
    upload_path: String,
    multiple: bool,
    allowed_mime_types: Option<Vec<String>>,
    max_size: Option<u64>,
}

impl Default for UploadOptionsBuilder {
    fn default() -> Self {
        Self {
            properties: UploadProperties::default(),
            upload_path: DEFAULT_UPLOAD_PATH.into(),
            multiple: false,
            allowed_mime_types: None,
            max_size: None,
        }
    }
}

impl UploadOptionsBuilder {
    pub fn key_property(mut self, name: impl Into<String>) -> Self {
        self.properties.key = name.into();
        self
    }

    pub fn file_property(mut self, name: impl Into<String>) -> Self {
        self.properties.file = name.into();
        self
    }

    pub fn file_path_property(mut self, name: impl Into<String>) -> Self {
        self.properties.file_path = name.into();
        self
    }

    pub fn delete_marker_property(mut self, name: impl Into<String>) -> Self {
        self.properties.delete_marker = name.into();
        self
    }

    pub fn bucket_property(mut self, name: impl Into<String>) -> Self {
        self.properties.bucket = Some(name.into());
        self
    }

    pub fn size_property(mut self, name: impl Into<String>) -> Self {
        self.properties.size = Some(name.into());
        self
    }

    pub fn mime_type_property(mut self, name: impl Into<String>) -> Self {
        self.properties.mime_type = Some(name.into());
        self
    }

    pub fn filename_property(mut self, name: impl Into<String>) -> Self {
        self.properties.filename = Some(name.into());
        self
    }

    pub fn upload_path(mut self, template: impl Into<String>) -> Self {
        self.upload_path = template.into();
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn allowed_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_mime_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Validate every setting once and freeze the configuration.
    pub fn build(self) -> AttachmentResult<UploadOptions> {
        let mut seen = HashSet::new();
        for name in self.properties.names() {
            if name.trim().is_empty() {
                return Err(invalid("property names cannot be empty"));
            }
            if name == REMOVED_FIELD {
                return Err(invalid(format!("property name `{name}` is reserved")));
            }
            if name.contains('.') {
                return Err(invalid(format!("property name `{name}` cannot contain `.`")));
            }
            if !seen.insert(name) {
                return Err(invalid(format!("property `{name}` is configured twice")));
            }
        }

        let template = self.upload_path.trim();
        if template.is_empty() {
            return Err(invalid("upload path template cannot be empty"));
        }
        if template.starts_with('/') || template.split('/').any(|seg| seg == "..") {
            return Err(invalid("upload path template must be a relative path"));
        }
        if !template.contains("{filename}") && !template.contains("{uuid}") {
            return Err(invalid(
                "upload path template must contain `{filename}` or `{uuid}`",
            ));
        }

        if self.max_size == Some(0) {
            return Err(invalid("max size must be greater than zero"));
        }

        let allowed_mime_types = match self.allowed_mime_types {
            None => None,
            Some(types) => {
                let mut set = BTreeSet::new();
                for raw in types {
                    let pattern = raw.trim().to_ascii_lowercase();
                    let valid = pattern
                        .split_once('/')
                        .is_some_and(|(kind, sub)| {
                            !kind.is_empty() && kind != "*" && !sub.is_empty() && !sub.contains('/')
                        });
                    if !valid {
                        return Err(invalid(format!("`{raw}` is not a mime type pattern")));
                    }
                    set.insert(pattern);
                }
                Some(set)
            }
        };

        Ok(UploadOptions {
            properties: self.properties,
            upload_path: template.to_string(),
            multiple: self.multiple,
            allowed_mime_types,
            max_size: self.max_size,
        })
    }
}

fn invalid(msg: impl Into<String>) -> AttachmentError {
    AttachmentError::InvalidConfig(msg.into())
}
