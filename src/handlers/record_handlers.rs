//! HTTP handlers for records and their attachments.
//!
//! Writes arrive as multipart forms. The attachment part of the form is
//! namespaced by the configured property names:
//! - `<file>` / `<file>.<n>`: a part with a filename is a new blob, a text
//!   part is a placeholder for a file the record already holds, and the text
//!   `__FORM_VALUE_NULL__` clears the stored file.
//! - `<deleteMarker>.<file>` / `<deleteMarker>.<file>.<n>`: slot index to delete.
//!
//! Any other text part updates the record param of the same name.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::{ActionContext, RecordJson, UploadOptions, UploadedFile},
    services::{
        FileField, SubmittedFile, WritePayload,
        payload::NULL_SENTINEL,
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::IntoResponse,
};
use serde_json::{Map, Value};
use tracing::debug;

const ACTOR_HEADER: &str = "x-actor";

/// `POST /records`: create a record from a JSON object of plain params.
pub async fn create_record(
    State(state): State<AppState>,
    Json(params): Json<Map<String, Value>>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.attachments.create(params).await?;
    let body = record.to_json(state.attachments.options());
    Ok((StatusCode::CREATED, Json(body)))
}

/// `GET /records/{id}`: the record with retrievable file paths.
pub async fn show_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RecordJson>, AppError> {
    let ctx = action_context(&headers);
    let record = state.attachments.show(&id, &ctx).await?;
    Ok(Json(record.to_json(state.attachments.options())))
}

/// `POST /records/{id}`: edit a record from a multipart form.
///
/// The orchestration runs on its own task so a client that goes away does
/// not cancel uploads or deletes already in flight.
pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<RecordJson>, AppError> {
    let ctx = action_context(&headers);
    let payload = extract_payload(multipart, state.attachments.options()).await?;
    debug!(
        record = %id,
        request_id = %ctx.request_id,
        files = payload.files.files().len(),
        markers = payload.delete_markers.len(),
        "extracted write payload"
    );

    let service = state.attachments.clone();
    let outcome = tokio::spawn(async move { service.write(&method, &id, payload, &ctx).await })
        .await
        .map_err(|err| AppError::internal(format!("write task failed: {err}")))??;

    Ok(Json(outcome.to_json(state.attachments.options())))
}

/// `DELETE /records/{id}`: delete the record and every stored file.
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = action_context(&headers);
    let service = state.attachments.clone();
    tokio::spawn(async move { service.destroy(&id, &ctx).await })
        .await
        .map_err(|err| AppError::internal(format!("delete task failed: {err}")))??;
    Ok(StatusCode::NO_CONTENT)
}

fn action_context(headers: &HeaderMap) -> ActionContext {
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    ActionContext::new(actor)
}

/// Split a multipart write into files, delete markers and plain params.
pub async fn extract_payload(
    mut multipart: Multipart,
    options: &UploadOptions,
) -> Result<WritePayload, AppError> {
    let props = options.properties();
    let marker_field = format!("{}.{}", props.delete_marker, props.file);

    let mut files = Vec::new();
    let mut cleared = false;
    let mut payload = WritePayload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if is_field(&name, &props.file) {
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let mime_type = field.content_type().map(str::to_string);
                    let content = field.bytes().await.map_err(|err| {
                        AppError::bad_request(format!("failed to read `{filename}`: {err}"))
                    })?;
                    files.push(SubmittedFile::Upload(UploadedFile::new(
                        filename, mime_type, content,
                    )));
                }
                None => {
                    let value = read_text(field, &name).await?;
                    if value == NULL_SENTINEL {
                        cleared = true;
                    } else {
                        files.push(SubmittedFile::Retained);
                    }
                }
            }
        } else if is_field(&name, &marker_field) {
            payload.delete_markers.push(read_text(field, &name).await?);
        } else {
            let value = read_text(field, &name).await?;
            payload.params.insert(name, Value::String(value));
        }
    }

    payload.files = if cleared {
        FileField::Cleared
    } else if files.is_empty() {
        FileField::Omitted
    } else {
        FileField::Files(files)
    };
    Ok(payload)
}

async fn read_text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("failed to read field `{name}`: {err}")))
}

/// `name` equals `base` or is `base.<index>`.
fn is_field(name: &str, base: &str) -> bool {
    match name.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('.')
            .is_some_and(|idx| !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    const BOUNDARY: &str = "attachment-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a str, &'a str),
    }

    async fn payload_from(parts: &[Part<'_>]) -> Result<WritePayload, AppError> {
        let mut body = String::new();
        for part in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match part {
                Part::Text(name, value) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )),
                Part::File(name, filename, mime, content) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: {mime}\r\n\r\n{content}\r\n"
                )),
            }
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/records/r1")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let multipart = Multipart::from_request(request, &()).await.unwrap();
        let options = UploadOptions::builder().multiple(true).build().unwrap();
        extract_payload(multipart, &options).await
    }

    #[tokio::test]
    async fn missing_file_field_is_omitted() {
        let payload = payload_from(&[Part::Text("title", "cover")]).await.unwrap();

        assert!(matches!(payload.files, FileField::Omitted));
        assert!(payload.delete_markers.is_empty());
        assert_eq!(payload.params.get("title"), Some(&Value::from("cover")));
    }

    #[tokio::test]
    async fn null_sentinel_clears_the_file() {
        let payload = payload_from(&[Part::Text("file", NULL_SENTINEL)]).await.unwrap();

        assert!(matches!(payload.files, FileField::Cleared));
        assert!(payload.params.is_empty());
    }

    #[tokio::test]
    async fn text_parts_are_retained_and_file_parts_uploaded() {
        let payload = payload_from(&[
            Part::Text("file.0", "r1/a.png"),
            Part::File("file.1", "b.png", "image/png", "png-bytes"),
        ])
        .await
        .unwrap();

        let files = payload.files.files();
        assert_eq!(files.len(), 2);
        assert!(matches!(files[0], SubmittedFile::Retained));
        match &files[1] {
            SubmittedFile::Upload(file) => {
                assert_eq!(file.name, "b.png");
                assert_eq!(file.mime_type.as_deref(), Some("image/png"));
                assert_eq!(file.size, 9);
                assert_eq!(&file.content[..], b"png-bytes");
            }
            SubmittedFile::Retained => panic!("expected an upload at position 1"),
        }
    }

    #[tokio::test]
    async fn delete_marker_parts_become_markers() {
        let payload = payload_from(&[
            Part::Text("filesToDelete.file.0", "2"),
            Part::Text("filesToDelete.file.1", "0"),
            Part::Text("filesToDelete.other", "5"),
        ])
        .await
        .unwrap();

        assert_eq!(payload.delete_markers, vec!["2".to_string(), "0".to_string()]);
        assert!(matches!(payload.files, FileField::Omitted));
        assert_eq!(
            payload.params.get("filesToDelete.other"),
            Some(&Value::from("5"))
        );
    }

    #[test]
    fn matches_plain_and_indexed_field_names() {
        assert!(is_field("file", "file"));
        assert!(is_field("file.3", "file"));
        assert!(is_field("filesToDelete.file.0", "filesToDelete.file"));
        assert!(!is_field("filename", "file"));
        assert!(!is_field("file.", "file"));
        assert!(!is_field("file.x", "file"));
        assert!(!is_field("title", "file"));
    }
}
