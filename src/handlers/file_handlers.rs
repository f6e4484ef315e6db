//! Streams objects stored by the local provider. This is what the paths the
//! provider hands out point at.

use crate::{errors::{AppError, ProviderError}, handlers::AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::io::ErrorKind;
use tokio_util::io::ReaderStream;

/// `GET /files/{bucket}/{*key}`
pub async fn get_file(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let file = state.files.open(&bucket, &key).await.map_err(|err| match err {
        ProviderError::Io(io) if io.kind() == ErrorKind::NotFound => {
            AppError::not_found(format!("object `{key}` not found in bucket `{bucket}`"))
        }
        ProviderError::Io(io) => AppError::internal(io.to_string()),
        other => AppError::bad_request(other.to_string()),
    })?;
    let length = file.metadata().await.map(|m| m.len()).ok();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}
