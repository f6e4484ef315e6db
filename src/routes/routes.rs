//! Defines routes for records, their attachments and stored files.
//!
//! - `GET    /healthz`, `GET /readyz`: probes
//! - `POST   /records`: create record
//! - `GET    /records/{id}`: record with resolved file paths
//! - `POST   /records/{id}`: multipart edit (upload / delete attachments)
//! - `DELETE /records/{id}`: delete record and its files
//! - `GET    /files/{bucket}/{*key}`: stream a stored file
//!
//! The wildcard `*key` allows nested keys like `3f2a/report.pdf`.

use crate::handlers::{
    AppState,
    file_handlers::get_file,
    health_handlers::{healthz, readyz},
    record_handlers::{create_record, delete_record, show_record, update_record},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. `body_limit` caps multipart request bodies.
pub fn routes(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/records", post(create_record))
        .route(
            "/records/{id}",
            get(show_record)
                .post(update_record)
                .delete(delete_record)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files/{bucket}/{*key}", get(get_file))
}
