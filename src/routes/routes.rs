//! Defines routes for the file store API.
//!
//! ## Structure
//! - **Collection endpoints**
//!   - `GET    /api/files` — list records, newest first
//!   - `POST   /api/files` — upload (raw body, `x-file-name` header)
//!   - `GET    /api/usage` — object count and total bytes
//!
//! - **Object endpoints**
//!   - `GET    /api/files/{id}` — download content
//!   - `HEAD   /api/files/{id}` — headers only
//!   - `DELETE /api/files/{id}` — delete content and metadata

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object, get_object, head_object, list_objects, upload_object, usage,
        },
    },
    services::object_store::ObjectStore,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};

/// Build the router for all file store routes.
///
/// The router carries shared state (`ObjectStore`) to all handlers. Upload
/// bodies larger than `max_upload_bytes` are rejected.
pub fn routes(max_upload_bytes: usize) -> Router<ObjectStore> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/usage", get(usage))
        .route("/api/files", get(list_objects).post(upload_object))
        .route(
            "/api/files/{id}",
            get(get_object).head(head_object).delete(delete_object),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
