//! HTTP handlers for file operations.
//! Streams request and response bodies to avoid buffering in memory and
//! delegates storage concerns to `ObjectStore`.

use crate::{
    errors::AppError,
    models::object::{DEFAULT_MIME_TYPE, ObjectRecord, ObjectUpload, StoreUsage},
    services::object_store::{ObjectStore, StorageError},
};
use axum::{
    Json, RequestExt,
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use http_body_util::LengthLimitError;
use serde_json::{Map, Value};
use std::{error::Error as StdError, io};
use tokio_util::io::ReaderStream;

/// Header carrying the client's file name.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Prefix of headers turned into extension fields.
pub const META_HEADER_PREFIX: &str = "x-meta-";

/// `POST /api/files` — store the raw request body as a new object.
///
/// The declared name comes from `x-file-name`, the type from `content-type`,
/// the size from `content-length`; every `x-meta-<key>` header becomes an
/// extension field `<key>`. The body is subject to the router's
/// `DefaultBodyLimit`; exceeding it aborts the write with nothing persisted
/// and answers 413.
pub async fn upload_object(
    State(store): State<ObjectStore>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let upload = upload_from_headers(request.headers())?;

    let stream = request
        .into_limited_body()
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let record = match store.save_object_stream(upload, stream).await {
        Err(StorageError::WriteFailed { source, .. }) if is_length_limit(&source) => {
            return Err(AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "upload exceeds the maximum body size",
            ));
        }
        other => other?,
    };
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /api/files` — every record, newest first.
pub async fn list_objects(
    State(store): State<ObjectStore>,
) -> Result<Json<Vec<ObjectRecord>>, AppError> {
    Ok(Json(store.list_objects().await?))
}

/// `GET /api/files/{id}` — stream the content file.
pub async fn get_object(
    State(store): State<ObjectStore>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (record, file) = store
        .open_object(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("file `{}` not found", id)))?;
    let length = file
        .metadata()
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    set_object_headers(response.headers_mut(), &record, length);
    Ok(response)
}

/// `HEAD /api/files/{id}` — same headers as GET but no body.
pub async fn head_object(
    State(store): State<ObjectStore>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let stored = store
        .get_object(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("file `{}` not found", id)))?;
    let length = tokio::fs::metadata(&stored.path)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?
        .len();

    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &stored.record, length);
    Ok(response)
}

/// `DELETE /api/files/{id}` — remove content and metadata.
pub async fn delete_object(
    State(store): State<ObjectStore>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if store.delete_object(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("file `{}` not found", id)))
    }
}

/// `GET /api/usage` — object count and total recorded bytes.
pub async fn usage(State(store): State<ObjectStore>) -> Result<Json<StoreUsage>, AppError> {
    Ok(Json(store.usage().await?))
}

fn upload_from_headers(headers: &HeaderMap) -> Result<ObjectUpload, AppError> {
    let name = match headers.get(FILE_NAME_HEADER) {
        Some(value) => header_str(FILE_NAME_HEADER, value)?.to_string(),
        None => {
            return Err(AppError::bad_request(format!(
                "missing `{}` header",
                FILE_NAME_HEADER
            )));
        }
    };

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();

    let size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut extra = Map::new();
    for (key, value) in headers {
        if let Some(field) = key.as_str().strip_prefix(META_HEADER_PREFIX) {
            if field.is_empty() {
                continue;
            }
            let value = header_str(key.as_str(), value)?;
            extra.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    Ok(ObjectUpload {
        name,
        size,
        mime_type,
        extra,
    })
}

/// Header value as UTF-8. `HeaderValue::to_str` only admits visible ASCII,
/// which would reject ordinary non-English file names.
fn header_str<'a>(name: &str, value: &'a HeaderValue) -> Result<&'a str, AppError> {
    std::str::from_utf8(value.as_bytes())
        .map_err(|_| AppError::bad_request(format!("`{}` header is not valid UTF-8", name)))
}

/// True when a body stream error came from the request body limit.
fn is_length_limit(err: &io::Error) -> bool {
    let mut current = err.get_ref().map(|inner| inner as &(dyn StdError + 'static));
    while let Some(inner) = current {
        if inner.is::<LengthLimitError>() {
            return true;
        }
        current = inner.source();
    }
    false
}

fn set_object_headers(headers: &mut HeaderMap, record: &ObjectRecord, length: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME_TYPE)),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let disposition = format!(
        "attachment; filename=\"{}\"",
        disposition_filename(&record.original_name)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Ok(value) = HeaderValue::from_str(&record.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// Quoted-string safe rendition of a display name for `Content-Disposition`.
fn disposition_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect()
}
