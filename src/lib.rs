//! Local-disk file store.
//!
//! Uploaded objects live in one flat directory as a content file plus a JSON
//! sidecar record. [`ObjectStore`] owns the persistence rules; the
//! `handlers`/`routes` modules expose it over HTTP.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use models::object::{ObjectRecord, ObjectUpload, StoreUsage, StoredObject};
pub use services::object_store::{ObjectStore, StorageError, StorageResult};
