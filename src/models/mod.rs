//! Core data models for the file store.
//!
//! `ObjectRecord` is the sidecar persisted next to each content file and
//! serializes directly as the JSON stored on disk and returned over HTTP.

pub mod object;
