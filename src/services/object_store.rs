//! src/services/object_store.rs
//!
//! ObjectStore — uploaded objects persisted in one flat directory. Every
//! object is two files under `root`: the content as `<id><ext>` and a
//! pretty-printed JSON sidecar as `<id>.json`. There is no index file; the
//! directory listing is the index.
//!
//! Both files are written to a hidden temp file and renamed into place, and
//! the sidecar is only written once the content is in place. A failed
//! sidecar write removes the content again, so a live id never has exactly
//! one of the pair on disk.

use crate::models::object::{ObjectRecord, ObjectUpload, StoreUsage, StoredObject};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, future, pin_mut, stream};
use serde_json::{Map, Value};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Suffix of sidecar metadata files.
const METADATA_EXT: &str = ".json";

/// Prefix of in-flight temp files. Temp names never end in `.json`.
const TEMP_PREFIX: &str = ".tmp-";

/// Appended to content whose own extension would collide with the sidecar.
const COLLISION_SUFFIX: &str = ".content";

/// Sidecar keys that extension fields may not set.
const RESERVED_FIELDS: [&str; 5] = ["id", "fileName", "storedName", "uploadDate", "createdAt"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage root `{}` is unavailable: {source}", .path.display())]
    StorageUnavailable { path: PathBuf, source: io::Error },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to write `{}`: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },
    #[error("metadata for object `{id}` is corrupt: {reason}")]
    CorruptMetadata { id: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Handle to one store root. Cheap to clone and safe to share between tasks:
/// it holds nothing but the root path, and every operation is a plain
/// sequence of filesystem calls.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the root directory exists, creating missing parents.
    ///
    /// Idempotent. Fails with `StorageUnavailable` if the path exists but is
    /// not a directory or cannot be created.
    pub async fn initialize(&self) -> StorageResult<()> {
        let unavailable = |source: io::Error| StorageError::StorageUnavailable {
            path: self.root.clone(),
            source,
        };

        fs::create_dir_all(&self.root).await.map_err(unavailable)?;
        let meta = fs::metadata(&self.root).await.map_err(unavailable)?;
        if !meta.is_dir() {
            return Err(unavailable(io::Error::other(
                "path exists but is not a directory",
            )));
        }

        self.sweep_temp_files().await.map_err(unavailable)?;

        info!("Object store initialized at {}", self.root.display());
        Ok(())
    }

    /// Remove `.tmp-*` files left behind by an interrupted write.
    async fn sweep_temp_files(&self) -> io::Result<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(TEMP_PREFIX));
            if is_temp && entry.file_type().await?.is_file() {
                warn!("removing stale temp file {}", entry.path().display());
                discard(&entry.path()).await;
            }
        }
        Ok(())
    }

    /// Persist an in-memory buffer. See [`ObjectStore::save_object_stream`].
    pub async fn save_object(
        &self,
        upload: ObjectUpload,
        content: impl Into<Bytes>,
    ) -> StorageResult<ObjectRecord> {
        let content = content.into();
        self.save_object_stream(upload, stream::once(future::ready(Ok(content))))
            .await
    }

    /// Stream an upload to disk under a fresh id and write its sidecar.
    ///
    /// - Rejects an empty declared name and malformed extension fields
    ///   before touching the disk.
    /// - Writes the content to a temp file, fsyncs, renames into place.
    /// - Writes the sidecar the same way; on failure the content is removed.
    pub async fn save_object_stream<S>(
        &self,
        upload: ObjectUpload,
        content: S,
    ) -> StorageResult<ObjectRecord>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        self.persist_object(Uuid::new_v4().to_string(), upload, content)
            .await
    }

    async fn persist_object<S>(
        &self,
        id: String,
        upload: ObjectUpload,
        content: S,
    ) -> StorageResult<ObjectRecord>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        if upload.name.is_empty() {
            return Err(StorageError::InvalidInput(
                "declared file name must not be empty".into(),
            ));
        }
        let overrides = FieldOverrides::split(upload.extra)?;

        let stored_name = stored_name_for(&id, &upload.name);
        let content_path = self.root.join(&stored_name);
        let written = self.write_atomic(&content_path, content).await?;

        let size = match (overrides.size, upload.size) {
            (Some(size), _) => size,
            (None, Some(declared)) => {
                if declared != written {
                    warn!(
                        "object {} declared {} bytes but {} were written",
                        id, declared, written
                    );
                }
                declared
            }
            (None, None) => written,
        };

        let record = ObjectRecord {
            id,
            original_name: overrides.original_name.unwrap_or(upload.name),
            stored_name,
            size,
            mime_type: overrides.mime_type.unwrap_or(upload.mime_type),
            created_at: Utc::now(),
            extra: overrides.extra,
        };

        let metadata_path = self.metadata_path(&record.id);
        let written_meta = match serde_json::to_vec_pretty(&record) {
            Ok(json) => {
                let body = stream::once(future::ready(Ok(Bytes::from(json))));
                self.write_atomic(&metadata_path, body).await
            }
            Err(err) => Err(StorageError::WriteFailed {
                path: metadata_path,
                source: err.into(),
            }),
        };
        if let Err(err) = written_meta {
            discard(&content_path).await;
            return Err(err);
        }

        debug!(
            "stored object {} ({} -> {}, {} bytes)",
            record.id, record.original_name, record.stored_name, written
        );
        Ok(record)
    }

    /// List every readable record, newest first.
    ///
    /// Sidecars that cannot be read or parsed are logged and skipped. A
    /// missing root lists as empty.
    pub async fn list_objects(&self) -> StorageResult<Vec<ObjectRecord>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_sidecar = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(METADATA_EXT));
            if !is_sidecar {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => {}
                _ => continue,
            }

            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("sidecar {} removed during listing", path.display());
                    continue;
                }
                Err(err) => {
                    warn!("skipping unreadable metadata {}: {}", path.display(), err);
                    continue;
                }
            };
            match serde_json::from_slice::<ObjectRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(err) => warn!("skipping corrupt metadata {}: {}", path.display(), err),
            }
        }

        // stable: equal timestamps keep scan order
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Look up a live object.
    ///
    /// `Ok(None)` when the sidecar is absent, and also when the sidecar is
    /// present but its content file is gone. An unparsable sidecar is
    /// `CorruptMetadata`.
    pub async fn get_object(&self, id: &str) -> StorageResult<Option<StoredObject>> {
        let Some(record) = self.load_record(id).await? else {
            return Ok(None);
        };

        let path = self.root.join(&record.stored_name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(StoredObject { record, path })),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("object {} has metadata but no content file", id);
                Ok(None)
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Look up a live object and open its content for reading.
    ///
    /// Content removed between lookup and open reads as `Ok(None)`.
    pub async fn open_object(&self, id: &str) -> StorageResult<Option<(ObjectRecord, File)>> {
        let Some(stored) = self.get_object(id).await? else {
            return Ok(None);
        };

        match File::open(&stored.path).await {
            Ok(file) => Ok(Some((stored.record, file))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Remove an object's content and sidecar.
    ///
    /// Returns `false` when there is no sidecar. A missing content file is
    /// tolerated here, unlike in [`ObjectStore::get_object`]. An unparsable
    /// sidecar is `CorruptMetadata` and nothing is removed.
    pub async fn delete_object(&self, id: &str) -> StorageResult<bool> {
        let Some(record) = self.load_record(id).await? else {
            return Ok(false);
        };

        let content_path = self.root.join(&record.stored_name);
        match fs::remove_file(&content_path).await {
            Ok(()) => debug!("removed content file {}", content_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("content file {} already missing", content_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        match fs::remove_file(self.metadata_path(id)).await {
            Ok(()) => {
                debug!("deleted object {}", id);
                Ok(true)
            }
            // a concurrent delete finished first
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Count listed records and sum their recorded sizes.
    pub async fn usage(&self) -> StorageResult<StoreUsage> {
        let records = self.list_objects().await?;
        Ok(StoreUsage {
            objects: records.len(),
            total_bytes: records.iter().map(|record| record.size).sum(),
        })
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{METADATA_EXT}"))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4()))
    }

    async fn load_record(&self, id: &str) -> StorageResult<Option<ObjectRecord>> {
        if !is_plain_file_name(id) || id.chars().any(char::is_control) {
            return Err(StorageError::InvalidInput(format!(
                "`{id}` is not a valid object id"
            )));
        }

        let raw = match fs::read(self.metadata_path(id)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let record: ObjectRecord =
            serde_json::from_slice(&raw).map_err(|err| StorageError::CorruptMetadata {
                id: id.to_string(),
                reason: err.to_string(),
            })?;

        if !is_plain_file_name(&record.stored_name)
            || record.stored_name == format!("{id}{METADATA_EXT}")
        {
            return Err(StorageError::CorruptMetadata {
                id: id.to_string(),
                reason: format!("`{}` is not a usable content file name", record.stored_name),
            });
        }

        Ok(Some(record))
    }

    /// Stream `content` into a temp file in the root, then rename to `path`.
    /// Returns the number of bytes written. No temp file survives a failure.
    async fn write_atomic<S>(&self, path: &Path, content: S) -> StorageResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let tmp_path = self.temp_path();
        let failed = |source: io::Error| StorageError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let written = match write_stream(&tmp_path, content).await {
            Ok(written) => written,
            Err(err) => {
                discard(&tmp_path).await;
                return Err(failed(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, path).await {
            discard(&tmp_path).await;
            return Err(failed(err));
        }

        if let Err(err) = self.sync_root().await {
            discard(path).await;
            return Err(failed(err));
        }

        Ok(written)
    }

    /// Flush the root directory entry so a completed rename survives a crash.
    #[cfg(unix)]
    async fn sync_root(&self) -> io::Result<()> {
        File::open(&self.root).await?.sync_all().await
    }

    #[cfg(not(unix))]
    async fn sync_root(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Descriptive fields lifted out of the extension map, plus what remains.
struct FieldOverrides {
    original_name: Option<String>,
    mime_type: Option<String>,
    size: Option<u64>,
    extra: Map<String, Value>,
}

impl FieldOverrides {
    fn split(mut extra: Map<String, Value>) -> StorageResult<Self> {
        if let Some(key) = RESERVED_FIELDS.iter().find(|key| extra.contains_key(**key)) {
            return Err(StorageError::InvalidInput(format!(
                "extension field `{key}` is reserved"
            )));
        }

        let original_name = take_string(&mut extra, "originalName")?;
        if original_name.as_deref() == Some("") {
            return Err(StorageError::InvalidInput(
                "extension field `originalName` must not be empty".into(),
            ));
        }
        let mime_type =
            take_string(&mut extra, "mimetype")?.or(take_string(&mut extra, "mimeType")?);
        let size = match extra.remove("size") {
            None => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                StorageError::InvalidInput(
                    "extension field `size` must be a non-negative integer".into(),
                )
            })?),
        };

        Ok(Self {
            original_name,
            mime_type,
            size,
            extra,
        })
    }
}

fn take_string(extra: &mut Map<String, Value>, key: &str) -> StorageResult<Option<String>> {
    match extra.remove(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(StorageError::InvalidInput(format!(
            "extension field `{key}` must be a string"
        ))),
    }
}

async fn write_stream<S>(path: &Path, content: S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let mut written: u64 = 0;
    pin_mut!(content);
    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Best-effort removal of a partial artifact.
async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("removed partial file {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove partial file {}: {}", path.display(), err),
    }
}

/// Content file name for a new object: `id` plus the declared extension.
fn stored_name_for(id: &str, declared_name: &str) -> String {
    let ext = extension_of(declared_name);
    if ext.eq_ignore_ascii_case(METADATA_EXT) {
        format!("{id}{ext}{COLLISION_SUFFIX}")
    } else {
        format!("{id}{ext}")
    }
}

/// Extension of the last path segment, from its last `.` inclusive.
///
/// A leading dot (`.bashrc`) does not start an extension.
fn extension_of(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if base.chars().all(|c| c == '.') {
        return "";
    }
    match base.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &base[idx..],
    }
}

/// True for a single path component that cannot escape the root.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (ObjectStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path().join("objects"));
        store.initialize().await.unwrap();
        (store, temp_dir)
    }

    async fn file_names(store: &ObjectStore) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(store.root()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    async fn write_sidecar(store: &ObjectStore, id: &str, created_at: &str) {
        let record = json!({
            "id": id,
            "originalName": format!("{id}.txt"),
            "fileName": format!("{id}.txt"),
            "size": 1,
            "mimetype": "text/plain",
            "uploadDate": created_at,
        });
        fs::write(
            store.root().join(format!("{id}.json")),
            serde_json::to_vec_pretty(&record).unwrap(),
        )
        .await
        .unwrap();
        fs::write(store.root().join(format!("{id}.txt")), b"x")
            .await
            .unwrap();
    }

    fn note() -> ObjectUpload {
        ObjectUpload::new("note.txt", "text/plain").with_size(5)
    }

    #[tokio::test]
    async fn test_initialize_creates_nested_root_and_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path().join("a").join("b").join("c"));

        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_initialize_sweeps_stale_temp_files() {
        let (store, _temp) = create_test_store().await;
        let kept = store.save_object(note(), "hello").await.unwrap();
        fs::write(store.root().join(".tmp-interrupted"), b"partial")
            .await
            .unwrap();

        store.initialize().await.unwrap();

        let mut expected = vec![format!("{}.json", kept.id), kept.stored_name.clone()];
        expected.sort();
        assert_eq!(file_names(&store).await, expected);
    }

    #[tokio::test]
    async fn test_initialize_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("not-a-dir");
        fs::write(&root, b"occupied").await.unwrap();

        let err = ObjectStore::new(&root).initialize().await.unwrap_err();
        assert!(matches!(err, StorageError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_save_and_get_note() {
        let (store, _temp) = create_test_store().await;

        let record = store.save_object(note(), "hello").await.unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(record.original_name, "note.txt");
        assert_eq!(record.mime_type, "text/plain");
        assert!(record.stored_name.ends_with(".txt"));
        assert_eq!(record.stored_name, format!("{}.txt", record.id));

        let stored = store.get_object(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.record, record);
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_sidecar_is_pretty_json_with_extension_fields() {
        let (store, _temp) = create_test_store().await;

        let upload = note().with_field("owner", "alice").with_field("tags", json!(["a", "b"]));
        let record = store.save_object(upload, "hello").await.unwrap();

        let raw = fs::read_to_string(store.root().join(format!("{}.json", record.id)))
            .await
            .unwrap();
        assert!(raw.contains("\n  \"id\""));
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["owner"], json!("alice"));
        assert_eq!(value["tags"], json!(["a", "b"]));
        assert_eq!(value["fileName"], json!(record.stored_name));
        assert_eq!(value["mimetype"], json!("text/plain"));
    }

    #[tokio::test]
    async fn test_size_without_declaration_is_written_length() {
        let (store, _temp) = create_test_store().await;

        let upload = ObjectUpload::new("blob.bin", "application/octet-stream");
        let record = store.save_object(upload, vec![0u8; 1024]).await.unwrap();

        assert_eq!(record.size, 1024);
    }

    #[tokio::test]
    async fn test_declared_size_is_kept() {
        let (store, _temp) = create_test_store().await;

        let upload = ObjectUpload::new("short.txt", "text/plain").with_size(99);
        let record = store.save_object(upload, "abc").await.unwrap();

        assert_eq!(record.size, 99);
    }

    #[tokio::test]
    async fn test_empty_name_is_invalid_and_writes_nothing() {
        let (store, _temp) = create_test_store().await;

        let err = store
            .save_object(ObjectUpload::new("", "text/plain"), "data")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert!(file_names(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_reserved_extension_fields_are_rejected() {
        let (store, _temp) = create_test_store().await;

        for key in ["id", "fileName", "storedName", "uploadDate", "createdAt"] {
            let upload = note().with_field(key, "spoofed");
            let err = store.save_object(upload, "hello").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)), "{key}");
        }
        assert!(file_names(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_descriptive_extension_fields_override() {
        let (store, _temp) = create_test_store().await;

        let upload = note()
            .with_field("originalName", "renamed.md")
            .with_field("mimeType", "text/markdown")
            .with_field("size", 7);
        let record = store.save_object(upload, "hello").await.unwrap();

        assert_eq!(record.original_name, "renamed.md");
        assert_eq!(record.mime_type, "text/markdown");
        assert_eq!(record.size, 7);
        assert!(record.extra.is_empty());
        // the extension comes from the declared name, not the override
        assert!(record.stored_name.ends_with(".txt"));

        let reread = store.get_object(&record.id).await.unwrap().unwrap();
        assert_eq!(reread.record, record);
    }

    #[tokio::test]
    async fn test_mistyped_extension_fields_are_rejected() {
        let (store, _temp) = create_test_store().await;

        let cases = [
            ("originalName", json!(3)),
            ("mimetype", json!(true)),
            ("size", json!(-1)),
            ("size", json!("5")),
        ];
        for (key, value) in cases {
            let upload = note().with_field(key, value);
            let err = store.save_object(upload, "hello").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)), "{key}");
        }
        assert!(file_names(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_failure_leaves_no_files() {
        let (store, _temp) = create_test_store().await;

        let content = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ]);
        let err = store
            .save_object_stream(note(), content)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::WriteFailed { .. }));
        assert!(file_names(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_failure_rolls_back_content() {
        let (store, _temp) = create_test_store().await;
        // a directory squatting on the sidecar name makes the rename fail
        fs::create_dir(store.root().join("fixed.json")).await.unwrap();

        let content = stream::once(future::ready(Ok(Bytes::from_static(b"hello"))));
        let err = store
            .persist_object("fixed".into(), note(), content)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::WriteFailed { .. }));
        assert_eq!(file_names(&store).await, vec!["fixed.json".to_string()]);
    }

    #[tokio::test]
    async fn test_save_creates_pair_and_delete_removes_it() {
        let (store, _temp) = create_test_store().await;

        let record = store.save_object(note(), "hello").await.unwrap();
        let mut expected = vec![format!("{}.json", record.id), record.stored_name.clone()];
        expected.sort();
        assert_eq!(file_names(&store).await, expected);

        assert!(store.delete_object(&record.id).await.unwrap());
        assert!(file_names(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let (store, _temp) = create_test_store().await;

        let record = store.save_object(note(), "hello").await.unwrap();
        assert!(store.delete_object(&record.id).await.unwrap());

        assert!(store.get_object(&record.id).await.unwrap().is_none());
        assert!(!store.delete_object(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_noop() {
        let (store, _temp) = create_test_store().await;
        let kept = store.save_object(note(), "hello").await.unwrap();
        let before = file_names(&store).await;

        let deleted = store
            .delete_object(&Uuid::new_v4().to_string())
            .await
            .unwrap();

        assert!(!deleted);
        assert_eq!(file_names(&store).await, before);
        assert!(store.get_object(&kept.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let (store, _temp) = create_test_store().await;
        write_sidecar(&store, "t2", "2025-03-02T00:00:00.000Z").await;
        write_sidecar(&store, "t3", "2025-03-03T00:00:00.000Z").await;
        write_sidecar(&store, "t1", "2025-03-01T00:00:00.000Z").await;

        let ids: Vec<String> = store
            .list_objects()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();

        assert_eq!(ids, vec!["t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn test_list_includes_saved_objects() {
        let (store, _temp) = create_test_store().await;

        let first = store.save_object(note(), "one").await.unwrap();
        let second = store.save_object(note(), "two").await.unwrap();

        let records = store.list_objects().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.contains(&first));
        assert!(records.contains(&second));
        assert!(records[0].created_at >= records[1].created_at);
    }

    #[tokio::test]
    async fn test_list_skips_truncated_sidecar() {
        let (store, _temp) = create_test_store().await;
        let good = store.save_object(note(), "good").await.unwrap();
        let bad = store.save_object(note(), "bad").await.unwrap();

        let bad_meta = store.root().join(format!("{}.json", bad.id));
        let raw = fs::read(&bad_meta).await.unwrap();
        fs::write(&bad_meta, &raw[..raw.len() / 2]).await.unwrap();

        let records = store.list_objects().await.unwrap();
        assert_eq!(records, vec![good]);
    }

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path().join("never-created"));

        assert!(store.list_objects().await.unwrap().is_empty());
        assert_eq!(store.usage().await.unwrap(), StoreUsage::default());
    }

    #[tokio::test]
    async fn test_get_with_missing_content_is_not_found() {
        let (store, _temp) = create_test_store().await;
        let record = store.save_object(note(), "hello").await.unwrap();

        fs::remove_file(store.root().join(&record.stored_name))
            .await
            .unwrap();

        assert!(store.get_object(&record.id).await.unwrap().is_none());
        assert!(store.open_object(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_content() {
        let (store, _temp) = create_test_store().await;
        let record = store.save_object(note(), "hello").await.unwrap();

        fs::remove_file(store.root().join(&record.stored_name))
            .await
            .unwrap();

        assert!(store.delete_object(&record.id).await.unwrap());
        assert!(file_names(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_is_reported_on_targeted_operations() {
        let (store, _temp) = create_test_store().await;
        let record = store.save_object(note(), "hello").await.unwrap();
        fs::write(store.root().join(format!("{}.json", record.id)), b"{\"id\": ")
            .await
            .unwrap();

        let err = store.get_object(&record.id).await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptMetadata { .. }));

        let err = store.delete_object(&record.id).await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptMetadata { .. }));
        // content is left in place rather than orphaned silently
        assert!(store.root().join(&record.stored_name).exists());
    }

    #[tokio::test]
    async fn test_sidecar_pointing_outside_root_is_corrupt() {
        let (store, _temp) = create_test_store().await;
        let record = json!({
            "id": "escape",
            "originalName": "x",
            "fileName": "../outside.txt",
            "size": 1,
            "mimetype": "text/plain",
            "uploadDate": "2025-01-01T00:00:00Z",
        });
        fs::write(
            store.root().join("escape.json"),
            serde_json::to_vec(&record).unwrap(),
        )
        .await
        .unwrap();

        let err = store.delete_object("escape").await.unwrap_err();
        assert!(matches!(err, StorageError::CorruptMetadata { .. }));
    }

    #[tokio::test]
    async fn test_unsafe_ids_are_rejected() {
        let (store, _temp) = create_test_store().await;

        for id in ["", "..", "../etc/passwd", "a/b", "a\\b", "a\nb", "tab\tid"] {
            let err = store.get_object(id).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)), "{id:?}");
            let err = store.delete_object(id).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidInput(_)), "{id:?}");
        }
    }

    #[tokio::test]
    async fn test_json_upload_does_not_collide_with_sidecar() {
        let (store, _temp) = create_test_store().await;

        let upload = ObjectUpload::new("config.JSON", "application/json");
        let record = store.save_object(upload, "{\"k\":1}").await.unwrap();
        assert_eq!(record.stored_name, format!("{}.JSON.content", record.id));

        assert_eq!(store.list_objects().await.unwrap(), vec![record.clone()]);
        let stored = store.get_object(&record.id).await.unwrap().unwrap();
        assert_eq!(fs::read(&stored.path).await.unwrap(), b"{\"k\":1}");
    }

    #[tokio::test]
    async fn test_open_object_reads_content() {
        use tokio::io::AsyncReadExt;

        let (store, _temp) = create_test_store().await;
        let record = store.save_object(note(), "hello").await.unwrap();

        let (opened, mut file) = store.open_object(&record.id).await.unwrap().unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).await.unwrap();

        assert_eq!(opened, record);
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_concurrent_saves_are_independent() {
        let (store, _temp) = create_test_store().await;

        let saves = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let upload = ObjectUpload::new(format!("file-{i}.dat"), "application/octet-stream");
                store.save_object(upload, vec![i as u8; i + 1]).await
            })
        });
        let records: Vec<ObjectRecord> = futures::future::join_all(saves)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let mut ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(store.list_objects().await.unwrap().len(), 16);
        assert_eq!(file_names(&store).await.len(), 32);
    }

    #[tokio::test]
    async fn test_usage_sums_recorded_sizes() {
        let (store, _temp) = create_test_store().await;
        store.save_object(note(), "hello").await.unwrap();
        store
            .save_object(ObjectUpload::new("b.bin", "application/octet-stream"), vec![1u8; 10])
            .await
            .unwrap();

        let usage = store.usage().await.unwrap();
        assert_eq!(usage, StoreUsage { objects: 2, total_bytes: 15 });
    }

    #[tokio::test]
    async fn test_created_at_is_set_at_creation() {
        let (store, _temp) = create_test_store().await;
        let before: DateTime<Utc> = Utc::now();

        let record = store.save_object(note(), "hello").await.unwrap();

        assert!(record.created_at >= before);
        assert!(record.created_at <= Utc::now());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("note.txt"), ".txt");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("trailing."), ".");
        assert_eq!(extension_of("dir.d/file"), "");
        assert_eq!(extension_of("C:\\docs\\report.pdf"), ".pdf");
        assert_eq!(extension_of(".."), "");
    }

    #[test]
    fn test_stored_name_for() {
        assert_eq!(stored_name_for("abc", "note.txt"), "abc.txt");
        assert_eq!(stored_name_for("abc", "Makefile"), "abc");
        assert_eq!(stored_name_for("abc", "data.json"), "abc.json.content");
    }
}
