use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keyward_core::storage::{RecordStore, RecordStoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// File-backed record store: one file per key under `root`, replaced atomically on write.
/// Secret columns inside the records are already sealed by the field cipher.
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(sanitize_key(key))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), RecordStoreError> {
        let path = self.path_for(key);
        write_file(&path, value)
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, RecordStoreError> {
        let path = self.path_for(key);
        read_file(&path, key)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), RecordStoreError> {
        let path = self.path_for(key);
        match fs::remove_file(path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

fn write_file(path: &Path, value: &[u8]) -> Result<(), RecordStoreError> {
    let parent = path.parent().ok_or_else(|| RecordStoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    #[cfg(unix)]
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(storage_err)?;
    tmp.write_all(value).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_file(path: &Path, key: &str) -> Result<Vec<u8>, RecordStoreError> {
    let mut file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            RecordStoreError::NotFound {
                key: key.to_string(),
            }
        } else {
            storage_err(err)
        }
    })?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    Ok(buf)
}

fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn storage_err<E: ToString>(err: E) -> RecordStoreError {
    RecordStoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_writes_and_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());

        store.put("system_users", b"[]").await.expect("put");
        let read = store.get("system_users").await.expect("get");
        assert_eq!(read, b"[]");

        store.put("system_users", b"[1]").await.expect("overwrite");
        assert_eq!(store.get("system_users").await.expect("get"), b"[1]");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path().join("nested"));
        let err = store.get("assets").await.expect_err("missing");
        assert_eq!(
            err,
            RecordStoreError::NotFound {
                key: "assets".into()
            }
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        store.put("k", b"v").await.expect("put");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");

        let err = store.get("k").await.expect_err("should be missing");
        assert!(matches!(err, RecordStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn keys_cannot_escape_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path().join("root"));
        store.put("../escape", b"x").await.expect("put");
        assert!(!dir.path().join("escape").exists());
        assert_eq!(fs::read_dir(store.root()).expect("read dir").count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_owner_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileRecordStore::new(dir.path());
        store.put("admin_users", b"[]").await.expect("put");
        let mode = fs::metadata(store.path_for("admin_users"))
            .expect("meta")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
