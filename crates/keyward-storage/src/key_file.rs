//! Private keys written to disk for tools that only accept a key file path.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use keyward_core::{CredentialError, EncryptedField, FieldCipher, PrivateKey};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

const KEY_DIR_NAME: &str = "tmp";
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Writes decrypted private keys to `<dir>/<sha256(encrypted blob)>`.
///
/// Files are content addressed by the sealed blob, created at most once and
/// never removed here. Writes land in a temp file first and are linked into
/// place without clobbering, so readers never see a partial key.
#[derive(Debug, Clone)]
pub struct KeyMaterializer {
    dir: PathBuf,
}

impl KeyMaterializer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Key files under `<project_dir>/tmp`.
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self::new(project_dir.as_ref().join(KEY_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location for a sealed key blob.
    pub fn path_for(&self, encrypted_blob: &str) -> PathBuf {
        self.dir.join(content_hash(encrypted_blob))
    }

    /// Decrypt a key column and materialize it. Empty columns yield no path.
    pub fn materialize_field(
        &self,
        field: &EncryptedField<PrivateKey>,
        cipher: &dyn FieldCipher,
    ) -> Result<Option<PathBuf>, CredentialError> {
        let Some(blob) = field.blob() else {
            return Ok(None);
        };
        match field.open(cipher)? {
            Some(key) => self.materialize(blob, &key).map(Some),
            None => Ok(None),
        }
    }

    /// Ensure `key` exists on disk at the path derived from `encrypted_blob`.
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn materialize(
        &self,
        encrypted_blob: &str,
        key: &PrivateKey,
    ) -> Result<PathBuf, CredentialError> {
        let path = self.path_for(encrypted_blob);
        if path.exists() {
            debug!(path = %path.display(), "key file already present");
            return Ok(path);
        }

        self.ensure_dir()?;
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| CredentialError::storage_io(&self.dir, e))?;
        restrict_file(tmp.as_file(), tmp.path())?;
        if let Err(e) = write_key(&mut tmp, key) {
            return Err(CredentialError::storage_io(tmp.path(), e));
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                info!(path = %path.display(), "materialized private key file");
                Ok(path)
            }
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "key file written concurrently");
                Ok(path)
            }
            Err(err) => Err(CredentialError::storage_io(&path, err.error)),
        }
    }

    /// Create the key directory (owner-only) if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), CredentialError> {
        if self.dir.is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIR_MODE);
        builder
            .create(&self.dir)
            .map_err(|e| CredentialError::storage_io(&self.dir, e))
    }
}

/// Hex SHA-256 of the sealed blob.
pub fn content_hash(encrypted_blob: &str) -> String {
    format!("{:x}", Sha256::digest(encrypted_blob.as_bytes()))
}

fn write_key(tmp: &mut NamedTempFile, key: &PrivateKey) -> io::Result<()> {
    tmp.write_all(&key.file_contents())?;
    tmp.flush()?;
    tmp.as_file().sync_all()
}

fn restrict_file(file: &fs::File, path: &Path) -> Result<(), CredentialError> {
    #[cfg(unix)]
    file.set_permissions(fs::Permissions::from_mode(FILE_MODE))
        .map_err(|e| CredentialError::storage_io(path, e))?;
    #[cfg(not(unix))]
    let _ = (file, path);
    Ok(())
}
