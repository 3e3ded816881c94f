use std::{path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use keyward_core::{storage::RecordStore, FieldCipher};
use keyward_inventory::Inventory;
use keyward_push::SecretProjector;
use keyward_storage::{
    file_store::FileRecordStore,
    key_file::KeyMaterializer,
    key_provider::{KeyringProvider, SecretKeyProvider},
    signer::AesGcmSigner,
};
use tracing::debug;

use crate::config::{Config, KeySource};

const KEYRING_SERVICE: &str = "keyward";
const KEYRING_ACCOUNT: &str = "field-key";

/// Everything a command needs: the inventory, the field cipher and the projector sharing it.
pub struct Vault<S: RecordStore> {
    pub inventory: Inventory<S>,
    pub cipher: Arc<dyn FieldCipher>,
    pub projector: SecretProjector,
}

impl<S: RecordStore> Vault<S> {
    pub fn new(store: S, cipher: Arc<dyn FieldCipher>, materializer: KeyMaterializer) -> Self {
        Self {
            inventory: Inventory::new(store),
            projector: SecretProjector::new(Arc::clone(&cipher), materializer),
            cipher,
        }
    }

    pub fn cipher(&self) -> &dyn FieldCipher {
        self.cipher.as_ref()
    }
}

/// Resolve the default data directory for Keyward.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("keyward"))
}

pub fn data_dir_from_config(config: &Config) -> Result<PathBuf> {
    match &config.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => default_data_dir(),
    }
}

pub fn store_from_config(config: &Config) -> Result<FileRecordStore> {
    let root = data_dir_from_config(config)?.join("records");
    debug!(?root, "initializing record store");
    Ok(FileRecordStore::new(root))
}

pub fn materializer_from_config(config: &Config) -> Result<KeyMaterializer> {
    let project_dir = match &config.project_dir {
        Some(dir) => dir.clone(),
        None => data_dir_from_config(config)?,
    };
    Ok(KeyMaterializer::for_project(project_dir))
}

/// Build the field cipher. Missing key material is a configuration error.
pub async fn signer_from_config(config: &Config) -> Result<AesGcmSigner> {
    let signer = match config.key_source {
        KeySource::Config => {
            AesGcmSigner::from_provider(&SecretKeyProvider::new(config.resolve_secret())).await?
        }
        KeySource::Keyring => {
            AesGcmSigner::from_provider(&KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT))
                .await?
        }
    };
    Ok(signer)
}

pub async fn open(config: &Config) -> Result<Vault<FileRecordStore>> {
    let cipher: Arc<dyn FieldCipher> = Arc::new(signer_from_config(config).await?);
    Ok(Vault::new(
        store_from_config(config)?,
        cipher,
        materializer_from_config(config)?,
    ))
}

/// Vault over an in-memory store with a random key and key files under `project_dir`.
#[cfg(test)]
pub fn test_vault(
    project_dir: impl AsRef<std::path::Path>,
) -> Vault<keyward_core::storage::InMemoryRecordStore> {
    use keyward_storage::key_provider::generate_key;

    let signer = AesGcmSigner::new(&generate_key()).expect("signer");
    Vault::new(
        keyward_core::storage::InMemoryRecordStore::new(),
        Arc::new(signer),
        KeyMaterializer::for_project(project_dir),
    )
}
