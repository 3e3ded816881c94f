use std::{
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

/// Shortest configured secret accepted for key derivation.
pub const MIN_SECRET_LEN: usize = 32;

const DERIVATION_SALT: &[u8] = b"keyward";
const DERIVATION_CONTEXT: &[u8] = b"keyward/field-cipher/v1";

/// Key material used for field encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl KeyMaterial {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self {
            id: fingerprint(&bytes),
            bytes,
        }
    }

    /// Derive key material from a configured secret string with HKDF-SHA256.
    pub fn derive(secret: &str) -> Result<Self, KeyError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(KeyError::Missing);
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(KeyError::Decode(format!(
                "secret must be at least {MIN_SECRET_LEN} characters, got {}",
                secret.len()
            )));
        }

        let mut okm = [0u8; 32];
        Hkdf::<Sha256>::new(Some(DERIVATION_SALT), secret.as_bytes())
            .expand(DERIVATION_CONTEXT, &mut okm)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        Ok(Self::new(okm))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no secret key configured")]
    Missing,
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides the process-wide field key (configured secret, OS keychain, or memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Key derived from a secret in configuration or the environment.
pub struct SecretKeyProvider {
    secret: Option<String>,
}

impl SecretKeyProvider {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl fmt::Debug for SecretKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyProvider")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

#[async_trait]
impl KeyProvider for SecretKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        match self.secret.as_deref() {
            Some(secret) => KeyMaterial::derive(secret),
            None => Err(KeyError::Missing),
        }
    }
}

impl Drop for SecretKeyProvider {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the key.
///
/// A key is generated only when the entry does not exist yet. Any other
/// keyring failure is returned, so an unreachable store never replaces the
/// key that sealed existing records.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        if let Some(material) = stored_key(entry.get_password())? {
            return Ok(material);
        }

        let material = generate_key();
        entry
            .set_password(&encode_key(&material))
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        Ok(material)
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

/// Random secret suitable for the `secret_key` config entry.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let secret = general_purpose::STANDARD.encode(bytes);
    bytes.zeroize();
    secret
}

pub fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial::new(bytes)
}

fn fingerprint(bytes: &[u8; 32]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)[..12].to_string()
}

fn stored_key(result: Result<String, keyring::Error>) -> Result<Option<KeyMaterial>, KeyError> {
    match result {
        Ok(secret) => decode_key(&secret).map(Some),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(KeyError::Keyring(e.to_string())),
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != 32 {
        return Err(KeyError::Decode(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial::new(out))
}
