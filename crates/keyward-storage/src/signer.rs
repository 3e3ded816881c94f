use std::fmt;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keyward_core::{CredentialError, FieldCipher};
use tracing::{debug, instrument};

use crate::key_provider::{KeyMaterial, KeyProvider};

/// Blob format version. Bound into the associated data with the key id.
const BLOB_VERSION: &str = "v1";
const SEPARATOR: char = '$';
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM field cipher.
///
/// Blobs look like `v1$<base64url(nonce || ciphertext || tag)>`. A fresh
/// random nonce is drawn per call, so sealing the same plaintext twice gives
/// different blobs. The associated data is `v1:<key id>`, so a blob only
/// opens under the key that sealed it.
pub struct AesGcmSigner {
    cipher: Aes256Gcm,
    key_id: String,
    aad: Vec<u8>,
}

impl AesGcmSigner {
    pub fn new(material: &KeyMaterial) -> Result<Self, CredentialError> {
        let cipher = Aes256Gcm::new_from_slice(&material.bytes)
            .map_err(|e| CredentialError::configuration(format!("cipher init failed: {e}")))?;
        Ok(Self {
            cipher,
            key_id: material.id.clone(),
            aad: format!("{BLOB_VERSION}:{}", material.id).into_bytes(),
        })
    }

    /// Resolve key material once; the signer keeps it for the rest of the process.
    #[instrument(skip_all)]
    pub async fn from_provider<P: KeyProvider + ?Sized>(
        provider: &P,
    ) -> Result<Self, CredentialError> {
        let material = provider
            .get_or_create()
            .await
            .map_err(|e| CredentialError::configuration(format!("key provider: {e}")))?;
        let signer = Self::new(&material)?;
        debug!(key_id = %signer.key_id, "field cipher ready");
        Ok(signer)
    }
}

impl fmt::Debug for AesGcmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl FieldCipher for AesGcmSigner {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, plaintext: &str) -> Result<String, CredentialError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &self.aad,
                },
            )
            .map_err(|e| CredentialError::configuration(format!("encrypt failed: {e}")))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(nonce.as_slice());
        raw.extend_from_slice(&ciphertext);
        Ok(format!(
            "{BLOB_VERSION}{SEPARATOR}{}",
            URL_SAFE_NO_PAD.encode(raw)
        ))
    }

    fn unsign(&self, blob: &str) -> Result<String, CredentialError> {
        let (version, body) = blob
            .split_once(SEPARATOR)
            .ok_or(CredentialError::InvalidSignature)?;
        if version != BLOB_VERSION {
            return Err(CredentialError::InvalidSignature);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| CredentialError::InvalidSignature)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CredentialError::InvalidSignature);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &self.aad,
                },
            )
            .map_err(|_| CredentialError::InvalidSignature)?;

        String::from_utf8(plaintext).map_err(|_| CredentialError::InvalidSignature)
    }
}
