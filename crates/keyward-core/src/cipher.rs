//! Reversible encryption of secret columns.
//!
//! `FieldCipher` is the seam to the concrete cipher (AES-GCM in `keyward-storage`).
//! `EncryptedField<T>` owns the at-rest blob of one column and is the only way
//! to get plaintext out of it, so every decrypt is visible at the call site.

use std::{borrow::Cow, fmt, marker::PhantomData};

use serde::{Deserialize, Serialize};

use crate::{error::CredentialError, key::PrivateKey};

/// Reversible transform between plaintext secrets and text-safe blobs.
pub trait FieldCipher: Send + Sync {
    /// Identifier of the key in use (never the key bytes).
    fn key_id(&self) -> &str;

    /// Seal a non-empty plaintext.
    fn sign(&self, plaintext: &str) -> Result<String, CredentialError>;

    /// Open a blob produced by `sign`. Tampered or foreign blobs yield `InvalidSignature`.
    fn unsign(&self, blob: &str) -> Result<String, CredentialError>;
}

/// Types that can live inside an `EncryptedField`.
pub trait SecretValue: Sized {
    /// Parse and validate plaintext into the value.
    fn from_plaintext(plaintext: &str) -> Result<Self, CredentialError>;

    fn to_plaintext(&self) -> Cow<'_, str>;
}

impl SecretValue for String {
    fn from_plaintext(plaintext: &str) -> Result<Self, CredentialError> {
        Ok(plaintext.to_string())
    }

    fn to_plaintext(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl SecretValue for PrivateKey {
    fn from_plaintext(plaintext: &str) -> Result<Self, CredentialError> {
        PrivateKey::parse(plaintext)
    }

    fn to_plaintext(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_pem())
    }
}

/// Encrypted column holding an optional `T`. Stored as the bare blob string.
#[derive(Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>", bound = "")]
pub struct EncryptedField<T> {
    blob: Option<String>,
    marker: PhantomData<fn() -> T>,
}

impl<T> EncryptedField<T> {
    pub fn empty() -> Self {
        Self {
            blob: None,
            marker: PhantomData,
        }
    }

    /// Wrap a blob loaded from storage. Empty strings are treated as absent.
    pub fn from_blob(blob: Option<String>) -> Self {
        Self {
            blob: blob.filter(|b| !b.is_empty()),
            marker: PhantomData,
        }
    }

    pub fn blob(&self) -> Option<&str> {
        self.blob.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_none()
    }
}

impl<T: SecretValue> EncryptedField<T> {
    /// Seal a typed value. Empty plaintext produces an empty field without touching the cipher.
    pub fn seal(value: &T, cipher: &dyn FieldCipher) -> Result<Self, CredentialError> {
        let plaintext = value.to_plaintext();
        if plaintext.is_empty() {
            return Ok(Self::empty());
        }
        Ok(Self::from_blob(Some(cipher.sign(&plaintext)?)))
    }

    /// Validate raw input as `T`, then seal it. Validation runs before encryption,
    /// so a rejected value never produces a blob.
    pub fn seal_plaintext(
        plaintext: &str,
        cipher: &dyn FieldCipher,
    ) -> Result<Self, CredentialError> {
        if plaintext.is_empty() {
            return Ok(Self::empty());
        }
        T::from_plaintext(plaintext)?;
        Ok(Self::from_blob(Some(cipher.sign(plaintext)?)))
    }

    /// Decrypt and parse. Absent fields return `None` without touching the cipher.
    pub fn open(&self, cipher: &dyn FieldCipher) -> Result<Option<T>, CredentialError> {
        match self.open_plaintext(cipher)? {
            Some(plaintext) => T::from_plaintext(&plaintext).map(Some),
            None => Ok(None),
        }
    }

    /// Decrypt without parsing.
    pub fn open_plaintext(
        &self,
        cipher: &dyn FieldCipher,
    ) -> Result<Option<String>, CredentialError> {
        match &self.blob {
            Some(blob) => {
                let plaintext = cipher.unsign(blob)?;
                Ok(Some(plaintext).filter(|p| !p.is_empty()))
            }
            None => Ok(None),
        }
    }
}

impl<T> From<Option<String>> for EncryptedField<T> {
    fn from(blob: Option<String>) -> Self {
        Self::from_blob(blob)
    }
}

impl<T> From<EncryptedField<T>> for Option<String> {
    fn from(field: EncryptedField<T>) -> Self {
        field.blob
    }
}

impl<T> Default for EncryptedField<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for EncryptedField<T> {
    fn clone(&self) -> Self {
        Self::from_blob(self.blob.clone())
    }
}

impl<T> PartialEq for EncryptedField<T> {
    fn eq(&self, other: &Self) -> bool {
        self.blob == other.blob
    }
}

impl<T> Eq for EncryptedField<T> {}

impl<T> fmt::Debug for EncryptedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.blob {
            Some(_) => f.write_str("EncryptedField(<sealed>)"),
            None => f.write_str("EncryptedField(<empty>)"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Reversible, non-cryptographic cipher that counts calls.
    #[derive(Debug, Default)]
    pub struct CountingCipher {
        pub calls: AtomicUsize,
    }

    impl CountingCipher {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FieldCipher for CountingCipher {
        fn key_id(&self) -> &str {
            "counting"
        }

        fn sign(&self, plaintext: &str) -> Result<String, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("sealed:{}", plaintext.chars().rev().collect::<String>()))
        }

        fn unsign(&self, blob: &str) -> Result<String, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            blob.strip_prefix("sealed:")
                .map(|rest| rest.chars().rev().collect())
                .ok_or(CredentialError::InvalidSignature)
        }
    }
}
