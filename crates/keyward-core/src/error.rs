use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Failures of the credential layer: field encryption, key parsing and key
/// file materialization.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Cipher key material is missing or unusable. Fatal at startup.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },
    /// Stored blob was tampered with, truncated, or sealed under another key/version.
    #[error("invalid signature on encrypted field")]
    InvalidSignature,
    /// Private key text is not a parseable PEM private key.
    #[error("malformed private key: {reason}")]
    MalformedKey { reason: String },
    /// Building a secret bundle for a user failed.
    #[error("credential projection failed for user {user_id}: {source}")]
    Projection {
        user_id: Uuid,
        #[source]
        source: Box<CredentialError>,
    },
    /// Filesystem failure while writing key material.
    #[error("storage io error at {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CredentialError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn malformed_key(reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            reason: reason.into(),
        }
    }

    pub fn storage_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageIo {
            path: path.into(),
            source,
        }
    }

    /// Tag a failure with the user it happened for. Already-tagged errors are left as is.
    pub fn for_user(self, user_id: Uuid) -> Self {
        match self {
            err @ Self::Projection { .. } => err,
            other => Self::Projection {
                user_id,
                source: Box::new(other),
            },
        }
    }
}
