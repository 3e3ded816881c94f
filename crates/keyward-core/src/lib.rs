//! Core abstractions for Keyward: credential entities, the field-cipher and
//! record-store contracts, and the decrypted views handed to push agents.
//! Concrete crypto and filesystem code lives in `keyward-storage`.

pub mod bundle;
pub mod cipher;
pub mod error;
pub mod key;
pub mod models;
pub mod storage;
pub mod validation;

pub use cipher::{EncryptedField, FieldCipher, SecretValue};
pub use error::CredentialError;
pub use key::PrivateKey;
