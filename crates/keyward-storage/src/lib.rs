//! Concrete credential storage: AES-GCM field cipher with keys from config,
//! the OS keyring or memory; private key file materialization; and an
//! atomic file-backed record store.

pub mod file_store;
pub mod key_file;
pub mod key_provider;
pub mod signer;
