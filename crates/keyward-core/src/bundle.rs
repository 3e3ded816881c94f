//! Decrypted credential views handed to the push agent. Built on demand and
//! never persisted.

use std::{fmt, path::PathBuf};

use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::models::BecomeMethod;

/// What the push agent needs to create a system user on a host.
///
/// The private key is passed as a file path, never inline.
#[derive(Clone, Serialize, PartialEq, Eq)]
pub struct SecretBundle {
    pub name: String,
    pub username: String,
    pub shell: String,
    pub sudo: String,
    pub password: Option<String>,
    pub public_key: Option<String>,
    pub private_key_file: Option<PathBuf>,
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("shell", &self.shell)
            .field("sudo", &self.sudo)
            .field("password", &redacted(&self.password))
            .field("public_key", &self.public_key.is_some())
            .field("private_key_file", &self.private_key_file)
            .finish()
    }
}

impl Drop for SecretBundle {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Connection credential of the admin user used to reach a host.
#[derive(Clone, Serialize, PartialEq, Eq)]
pub struct AdminAuth {
    pub username: String,
    pub password: Option<String>,
    pub private_key_file: Option<PathBuf>,
    #[serde(rename = "become")]
    pub escalate: bool,
    pub become_method: BecomeMethod,
    pub become_user: String,
    pub become_password: Option<String>,
}

impl fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAuth")
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("private_key_file", &self.private_key_file)
            .field("become", &self.escalate)
            .field("become_method", &self.become_method)
            .field("become_user", &self.become_user)
            .field("become_password", &redacted(&self.become_password))
            .finish()
    }
}

impl Drop for AdminAuth {
    fn drop(&mut self) {
        self.password.zeroize();
        self.become_password.zeroize();
    }
}

/// Full decrypted credential of one system user, for interactive login tooling.
#[derive(Clone, Serialize, PartialEq, Eq)]
pub struct AuthInfo {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub public_key: Option<String>,
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("private_key", &redacted(&self.private_key))
            .field("public_key", &self.public_key.is_some())
            .finish()
    }
}

impl Drop for AuthInfo {
    fn drop(&mut self) {
        self.password.zeroize();
        self.private_key.zeroize();
    }
}

fn redacted(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<redacted>",
        None => "<none>",
    }
}
