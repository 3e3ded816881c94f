//! Inventory entities: managed assets, their grouping, and the accounts used
//! to log into them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    cipher::{EncryptedField, FieldCipher},
    error::CredentialError,
    key::PrivateKey,
    validation::{self, ValidationError},
};

/// Login secrets shared by admin users and system users.
///
/// Each secret column is an `EncryptedField`; setters validate and seal the
/// new value before replacing the old one, so a rejected assignment leaves
/// the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: EncryptedField<String>,
    #[serde(default)]
    pub private_key: EncryptedField<PrivateKey>,
    #[serde(default)]
    pub public_key: EncryptedField<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn set_password(&mut self, raw: &str, cipher: &dyn FieldCipher) -> Result<(), CredentialError> {
        self.password = EncryptedField::seal_plaintext(raw, cipher)?;
        Ok(())
    }

    /// Rejects text that is not a PEM private key with `MalformedKey`.
    pub fn set_private_key(
        &mut self,
        raw: &str,
        cipher: &dyn FieldCipher,
    ) -> Result<(), CredentialError> {
        self.private_key = EncryptedField::seal_plaintext(raw, cipher)?;
        Ok(())
    }

    pub fn set_public_key(
        &mut self,
        raw: &str,
        cipher: &dyn FieldCipher,
    ) -> Result<(), CredentialError> {
        self.public_key = EncryptedField::seal_plaintext(raw, cipher)?;
        Ok(())
    }

    pub fn password(&self, cipher: &dyn FieldCipher) -> Result<Option<String>, CredentialError> {
        self.password.open(cipher)
    }

    pub fn private_key(
        &self,
        cipher: &dyn FieldCipher,
    ) -> Result<Option<PrivateKey>, CredentialError> {
        self.private_key.open(cipher)
    }

    pub fn public_key(&self, cipher: &dyn FieldCipher) -> Result<Option<String>, CredentialError> {
        self.public_key.open(cipher)
    }

    /// Whether a password or private key is stored. Credentials without
    /// either are accepted but cannot be used to log in.
    pub fn can_login(&self) -> bool {
        !self.password.is_empty() || !self.private_key.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BecomeMethod {
    #[default]
    Sudo,
    Su,
}

impl BecomeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BecomeMethod::Sudo => "sudo",
            BecomeMethod::Su => "su",
        }
    }
}

/// Privilege escalation used by an admin user after logging in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Become {
    pub enabled: bool,
    pub method: BecomeMethod,
    pub user: String,
}

impl Default for Become {
    fn default() -> Self {
        Self {
            enabled: true,
            method: BecomeMethod::Sudo,
            user: "root".to_string(),
        }
    }
}

/// Privileged account the push agent connects with to manage system users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminUser {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub credential: Credential,
    #[serde(rename = "become", default)]
    pub escalation: Become,
    #[serde(default)]
    pub become_password: EncryptedField<String>,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl AdminUser {
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            credential: Credential::new(username),
            escalation: Become::default(),
            become_password: EncryptedField::empty(),
            comment: String::new(),
            created_at: Utc::now(),
            created_by: None,
        }
    }

    pub fn set_become_password(
        &mut self,
        raw: &str,
        cipher: &dyn FieldCipher,
    ) -> Result<(), CredentialError> {
        self.become_password = EncryptedField::seal_plaintext(raw, cipher)?;
        Ok(())
    }

    pub fn become_password(
        &self,
        cipher: &dyn FieldCipher,
    ) -> Result<Option<String>, CredentialError> {
        self.become_password.open(cipher)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::required("name", &self.name, validation::NAME_MAX)?;
        validation::username(&self.credential.username)?;
        validation::required(
            "become_user",
            &self.escalation.user,
            validation::BECOME_USER_MAX,
        )
    }

    /// Listing projection; never includes secrets.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "username": self.credential.username,
            "become": self.escalation.enabled,
            "become_method": self.escalation.method,
            "become_user": self.escalation.user,
            "comment": self.comment,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ssh,
}

/// How a system user authenticates once pushed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthMethod {
    #[serde(rename = "P")]
    Password,
    #[default]
    #[serde(rename = "K")]
    PublicKey,
}

impl AuthMethod {
    pub fn uses_key(&self) -> bool {
        matches!(self, AuthMethod::PublicKey)
    }
}

pub const DEFAULT_SUDO: &str = "/sbin/ifconfig";
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Account created on managed assets for end users to log in with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemUser {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub credential: Credential,
    #[serde(default)]
    pub clusters: BTreeSet<Uuid>,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub auth_method: AuthMethod,
    pub auto_push: bool,
    pub sudo: String,
    pub shell: String,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl SystemUser {
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            credential: Credential::new(username),
            clusters: BTreeSet::new(),
            protocol: Protocol::Ssh,
            auth_method: AuthMethod::PublicKey,
            auto_push: true,
            sudo: DEFAULT_SUDO.to_string(),
            shell: DEFAULT_SHELL.to_string(),
            comment: String::new(),
            created_at: Utc::now(),
            created_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::required("name", &self.name, validation::NAME_MAX)?;
        validation::username(&self.credential.username)?;
        validation::required("shell", &self.shell, validation::SHELL_MAX)?;
        validation::at_most("comment", &self.comment, validation::COMMENT_MAX)
    }

    /// Listing projection; never includes secrets.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "username": self.credential.username,
            "protocol": self.protocol,
            "auth_method": self.auth_method,
            "auto_push": self.auto_push,
        })
    }
}

/// A managed machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub id: Uuid,
    pub ip: String,
    pub hostname: String,
    pub port: u16,
    pub cluster: Option<Uuid>,
    pub admin_user: Option<Uuid>,
    #[serde(default)]
    pub groups: BTreeSet<Uuid>,
    #[serde(default)]
    pub system_users: BTreeSet<Uuid>,
    pub is_active: bool,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ip: ip.into(),
            hostname: hostname.into(),
            port: 22,
            cluster: None,
            admin_user: None,
            groups: BTreeSet::new(),
            system_users: BTreeSet::new(),
            is_active: true,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::required("ip", &self.ip, validation::NAME_MAX)?;
        validation::required("hostname", &self.hostname, validation::NAME_MAX)?;
        if self.port == 0 {
            return Err(ValidationError::new("port", "must be between 1 and 65535"));
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "ip": self.ip,
            "hostname": self.hostname,
            "port": self.port,
            "cluster": self.cluster,
            "admin_user": self.admin_user,
            "is_active": self.is_active,
        })
    }
}

/// Named set of assets; system users attached to a group are pushed to its assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub system_users: BTreeSet<Uuid>,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl AssetGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            system_users: BTreeSet::new(),
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::required("name", &self.name, validation::NAME_MAX)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "system_users": self.system_users.len(),
            "comment": self.comment,
        })
    }
}

/// Data-center style grouping; its admin user is the fallback for member assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
    pub admin_user: Option<Uuid>,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            admin_user: None,
            comment: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::required("name", &self.name, validation::NAME_MAX)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "admin_user": self.admin_user,
            "comment": self.comment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::testing::CountingCipher;

    const FIXTURE: &str = include_str!("../../../fixtures/id_ed25519");

    #[test]
    fn system_user_defaults_match_push_expectations() {
        let user = SystemUser::new("web", "web");
        assert_eq!(user.auth_method, AuthMethod::PublicKey);
        assert!(user.auto_push);
        assert_eq!(user.sudo, DEFAULT_SUDO);
        assert_eq!(user.shell, DEFAULT_SHELL);
        assert!(!user.credential.can_login());
    }

    #[test]
    fn rejected_key_keeps_previous_value() {
        let cipher = CountingCipher::default();
        let mut user = SystemUser::new("web", "web");
        user.credential
            .set_private_key(FIXTURE, &cipher)
            .expect("valid key");
        let before = user.credential.private_key.clone();

        let err = user
            .credential
            .set_private_key("-----BEGIN GARBAGE-----", &cipher)
            .expect_err("malformed key");
        assert!(matches!(err, CredentialError::MalformedKey { .. }));
        assert_eq!(user.credential.private_key, before);
    }

    #[test]
    fn to_json_omits_secrets() {
        let cipher = CountingCipher::default();
        let mut user = SystemUser::new("web", "web");
        user.credential.set_password("hunter2", &cipher).expect("set");
        let value = user.to_json();

        let keys: Vec<_> = value
            .as_object()
            .expect("object")
            .keys()
            .cloned()
            .collect();
        assert_eq!(
            keys,
            ["auth_method", "auto_push", "id", "name", "protocol", "username"]
        );
        assert_eq!(value["auth_method"], "K");
        assert_eq!(value["protocol"], "ssh");
        assert!(!value.to_string().contains("hunter2"));
    }

    #[test]
    fn admin_user_round_trips_through_json() {
        let cipher = CountingCipher::default();
        let mut admin = AdminUser::new("ops", "root");
        admin.credential.set_password("pw", &cipher).expect("set");
        admin.set_become_password("sudo-pw", &cipher).expect("set");

        let encoded = serde_json::to_string(&admin).expect("serialize");
        assert!(encoded.contains("\"become\":{"));
        assert!(!encoded.contains("sudo-pw"));

        let decoded: AdminUser = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, admin);
        assert_eq!(
            decoded.become_password(&cipher).expect("open").as_deref(),
            Some("sudo-pw")
        );
    }

    #[test]
    fn validation_reports_offending_field() {
        let mut user = SystemUser::new("web", "web");
        user.shell = String::new();
        assert_eq!(user.validate().expect_err("shell").field, "shell");

        let mut asset = Asset::new("10.0.0.1", "web-1");
        asset.port = 0;
        assert_eq!(asset.validate().expect_err("port").field, "port");
    }
}
