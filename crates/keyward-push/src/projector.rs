use std::sync::Arc;

use keyward_core::{
    bundle::{AdminAuth, AuthInfo, SecretBundle},
    models::{AdminUser, SystemUser},
    CredentialError, FieldCipher,
};
use keyward_storage::key_file::KeyMaterializer;
use tracing::{debug, instrument};

/// Turns stored credentials into decrypted views for the push agent.
///
/// Each projection either succeeds completely or fails with
/// `CredentialError::Projection` naming the user.
#[derive(Clone)]
pub struct SecretProjector {
    cipher: Arc<dyn FieldCipher>,
    materializer: KeyMaterializer,
}

impl SecretProjector {
    pub fn new(cipher: Arc<dyn FieldCipher>, materializer: KeyMaterializer) -> Self {
        Self {
            cipher,
            materializer,
        }
    }

    pub fn materializer(&self) -> &KeyMaterializer {
        &self.materializer
    }

    /// Bundle for creating `user` on a host. The key file is only written
    /// when the user authenticates by key.
    #[instrument(skip_all, fields(user = %user.id))]
    pub fn project(&self, user: &SystemUser) -> Result<SecretBundle, CredentialError> {
        self.bundle(user).map_err(|e| e.for_user(user.id))
    }

    fn bundle(&self, user: &SystemUser) -> Result<SecretBundle, CredentialError> {
        let cipher = self.cipher.as_ref();
        let password = user.credential.password(cipher)?;
        let public_key = user.credential.public_key(cipher)?;
        let private_key_file = if user.auth_method.uses_key() {
            self.materializer
                .materialize_field(&user.credential.private_key, cipher)?
        } else {
            None
        };
        debug!(
            has_password = password.is_some(),
            has_key_file = private_key_file.is_some(),
            "projected system user"
        );
        Ok(SecretBundle {
            name: user.name.clone(),
            username: user.credential.username.clone(),
            shell: user.shell.clone(),
            sudo: user.sudo.clone(),
            password,
            public_key,
            private_key_file,
        })
    }

    /// Connection credential for reaching a host as `admin`.
    #[instrument(skip_all, fields(admin = %admin.id))]
    pub fn project_admin(&self, admin: &AdminUser) -> Result<AdminAuth, CredentialError> {
        self.admin_auth(admin).map_err(|e| e.for_user(admin.id))
    }

    fn admin_auth(&self, admin: &AdminUser) -> Result<AdminAuth, CredentialError> {
        let cipher = self.cipher.as_ref();
        Ok(AdminAuth {
            username: admin.credential.username.clone(),
            password: admin.credential.password(cipher)?,
            private_key_file: self
                .materializer
                .materialize_field(&admin.credential.private_key, cipher)?,
            escalate: admin.escalation.enabled,
            become_method: admin.escalation.method,
            become_user: admin.escalation.user.clone(),
            become_password: admin.become_password(cipher)?,
        })
    }

    /// Every secret of `user` in clear text. Nothing is written to disk.
    #[instrument(skip_all, fields(user = %user.id))]
    pub fn auth_info(&self, user: &SystemUser) -> Result<AuthInfo, CredentialError> {
        let cipher = self.cipher.as_ref();
        let open = || -> Result<AuthInfo, CredentialError> {
            Ok(AuthInfo {
                id: user.id,
                name: user.name.clone(),
                username: user.credential.username.clone(),
                password: user.credential.password(cipher)?,
                private_key: user
                    .credential
                    .private_key(cipher)?
                    .map(|key| key.as_pem().to_string()),
                public_key: user.credential.public_key(cipher)?,
            })
        };
        open().map_err(|e| e.for_user(user.id))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use keyward_core::{models::AuthMethod, EncryptedField, PrivateKey};
    use keyward_storage::{key_provider::generate_key, signer::AesGcmSigner};

    use super::*;

    const FIXTURE: &str = include_str!("../../../fixtures/id_ed25519");

    fn projector(dir: &std::path::Path) -> (SecretProjector, Arc<AesGcmSigner>) {
        let signer = Arc::new(AesGcmSigner::new(&generate_key()).expect("signer"));
        let projector = SecretProjector::new(signer.clone(), KeyMaterializer::for_project(dir));
        (projector, signer)
    }

    #[test]
    fn key_file_is_written_once_and_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut user = SystemUser::new("deploy", "deploy");
        user.credential
            .set_private_key(FIXTURE, signer.as_ref())
            .expect("set key");

        let first = projector.project(&user).expect("project");
        let path = first.private_key_file.clone().expect("key file");
        assert!(path.starts_with(dir.path().join("tmp")));
        let written = fs::read_to_string(&path).expect("read key");
        assert_eq!(written.trim_end(), FIXTURE.trim_end());
        let mtime = fs::metadata(&path).expect("meta").modified().expect("mtime");

        let second = projector.project(&user).expect("project again");
        assert_eq!(second.private_key_file.as_deref(), Some(path.as_path()));
        let again = fs::metadata(&path).expect("meta").modified().expect("mtime");
        assert_eq!(mtime, again);
    }

    #[test]
    fn password_only_user_has_no_key_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut user = SystemUser::new("web", "www-data");
        user.credential
            .set_password("s3cret", signer.as_ref())
            .expect("set password");

        let bundle = projector.project(&user).expect("project");
        assert_eq!(bundle.password.as_deref(), Some("s3cret"));
        assert_eq!(bundle.private_key_file, None);
        assert_eq!(bundle.username, "www-data");
        assert!(!dir.path().join("tmp").exists());
    }

    #[test]
    fn password_auth_skips_materialization() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut user = SystemUser::new("deploy", "deploy");
        user.auth_method = AuthMethod::Password;
        user.credential
            .set_private_key(FIXTURE, signer.as_ref())
            .expect("set key");

        let bundle = projector.project(&user).expect("project");
        assert_eq!(bundle.private_key_file, None);
        assert!(!dir.path().join("tmp").exists());
    }

    #[test]
    fn bundle_json_has_push_agent_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut user = SystemUser::new("deploy", "deploy");
        user.credential
            .set_public_key("ssh-ed25519 AAAA deploy@host", signer.as_ref())
            .expect("set public key");

        let bundle = projector.project(&user).expect("project");
        let value = serde_json::to_value(&bundle).expect("json");
        let mut keys: Vec<&str> = value
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "name",
                "password",
                "private_key_file",
                "public_key",
                "shell",
                "sudo",
                "username"
            ]
        );
        assert_eq!(value["public_key"], "ssh-ed25519 AAAA deploy@host");
    }

    #[test]
    fn foreign_blob_fails_with_user_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, _) = projector(dir.path());
        let other = AesGcmSigner::new(&generate_key()).expect("other signer");
        let mut user = SystemUser::new("deploy", "deploy");
        user.credential
            .set_password("s3cret", &other)
            .expect("set password");

        match projector.project(&user) {
            Err(CredentialError::Projection { user_id, source }) => {
                assert_eq!(user_id, user.id);
                assert!(matches!(*source, CredentialError::InvalidSignature));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_stored_key_fails_projection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut user = SystemUser::new("deploy", "deploy");
        // Sealed without the PEM check, as a corrupted row would be.
        let blob = signer.sign("not a key").expect("sign");
        user.credential.private_key = EncryptedField::<PrivateKey>::from_blob(Some(blob));

        let err = projector.project(&user).expect_err("malformed");
        match err {
            CredentialError::Projection { source, .. } => {
                assert!(matches!(*source, CredentialError::MalformedKey { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn admin_auth_carries_become_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut admin = AdminUser::new("ops", "admin");
        admin
            .credential
            .set_private_key(FIXTURE, signer.as_ref())
            .expect("set key");
        admin
            .set_become_password("rootpw", signer.as_ref())
            .expect("become password");

        let auth = projector.project_admin(&admin).expect("admin auth");
        assert_eq!(auth.username, "admin");
        assert!(auth.escalate);
        assert_eq!(auth.become_user, "root");
        assert_eq!(auth.become_password.as_deref(), Some("rootpw"));
        assert!(auth
            .private_key_file
            .as_ref()
            .expect("key file")
            .is_file());
    }

    #[test]
    fn auth_info_returns_clear_text_without_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (projector, signer) = projector(dir.path());
        let mut user = SystemUser::new("deploy", "deploy");
        user.credential
            .set_password("s3cret", signer.as_ref())
            .expect("set password");
        user.credential
            .set_private_key(FIXTURE, signer.as_ref())
            .expect("set key");

        let info = projector.auth_info(&user).expect("auth info");
        assert_eq!(info.password.as_deref(), Some("s3cret"));
        assert_eq!(info.private_key.as_deref(), Some(FIXTURE));
        assert!(!dir.path().join("tmp").exists());
    }
}
