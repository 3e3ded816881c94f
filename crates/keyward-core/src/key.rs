use std::{borrow::Cow, fmt};

use zeroize::Zeroize;

use crate::error::CredentialError;

/// PEM labels accepted as private key material.
const PRIVATE_KEY_LABELS: &[&str] = &[
    "PRIVATE KEY",
    "ENCRYPTED PRIVATE KEY",
    "RSA PRIVATE KEY",
    "DSA PRIVATE KEY",
    "EC PRIVATE KEY",
    "OPENSSH PRIVATE KEY",
];

/// Parsed SSH private key. Keeps the PEM block text, trimmed and newline
/// terminated, so the key file holds nothing but the key.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pem: String,
    label: String,
}

impl PrivateKey {
    /// Parse PEM text, rejecting anything that is not a single private key block.
    pub fn parse(text: &str) -> Result<Self, CredentialError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::malformed_key("key is empty"));
        }

        let mut blocks =
            pem::parse_many(trimmed).map_err(|e| CredentialError::malformed_key(e.to_string()))?;
        if blocks.len() != 1 {
            return Err(CredentialError::malformed_key(format!(
                "expected one PEM block, found {}",
                blocks.len()
            )));
        }
        let parsed = blocks.remove(0);
        let end_line = format!("-----END {}-----", parsed.tag());
        if !trimmed.starts_with("-----BEGIN ") || !trimmed.ends_with(&end_line) {
            return Err(CredentialError::malformed_key("text outside the PEM block"));
        }

        if !PRIVATE_KEY_LABELS.contains(&parsed.tag()) {
            return Err(CredentialError::malformed_key(format!(
                "unexpected PEM label `{}`",
                parsed.tag()
            )));
        }
        if parsed.contents().is_empty() {
            return Err(CredentialError::malformed_key("PEM body is empty"));
        }

        Ok(Self {
            pem: format!("{trimmed}\n"),
            label: parsed.tag().to_string(),
        })
    }

    /// PEM label, e.g. `OPENSSH PRIVATE KEY`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_pem(&self) -> &str {
        &self.pem
    }

    /// Bytes to write to a key file. OpenSSH rejects key files without a final newline.
    pub fn file_contents(&self) -> Cow<'_, [u8]> {
        if self.pem.ends_with('\n') {
            Cow::Borrowed(self.pem.as_bytes())
        } else {
            let mut owned = self.pem.clone().into_bytes();
            owned.push(b'\n');
            Cow::Owned(owned)
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("label", &self.label)
            .field("pem", &"<redacted>")
            .finish()
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.pem.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../../fixtures/id_ed25519");

    #[test]
    fn parses_openssh_key() {
        let key = PrivateKey::parse(FIXTURE).expect("fixture should parse");
        assert_eq!(key.label(), "OPENSSH PRIVATE KEY");
        assert_eq!(key.as_pem(), FIXTURE);
        assert_eq!(key.file_contents().as_ref(), FIXTURE.as_bytes());
    }

    #[test]
    fn appends_trailing_newline_for_files() {
        let key = PrivateKey::parse(FIXTURE.trim_end()).expect("parse");
        assert!(key.file_contents().ends_with(b"\n"));
    }

    #[test]
    fn rejects_non_pem_text() {
        let err = PrivateKey::parse("hunter2").expect_err("plain text is not a key");
        assert!(matches!(err, CredentialError::MalformedKey { .. }));
    }

    #[test]
    fn rejects_empty_text() {
        let err = PrivateKey::parse("  \n").expect_err("blank is not a key");
        assert!(matches!(err, CredentialError::MalformedKey { .. }));
    }

    #[test]
    fn rejects_public_key_blocks() {
        let public = "-----BEGIN PUBLIC KEY-----\nbm90IHJlYWxseSBhIGtleQ==\n-----END PUBLIC KEY-----\n";
        let err = PrivateKey::parse(public).expect_err("public keys are not accepted");
        match err {
            CredentialError::MalformedKey { reason } => assert!(reason.contains("PUBLIC KEY")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_text_around_the_block() {
        for text in [
            format!("this is my key\n{FIXTURE}"),
            format!("{FIXTURE}trailing notes\n"),
        ] {
            let err = PrivateKey::parse(&text).expect_err("surrounding text");
            assert!(matches!(err, CredentialError::MalformedKey { .. }));
        }
    }

    #[test]
    fn rejects_multiple_blocks() {
        let doubled = format!("{FIXTURE}{FIXTURE}");
        let err = PrivateKey::parse(&doubled).expect_err("two keys");
        assert!(matches!(err, CredentialError::MalformedKey { .. }));
    }

    #[test]
    fn surrounding_whitespace_is_accepted() {
        let key = PrivateKey::parse(&format!("\n  {FIXTURE}\n\n")).expect("parse");
        assert_eq!(key.as_pem(), FIXTURE);
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = PrivateKey::parse(FIXTURE).expect("parse");
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("b3BlbnNzaC1rZXktdjE"));
        assert!(rendered.contains("redacted"));
    }
}
