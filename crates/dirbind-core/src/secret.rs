//! Proxy credential resolution.
//!
//! The proxy password may be configured in plain text or encrypted. Encrypted values are
//! decrypted through a pluggable [`SecretDecryptor`]; the key is either supplied inline or read
//! from a key file.

use crate::error::{codes, Error};
use crate::Result;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Length of the GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of the GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Capability that turns an encrypted secret back into plain text.
pub trait SecretDecryptor: Send + Sync {
    /// Decrypts `ciphertext` with `key`.
    ///
    /// # Errors
    ///
    /// Returns a credential error if the key is wrong or the ciphertext is corrupt.
    fn decrypt(&self, ciphertext: &str, key: &str) -> Result<String>;
}

/// Where the decryption key comes from.
#[derive(Debug)]
pub enum KeySource {
    /// Key supplied directly in configuration.
    Inline(SecretString),
    /// Key stored in a file.
    File(PathBuf),
}

/// Configured proxy password.
#[derive(Debug)]
pub enum ProxySecret {
    /// Plain-text password.
    Plain(SecretString),
    /// Encrypted password together with the source of its key.
    Encrypted {
        /// Encoded ciphertext.
        ciphertext: String,
        /// Key source.
        key: KeySource,
    },
}

/// AES-256-GCM decryptor.
///
/// Ciphertexts are base64 encoded `nonce || ciphertext || tag`. The key material may be any
/// string; it is hashed with SHA-256 to obtain the cipher key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmDecryptor;

impl AesGcmDecryptor {
    /// Encrypts `plaintext` into the format accepted by [`SecretDecryptor::decrypt`].
    ///
    /// # Errors
    ///
    /// Returns a credential error if encryption fails.
    pub fn encrypt(&self, plaintext: &str, key: &str) -> Result<String> {
        let cipher = cipher_for(key)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|err| decryption_error(format!("encryption failed: {err}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }
}

impl SecretDecryptor for AesGcmDecryptor {
    fn decrypt(&self, ciphertext: &str, key: &str) -> Result<String> {
        let sealed = STANDARD
            .decode(ciphertext.trim())
            .map_err(|err| decryption_error(format!("ciphertext is not valid base64: {err}")))?;

        if sealed.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(decryption_error("ciphertext too short"));
        }

        let cipher = cipher_for(key)?;
        let (nonce_bytes, encrypted) = sealed.split_at(NONCE_LENGTH);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|_| decryption_error("wrong key or corrupt ciphertext"))?;

        String::from_utf8(plaintext)
            .map_err(|err| decryption_error(format!("decrypted secret is not UTF-8: {err}")))
    }
}

/// Produces the plain-text proxy password from its configured form.
pub struct CredentialResolver {
    decryptor: Box<dyn SecretDecryptor>,
}

impl CredentialResolver {
    /// Creates a resolver that uses the given decryptor.
    #[must_use]
    pub fn new(decryptor: Box<dyn SecretDecryptor>) -> Self {
        Self { decryptor }
    }

    /// Resolves the plain-text password.
    ///
    /// # Errors
    ///
    /// Returns a credential error when the key file cannot be read or decryption fails.
    pub fn resolve(&self, secret: &ProxySecret) -> Result<SecretString> {
        match secret {
            ProxySecret::Plain(password) => {
                Ok(SecretString::from(password.expose_secret().to_string()))
            }
            ProxySecret::Encrypted { ciphertext, key } => {
                let key = load_key(key)?;
                let plaintext = self.decryptor.decrypt(ciphertext, key.expose_secret())?;
                Ok(SecretString::from(plaintext))
            }
        }
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(Box::new(AesGcmDecryptor))
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

fn load_key(source: &KeySource) -> Result<SecretString> {
    match source {
        KeySource::Inline(key) => Ok(SecretString::from(key.expose_secret().to_string())),
        KeySource::File(path) => {
            debug!(path = %path.display(), "Reading proxy encryption key file");
            let contents = fs::read_to_string(path).map_err(|err| {
                Error::credential(
                    codes::KEY_FILE_UNREADABLE,
                    format!("failed to read key file {}: {err}", path.display()),
                )
            })?;
            let key = contents.trim();
            if key.is_empty() {
                return Err(Error::credential(
                    codes::KEY_FILE_UNREADABLE,
                    format!("key file {} is empty", path.display()),
                ));
            }
            Ok(SecretString::from(key.to_string()))
        }
    }
}

fn cipher_for(key: &str) -> Result<Aes256Gcm> {
    let digest = Sha256::digest(key.as_bytes());
    Aes256Gcm::new_from_slice(digest.as_slice())
        .map_err(|err| decryption_error(format!("failed to create cipher: {err}")))
}

fn decryption_error(message: impl Into<String>) -> Error {
    Error::credential(codes::DECRYPTION_FAILED, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY: &str = "ym0ZBkTbDbYrQzjMM7COYnLYuArlq31UIfDyBj11gpeeVLlXeGYPQ7Qf71TPDlN8";

    #[test]
    fn decrypts_what_it_encrypts() {
        let sealed = AesGcmDecryptor.encrypt("proxy-secret", KEY).unwrap();
        assert_ne!(sealed, "proxy-secret");
        assert_eq!(AesGcmDecryptor.decrypt(&sealed, KEY).unwrap(), "proxy-secret");
    }

    #[test]
    fn wrong_key_is_a_credential_error() {
        let sealed = AesGcmDecryptor.encrypt("proxy-secret", KEY).unwrap();
        let err = AesGcmDecryptor.decrypt(&sealed, "another key").unwrap_err();
        assert_eq!(err.code(), codes::DECRYPTION_FAILED);
    }

    #[test]
    fn corrupt_ciphertext_is_rejected() {
        assert!(AesGcmDecryptor.decrypt("not base64!!", KEY).is_err());
        assert!(AesGcmDecryptor.decrypt("c2hvcnQ=", KEY).is_err());
    }

    #[test]
    fn resolves_plain_and_inline_secrets() {
        let resolver = CredentialResolver::default();
        let plain = ProxySecret::Plain(SecretString::from("secret".to_string()));
        assert_eq!(resolver.resolve(&plain).unwrap().expose_secret(), "secret");

        let inline = ProxySecret::Encrypted {
            ciphertext: AesGcmDecryptor.encrypt("secret", KEY).unwrap(),
            key: KeySource::Inline(SecretString::from(KEY.to_string())),
        };
        assert_eq!(resolver.resolve(&inline).unwrap().expose_secret(), "secret");
    }

    #[test]
    fn resolves_file_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{KEY}").unwrap();

        let secret = ProxySecret::Encrypted {
            ciphertext: AesGcmDecryptor.encrypt("secret", KEY).unwrap(),
            key: KeySource::File(file.path().to_path_buf()),
        };
        let resolved = CredentialResolver::default().resolve(&secret).unwrap();
        assert_eq!(resolved.expose_secret(), "secret");
    }

    #[test]
    fn missing_key_file_is_unusable() {
        let secret = ProxySecret::Encrypted {
            ciphertext: AesGcmDecryptor.encrypt("secret", KEY).unwrap(),
            key: KeySource::File(PathBuf::from("/nonexistent/dirbind/key.txt")),
        };
        let err = CredentialResolver::default().resolve(&secret).unwrap_err();
        assert_eq!(err.code(), codes::KEY_FILE_UNREADABLE);
    }
}
