//! Settings surface for directory clients.
//!
//! [`DirectorySettings`] is the flat, deserializable form of the recognized configuration options.
//! Typed client configuration is built from it by the client crate.

use crate::secret::{KeySource, ProxySecret};
use crate::Result;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// How the configured proxy password is protected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyEncryption {
    /// The password is stored in plain text.
    #[default]
    None,
    /// The password is encrypted with a key supplied inline.
    Inline,
    /// The password is encrypted with a key read from `encryption_key_file`.
    File,
}

/// Recognized directory configuration options.
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct DirectorySettings {
    /// Directory host name or address
    #[validate(length(min = 1))]
    pub host: String,

    /// Directory port
    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to negotiate StartTLS before any bind
    #[serde(default)]
    pub use_tls: bool,

    /// Base DN for searches and user lookups
    #[serde(default)]
    pub base_dn: String,

    /// Proxy (service account) DN
    #[serde(default)]
    pub proxy_username: String,

    /// Proxy password, plain or encrypted depending on `proxy_encryption`
    #[serde(default, skip_serializing)]
    pub proxy_password: String,

    /// Protection applied to `proxy_password`
    #[serde(default)]
    pub proxy_encryption: ProxyEncryption,

    /// Inline key used when `proxy_encryption` is `inline`
    #[serde(default, skip_serializing)]
    pub proxy_encryption_key: String,

    /// Key file used when `proxy_encryption` is `file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_file: Option<PathBuf>,

    /// User query template
    #[serde(default)]
    pub user_qry: String,

    /// Filter used when a search is issued without one
    #[serde(default = "default_filter")]
    pub default_filter: String,

    /// Whether `user_qry` is a search filter (`true`) or a DN template (`false`)
    #[serde(default = "default_use_search")]
    pub use_search: bool,

    /// Attribute holding the login name
    #[serde(default = "default_uid_attribute")]
    pub ldap_uid: String,

    /// Attribute holding the full name
    #[serde(default = "default_fullname_attribute")]
    pub ldap_fullname: String,

    /// Attribute holding the email address
    #[serde(default = "default_email_attribute")]
    pub ldap_email: String,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to a custom CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
}

const fn default_port() -> u16 {
    389
}

fn default_filter() -> String {
    "(objectClass=*)".to_string()
}

const fn default_use_search() -> bool {
    true
}

fn default_uid_attribute() -> String {
    "uid".to_string()
}

fn default_fullname_attribute() -> String {
    "cn".to_string()
}

fn default_email_attribute() -> String {
    "mail".to_string()
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

impl DirectorySettings {
    /// Creates settings for the given host with every other option at its default.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            use_tls: false,
            base_dn: String::new(),
            proxy_username: String::new(),
            proxy_password: String::new(),
            proxy_encryption: ProxyEncryption::None,
            proxy_encryption_key: String::new(),
            encryption_key_file: None,
            user_qry: String::new(),
            default_filter: default_filter(),
            use_search: default_use_search(),
            ldap_uid: default_uid_attribute(),
            ldap_fullname: default_fullname_attribute(),
            ldap_email: default_email_attribute(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: default_timeout_secs(),
            operation_timeout_secs: default_timeout_secs(),
        }
    }

    /// Parses settings from JSON and validates them.
    ///
    /// # Errors
    ///
    /// Returns a configuration defect if the JSON is malformed or validation fails.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(input)?;
        settings.validate_settings()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// A blank base DN or user query is accepted here; both surface later as runtime defects of
    /// the operations that need them.
    ///
    /// # Errors
    ///
    /// Returns a configuration defect describing every failed constraint.
    pub fn validate_settings(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Sets the base DN.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = base_dn.into();
        self
    }

    /// Sets the user query template.
    #[must_use]
    pub fn with_user_query(mut self, user_qry: impl Into<String>) -> Self {
        self.user_qry = user_qry.into();
        self
    }

    /// Sets a plain-text proxy identity.
    #[must_use]
    pub fn with_proxy(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.proxy_username = username.into();
        self.proxy_password = password.into();
        self.proxy_encryption = ProxyEncryption::None;
        self
    }

    /// Returns the connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Builds the proxy secret described by the password options.
    ///
    /// Returns `None` when no proxy password is configured.
    #[must_use]
    pub fn proxy_secret(&self) -> Option<ProxySecret> {
        if self.proxy_password.is_empty() {
            return None;
        }

        let secret = match self.proxy_encryption {
            ProxyEncryption::None => {
                ProxySecret::Plain(SecretString::from(self.proxy_password.clone()))
            }
            ProxyEncryption::Inline => ProxySecret::Encrypted {
                ciphertext: self.proxy_password.clone(),
                key: KeySource::Inline(SecretString::from(self.proxy_encryption_key.clone())),
            },
            ProxyEncryption::File => ProxySecret::Encrypted {
                ciphertext: self.proxy_password.clone(),
                key: KeySource::File(self.encryption_key_file.clone().unwrap_or_default()),
            },
        };
        Some(secret)
    }
}

impl fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("base_dn", &self.base_dn)
            .field("proxy_username", &self.proxy_username)
            .field("proxy_password", &"[REDACTED]")
            .field("proxy_encryption", &self.proxy_encryption)
            .field("encryption_key_file", &self.encryption_key_file)
            .field("user_qry", &self.user_qry)
            .field("default_filter", &self.default_filter)
            .field("use_search", &self.use_search)
            .field("tls_verify", &self.tls_verify)
            .field("tls_ca_cert", &self.tls_ca_cert)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, ErrorKind};

    #[test]
    fn test_defaults_from_json() {
        let settings = DirectorySettings::from_json_str(r#"{"host": "ldap.example.com"}"#).unwrap();
        assert_eq!(settings.port, 389);
        assert!(!settings.use_tls);
        assert_eq!(settings.default_filter, "(objectClass=*)");
        assert!(settings.use_search);
        assert_eq!(settings.ldap_uid, "uid");
        assert_eq!(settings.operation_timeout(), Duration::from_secs(10));
        assert!(settings.proxy_secret().is_none());
    }

    #[test]
    fn test_full_json() {
        let json = r#"{
            "host": "ldap.example.com",
            "port": 636,
            "use_tls": true,
            "base_dn": "dc=example,dc=com",
            "proxy_username": "cn=admin,dc=example,dc=com",
            "proxy_password": "c2VjcmV0",
            "proxy_encryption": "file",
            "encryption_key_file": "/etc/dirbind/key.txt",
            "user_qry": "(uid=[username])"
        }"#;
        let settings = DirectorySettings::from_json_str(json).unwrap();
        assert_eq!(settings.port, 636);
        assert_eq!(settings.proxy_encryption, ProxyEncryption::File);

        match settings.proxy_secret() {
            Some(ProxySecret::Encrypted {
                ciphertext,
                key: KeySource::File(path),
            }) => {
                assert_eq!(ciphertext, "c2VjcmV0");
                assert_eq!(path, PathBuf::from("/etc/dirbind/key.txt"));
            }
            other => panic!("unexpected proxy secret: {other:?}"),
        }
    }

    #[test]
    fn test_blank_base_dn_and_query_are_valid() {
        let settings = DirectorySettings::new("localhost");
        assert!(settings.validate_settings().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let err = DirectorySettings::new("").validate_settings().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigDefect);
        assert_eq!(err.code(), codes::INVALID_SETTINGS);

        let mut settings = DirectorySettings::new("localhost");
        settings.operation_timeout_secs = 0;
        assert!(settings.validate_settings().is_err());

        let err = DirectorySettings::from_json_str("{not json}").unwrap_err();
        assert_eq!(err.code(), codes::INVALID_SETTINGS);
    }

    #[test]
    fn test_password_never_serialized_or_printed() {
        let settings = DirectorySettings::new("localhost")
            .with_proxy("cn=admin,dc=example,dc=com", "hunter2");
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{settings:?}").contains("hunter2"));
        assert!(matches!(settings.proxy_secret(), Some(ProxySecret::Plain(_))));
    }
}
