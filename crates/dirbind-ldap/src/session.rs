//! Directory-client capability and its `ldap3` implementation.
//!
//! The client never talks to `ldap3` directly. It drives a [`DirectorySession`] obtained from a
//! [`DirectoryConnector`], which keeps the protocol plumbing swappable and mockable.

use crate::config::DirectoryConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use dirbind_core::{Error, Result};
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// LDAP result codes the client classifies.
pub mod result_code {
    /// Operation completed.
    pub const SUCCESS: u32 = 0;
    /// Search returned more entries than the size limit allows.
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    /// Compare evaluated to false.
    pub const COMPARE_FALSE: u32 = 5;
    /// Compare evaluated to true.
    pub const COMPARE_TRUE: u32 = 6;
    /// Attribute or value not present on the entry.
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    /// Attribute type unknown to the schema.
    pub const UNDEFINED_ATTRIBUTE_TYPE: u32 = 17;
    /// Target entry does not exist.
    pub const NO_SUCH_OBJECT: u32 = 32;
    /// DN syntax rejected.
    pub const INVALID_DN_SYNTAX: u32 = 34;
    /// Bind credentials rejected.
    pub const INVALID_CREDENTIALS: u32 = 49;
    /// Client-side filter parse failure (RFC 4511 `filterError`, used by client libraries).
    pub const FILTER_ERROR: u32 = 87;
}

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Result code and diagnostic text returned by the directory for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapStatus {
    /// LDAP result code.
    pub rc: u32,
    /// Diagnostic message from the directory.
    pub text: String,
}

impl LdapStatus {
    /// Creates a status from a result code and diagnostic text.
    #[must_use]
    pub fn new(rc: u32, text: impl Into<String>) -> Self {
        Self {
            rc,
            text: text.into(),
        }
    }

    /// Successful status with no diagnostic text.
    #[must_use]
    pub fn success() -> Self {
        Self::new(result_code::SUCCESS, "")
    }

    /// Returns true for `success (0)`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.rc == result_code::SUCCESS
    }
}

impl From<ldap3::LdapResult> for LdapStatus {
    fn from(result: ldap3::LdapResult) -> Self {
        Self {
            rc: result.rc,
            text: result.text,
        }
    }
}

/// Entry as delivered by the directory, before materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute names with their values.
    ///
    /// Values that are not valid UTF-8 (`jpegPhoto`, `objectGUID`, certificates) are carried
    /// base64 encoded.
    pub attributes: Vec<(String, Vec<String>)>,
}

impl From<SearchEntry> for RawEntry {
    fn from(entry: SearchEntry) -> Self {
        let mut attributes: Vec<(String, Vec<String>)> = entry.attrs.into_iter().collect();
        for (name, values) in entry.bin_attrs {
            let encoded = values.iter().map(|value| STANDARD.encode(value));
            match attributes.iter_mut().find(|(existing, _)| *existing == name) {
                Some((_, existing)) => existing.extend(encoded),
                None => attributes.push((name, encoded.collect())),
            }
        }
        attributes.sort_by(|(a, _), (b, _)| a.cmp(b));

        Self {
            dn: entry.dn,
            attributes,
        }
    }
}

/// Raw search response handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSearchResult {
    /// Final status of the search.
    pub status: LdapStatus,
    /// Entries returned before the final status.
    pub entries: Vec<RawEntry>,
}

impl RawSearchResult {
    /// Builds a successful raw result from entries.
    #[must_use]
    pub fn with_entries(entries: Vec<RawEntry>) -> Self {
        Self {
            status: LdapStatus::success(),
            entries,
        }
    }

    /// Builds a raw result that carries only a status.
    #[must_use]
    pub fn from_status(status: LdapStatus) -> Self {
        Self {
            status,
            entries: Vec::new(),
        }
    }
}

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

/// One open protocol handle.
///
/// Directory answers are returned as [`LdapStatus`] without interpretation; only transport
/// failures and timeouts are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// Performs a simple bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<LdapStatus>;

    /// Performs a search.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<RawSearchResult>;

    /// Compares an attribute value.
    async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<LdapStatus>;

    /// Applies modifications to an entry.
    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> Result<LdapStatus>;

    /// Unbinds and closes the handle.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens protocol handles, negotiating StartTLS when configured.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens a new session.
    async fn open(&self) -> Result<Box<dyn DirectorySession>>;
}

/// Real connector backed by `ldap3`.
pub struct LdapConnector {
    config: Arc<DirectoryConfig>,
}

impl LdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn open(&self) -> Result<Box<dyn DirectorySession>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(|err| {
                Error::connection(format!(
                    "failed to connect to {}: {err}",
                    self.config.url()
                ))
            })?;
        ldap3::drive!(conn);
        Ok(Box::new(LdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct LdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<LdapStatus> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::timeout("directory bind timed out"))?
            .map_err(map_ldap_error)?;
        Ok(result.into())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<RawSearchResult> {
        let response = timeout(
            self.operation_timeout,
            self.inner
                .search(base_dn, scope.into(), filter, attributes.to_vec()),
        )
        .await
        .map_err(|_| Error::timeout("directory search timed out"))?;

        let ldap3::SearchResult(entries, result) = match response {
            Ok(search) => search,
            Err(ldap3::LdapError::FilterParsing) => {
                debug!(filter, "Filter rejected by the client library");
                return Ok(RawSearchResult::from_status(LdapStatus::new(
                    result_code::FILTER_ERROR,
                    format!("unparsable filter `{filter}`"),
                )));
            }
            Err(err) => return Err(map_ldap_error(err)),
        };

        let entries = entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(SearchEntry::construct)
            .map(RawEntry::from)
            .collect();

        Ok(RawSearchResult {
            status: result.into(),
            entries,
        })
    }

    async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<LdapStatus> {
        let result = timeout(
            self.operation_timeout,
            self.inner.compare(dn, attribute, value),
        )
        .await
        .map_err(|_| Error::timeout("directory compare timed out"))?
        .map_err(map_ldap_error)?;
        Ok(result.0.into())
    }

    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> Result<LdapStatus> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Delete { attribute, values } => Mod::Delete(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Replace { attribute, values } => Mod::Replace(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let result = timeout(self.operation_timeout, self.inner.modify(dn, mods))
            .await
            .map_err(|_| Error::timeout("directory modify timed out"))?
            .map_err(map_ldap_error)?;
        Ok(result.into())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::timeout("directory unbind timed out"))?
            .map_err(map_ldap_error)?;
        Ok(())
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.use_tls());

    if !config.use_tls() {
        return Ok(settings);
    }

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| Error::connection(format!("failed to construct TLS connector: {err}")))?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::connection(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::connection(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| Error::connection(format!("failed to load CA certificate: {err}")))?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::connection(format!("directory transport failure: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_helpers() {
        assert!(LdapStatus::success().is_success());
        let status = LdapStatus::new(result_code::INVALID_CREDENTIALS, "invalid credentials");
        assert!(!status.is_success());
        assert_eq!(status.text, "invalid credentials");
    }

    #[test]
    fn binary_values_are_kept_base64_encoded() {
        let entry = SearchEntry {
            dn: "uid=jdoe,ou=people,dc=example,dc=com".to_string(),
            attrs: [
                ("uid".to_string(), vec!["jdoe".to_string()]),
                ("cn".to_string(), vec!["John Doe".to_string()]),
            ]
            .into_iter()
            .collect(),
            bin_attrs: [("jpegPhoto".to_string(), vec![vec![0xff, 0xd8, 0xff, 0xe0]])]
                .into_iter()
                .collect(),
        };

        let raw = RawEntry::from(entry);
        assert_eq!(raw.dn, "uid=jdoe,ou=people,dc=example,dc=com");
        assert_eq!(
            raw.attributes,
            vec![
                ("cn".to_string(), vec!["John Doe".to_string()]),
                ("jpegPhoto".to_string(), vec!["/9j/4A==".to_string()]),
                ("uid".to_string(), vec!["jdoe".to_string()]),
            ]
        );
    }

    #[test]
    fn scope_maps_to_ldap3() {
        assert!(matches!(Scope::from(SearchScope::Base), Scope::Base));
        assert!(matches!(Scope::from(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn plain_settings_skip_tls_configuration() {
        let config = DirectoryConfig::new("localhost", 389).unwrap();
        assert!(build_ldap_settings(&config).is_ok());
    }

    #[test]
    fn missing_ca_certificate_is_a_connection_error() {
        let config = DirectoryConfig::new("localhost", 389)
            .unwrap()
            .with_tls(true)
            .with_tls_ca_cert("/nonexistent/dirbind/ca.pem".into());
        let err = build_ldap_settings(&config).err().unwrap();
        assert_eq!(err.code(), dirbind_core::codes::CONNECT_FAILED);
    }
}
