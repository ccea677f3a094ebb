//! Configuration types for directory client usage.

use crate::Result;
use dirbind_core::{DirectorySettings, ProxySecret};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Filter used when a search is issued without one.
pub const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Service account used for lookups on behalf of users.
#[derive(Debug)]
pub struct ProxyIdentity {
    username: String,
    secret: ProxySecret,
}

impl ProxyIdentity {
    /// Proxy bind DN.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Configured (possibly encrypted) proxy password.
    #[must_use]
    pub const fn secret(&self) -> &ProxySecret {
        &self.secret
    }
}

/// Immutable configuration for a [`crate::DirectoryClient`].
#[derive(Debug)]
pub struct DirectoryConfig {
    url: String,
    use_tls: bool,
    base_dn: String,
    proxy: Option<ProxyIdentity>,
    user_query: String,
    default_filter: String,
    use_search: bool,
    uid_attribute: String,
    fullname_attribute: String,
    email_attribute: String,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Creates a configuration for `host:port` with every other option at its default.
    ///
    /// # Errors
    ///
    /// Returns a configuration defect if the host and port do not form a valid endpoint.
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let host = host.trim();
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let url = Url::parse(&format!("ldap://{authority}"))?;

        Ok(Self {
            url: url.to_string().trim_end_matches('/').to_string(),
            use_tls: false,
            base_dn: String::new(),
            proxy: None,
            user_query: String::new(),
            default_filter: DEFAULT_FILTER.to_string(),
            use_search: true,
            uid_attribute: "uid".to_string(),
            fullname_attribute: "cn".to_string(),
            email_attribute: "mail".to_string(),
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        })
    }

    /// Builds a configuration from validated settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration defect if the settings fail validation.
    pub fn from_settings(settings: &DirectorySettings) -> Result<Self> {
        settings.validate_settings()?;

        let mut config = Self::new(&settings.host, settings.port)?
            .with_tls(settings.use_tls)
            .with_base_dn(settings.base_dn.clone())
            .with_user_query(settings.user_qry.clone())
            .with_default_filter(settings.default_filter.clone())
            .with_search_mode(settings.use_search)
            .with_attribute_names(
                settings.ldap_uid.clone(),
                settings.ldap_fullname.clone(),
                settings.ldap_email.clone(),
            )
            .with_tls_verification(settings.tls_verify)
            .with_connection_timeout_secs(settings.connection_timeout_secs)
            .with_operation_timeout_secs(settings.operation_timeout_secs);

        if let Some(path) = &settings.tls_ca_cert {
            config = config.with_tls_ca_cert(path.clone());
        }
        if let Some(secret) = settings.proxy_secret() {
            config = config.with_proxy(settings.proxy_username.clone(), secret);
        }

        Ok(config)
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns whether StartTLS is negotiated before any bind.
    #[must_use]
    pub const fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Returns the base DN (possibly blank).
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Returns the proxy identity when one is configured.
    #[must_use]
    pub const fn proxy(&self) -> Option<&ProxyIdentity> {
        self.proxy.as_ref()
    }

    /// Returns the user query template (possibly blank).
    #[must_use]
    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    /// Returns the filter used when none is supplied.
    #[must_use]
    pub fn default_filter(&self) -> &str {
        &self.default_filter
    }

    /// Returns true when the user query is a search filter rather than a DN template.
    #[must_use]
    pub const fn use_search(&self) -> bool {
        self.use_search
    }

    /// Attribute holding the login name.
    #[must_use]
    pub fn uid_attribute(&self) -> &str {
        &self.uid_attribute
    }

    /// Attribute holding the full name.
    #[must_use]
    pub fn fullname_attribute(&self) -> &str {
        &self.fullname_attribute
    }

    /// Attribute holding the email address.
    #[must_use]
    pub fn email_attribute(&self) -> &str {
        &self.email_attribute
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Overrides the base DN.
    #[must_use]
    pub fn with_base_dn(mut self, dn: impl Into<String>) -> Self {
        self.base_dn = dn.into();
        self
    }

    /// Configures the proxy identity.
    ///
    /// A blank username leaves the client without a proxy identity.
    #[must_use]
    pub fn with_proxy(mut self, username: impl Into<String>, secret: ProxySecret) -> Self {
        let username = username.into().trim().to_string();
        self.proxy = if username.is_empty() {
            None
        } else {
            Some(ProxyIdentity { username, secret })
        };
        self
    }

    /// Overrides the user query template.
    ///
    /// The template should contain `[username]` or `{username}` where the login is substituted.
    #[must_use]
    pub fn with_user_query(mut self, template: impl Into<String>) -> Self {
        self.user_query = template.into();
        self
    }

    /// Overrides the default search filter.
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Selects between search-based (`true`) and DN-template (`false`) user resolution.
    #[must_use]
    pub const fn with_search_mode(mut self, use_search: bool) -> Self {
        self.use_search = use_search;
        self
    }

    /// Overrides the attribute names used for user details.
    #[must_use]
    pub fn with_attribute_names(
        mut self,
        uid: impl Into<String>,
        fullname: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.uid_attribute = uid.into();
        self.fullname_attribute = fullname.into();
        self.email_attribute = email.into();
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
