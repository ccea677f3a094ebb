//! Directory client: connection and bind state machine plus every directory operation.

use crate::{
    changes::{AttributeChangeSet, ModifyOperation},
    config::{DirectoryConfig, ProxyIdentity},
    dn::DistinguishedName,
    query::UserQuery,
    results::SearchResults,
    session::{
        result_code, DirectoryConnector, DirectorySession, LdapConnector, RawSearchResult,
        SearchScope,
    },
    user::UserDetails,
    Result,
};
use dirbind_core::{codes, CredentialResolver, Error};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attribute list that requests no attributes, only DNs.
const NO_ATTRIBUTES: &str = "1.1";

/// Identity the connection is currently bound as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindIdentity {
    /// Anonymous bind.
    Anonymous,
    /// Bound with user credentials.
    User(String),
    /// Bound as the configured proxy account.
    Proxy(String),
}

/// Connection state of a [`DirectoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No protocol handle is open.
    Unconnected,
    /// A handle is open but no bind has been accepted.
    Connected,
    /// A handle is open and bound.
    Bound(BindIdentity),
}

/// Directory client with pluggable protocol backend.
///
/// One client owns at most one protocol handle. Operations take `&mut self` and run
/// sequentially; use one client per logical session.
pub struct DirectoryClient {
    config: Arc<DirectoryConfig>,
    connector: Box<dyn DirectoryConnector>,
    credentials: CredentialResolver,
    session: Option<Box<dyn DirectorySession>>,
    state: ConnectionState,
    allow_anonymous: bool,
}

impl DirectoryClient {
    /// Creates a client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn DirectoryConnector> =
            Box::new(LdapConnector::new(Arc::clone(&config)));
        Self::from_parts(config, connector)
    }

    /// Creates a client that opens sessions through `connector`.
    #[must_use]
    pub fn with_connector(config: DirectoryConfig, connector: Box<dyn DirectoryConnector>) -> Self {
        Self::from_parts(Arc::new(config), connector)
    }

    /// Replaces the resolver used to obtain the proxy password.
    #[must_use]
    pub fn with_credential_resolver(mut self, credentials: CredentialResolver) -> Self {
        self.credentials = credentials;
        self
    }

    fn from_parts(config: Arc<DirectoryConfig>, connector: Box<dyn DirectoryConnector>) -> Self {
        Self {
            config,
            connector,
            credentials: CredentialResolver::default(),
            session: None,
            state: ConnectionState::Unconnected,
            allow_anonymous: false,
        }
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Returns true when a protocol handle is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self.state, ConnectionState::Unconnected)
    }

    /// Returns true when the handle is bound (anonymously or otherwise).
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        matches!(self.state, ConnectionState::Bound(_))
    }

    /// Opts in to (or out of) anonymous binds. Disallowed by default.
    pub fn allow_anonymous(&mut self, allow: bool) {
        self.allow_anonymous = allow;
    }

    /// Opens the protocol handle, negotiating StartTLS when configured.
    ///
    /// A client that is already connected releases its handle and connects again.
    ///
    /// # Errors
    ///
    /// Returns a connection error (10005) when the handle cannot be opened or StartTLS fails.
    /// The client is left unconnected.
    pub async fn connect(&mut self) -> Result<()> {
        self.release().await;

        info!(url = self.config.url(), tls = self.config.use_tls(), "Connecting to directory");
        match self.connector.open().await {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                warn!("Directory connection to {} failed: {err}", self.config.url());
                Err(match err {
                    Error::Connection { .. } => err,
                    other => Error::connection(other.message().to_string()),
                })
            }
        }
    }

    /// Unbinds and releases the protocol handle.
    ///
    /// # Errors
    ///
    /// Returns the transport error raised by the unbind. The handle is released regardless.
    pub async fn close(&mut self) -> Result<()> {
        self.state = ConnectionState::Unconnected;
        match self.session.take() {
            Some(mut session) => session.unbind().await,
            None => Ok(()),
        }
    }

    async fn release(&mut self) {
        if let Err(err) = self.close().await {
            debug!("Ignoring failure while releasing directory handle: {err}");
        }
    }

    /// Binds with the given credentials.
    ///
    /// A missing DN or password is an anonymous bind, sent only when anonymous binds are
    /// allowed. Rejected credentials return `false`.
    ///
    /// # Errors
    ///
    /// Returns a not-connected error (10006) before [`connect`](Self::connect), or the
    /// transport error when the bind cannot be delivered.
    pub async fn bind(&mut self, dn: Option<&str>, password: Option<&str>) -> Result<bool> {
        self.connected_session("bind")?;

        let dn = dn.map(str::trim).filter(|dn| !dn.is_empty());
        let password = password.filter(|password| !password.is_empty());

        match (dn, password) {
            (Some(dn), Some(password)) => {
                self.simple_bind(dn, password, BindIdentity::User(dn.to_string()))
                    .await
            }
            _ if !self.allow_anonymous => {
                debug!("Refusing password-less bind while anonymous binds are disallowed");
                Ok(false)
            }
            _ => self.simple_bind("", "", BindIdentity::Anonymous).await,
        }
    }

    /// Binds as the configured proxy account.
    ///
    /// Returns `false` when no proxy is configured, when the proxy password cannot be resolved
    /// (missing key file, wrong key, corrupt ciphertext) or when the directory rejects it.
    ///
    /// # Errors
    ///
    /// Returns a not-connected error (10006) before [`connect`](Self::connect), or the
    /// transport error when the bind cannot be delivered.
    pub async fn proxy_bind(&mut self) -> Result<bool> {
        self.connected_session("proxy bind")?;

        let config = Arc::clone(&self.config);
        let Some(proxy) = config.proxy() else {
            debug!("No proxy identity configured");
            return Ok(false);
        };

        let Some(password) = self.proxy_password(proxy) else {
            return Ok(false);
        };

        self.simple_bind(
            proxy.username(),
            password.expose_secret(),
            BindIdentity::Proxy(proxy.username().to_string()),
        )
        .await
    }

    /// Resolves the proxy password, `None` when it is unusable or empty.
    fn proxy_password(&self, proxy: &ProxyIdentity) -> Option<SecretString> {
        match self.credentials.resolve(proxy.secret()) {
            Ok(password) if password.expose_secret().is_empty() => {
                warn!("Proxy credential resolved to an empty password");
                None
            }
            Ok(password) => Some(password),
            Err(err) => {
                warn!(code = err.code(), "Proxy credential unusable: {}", err.message());
                None
            }
        }
    }

    async fn simple_bind(
        &mut self,
        dn: &str,
        password: &str,
        identity: BindIdentity,
    ) -> Result<bool> {
        let session = self.connected_session("bind")?;
        let status = session.simple_bind(dn, password).await?;

        if status.is_success() {
            info!(identity = ?identity, "Directory bind accepted");
            self.state = ConnectionState::Bound(identity);
            Ok(true)
        } else {
            warn!(rc = status.rc, "Directory bind rejected: {}", status.text);
            self.state = ConnectionState::Connected;
            Ok(false)
        }
    }

    /// Searches the subtree below `base_dn` (the configured base DN when absent).
    ///
    /// A missing filter falls back to the configured default filter. An empty attribute list
    /// returns all attributes; `["dn"]` returns DNs only.
    ///
    /// # Errors
    ///
    /// Returns not-connected (10006), not-bound (10007), invalid-filter (10102) or invalid-DN
    /// (10112) errors, or a directory error (10101) for other rejections.
    pub async fn search(
        &mut self,
        base_dn: Option<&str>,
        filter: Option<&str>,
        attributes: &[&str],
    ) -> Result<SearchResults> {
        self.query(SearchScope::Subtree, base_dn, filter, attributes)
            .await
    }

    /// Reads the single entry at `dn` (the configured base DN when absent).
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search), with a directory error code of 10111.
    pub async fn read(
        &mut self,
        dn: Option<&str>,
        filter: Option<&str>,
        attributes: &[&str],
    ) -> Result<SearchResults> {
        self.query(SearchScope::Base, dn, filter, attributes).await
    }

    async fn query(
        &mut self,
        scope: SearchScope,
        base_dn: Option<&str>,
        filter: Option<&str>,
        attributes: &[&str],
    ) -> Result<SearchResults> {
        let (operation, failure_code) = match scope {
            SearchScope::Base => ("read", codes::READ_FAILED),
            SearchScope::OneLevel | SearchScope::Subtree => ("search", codes::SEARCH_FAILED),
        };

        let config = Arc::clone(&self.config);
        let base_dn = base_dn
            .map(str::trim)
            .filter(|dn| !dn.is_empty())
            .unwrap_or_else(|| config.base_dn().trim());
        let filter = filter
            .map(str::trim)
            .filter(|filter| !filter.is_empty())
            .unwrap_or_else(|| config.default_filter());
        let attributes = requested_attributes(attributes);

        let session = self.bound_session(operation)?;
        if !base_dn.is_empty() {
            DistinguishedName::parse(base_dn)?;
        }

        debug!(base_dn, filter, ?scope, "Issuing directory {operation}");
        let raw = session.search(base_dn, scope, filter, &attributes).await?;
        let materialize = if base_dn.is_empty() && scope == SearchScope::Base {
            SearchResults::from_root_read
        } else {
            SearchResults::from_raw
        };

        match raw.status.rc {
            result_code::SUCCESS => materialize(raw),
            result_code::SIZE_LIMIT_EXCEEDED => {
                warn!(
                    base_dn,
                    entries = raw.entries.len(),
                    "Directory {operation} hit the size limit; returning partial results"
                );
                materialize(raw)
            }
            result_code::NO_SUCH_OBJECT => {
                debug!(base_dn, "Directory {operation} base does not exist");
                Ok(SearchResults::empty())
            }
            result_code::FILTER_ERROR => Err(Error::invalid_filter(format!(
                "invalid search filter `{filter}`: {}",
                raw.status.text
            ))),
            result_code::INVALID_DN_SYNTAX => Err(Error::invalid_dn(format!(
                "invalid DN `{base_dn}`: {}",
                raw.status.text
            ))),
            rc => Err(Error::directory(
                failure_code,
                format!("directory {operation} failed (rc={rc}): {}", raw.status.text),
            )),
        }
    }

    /// Materializes a raw search result.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10121) when `raw` is not a valid result handle.
    pub fn get_entries(&self, raw: RawSearchResult) -> Result<SearchResults> {
        SearchResults::from_raw(raw)
    }

    /// Compares `value` against `attribute` on the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns a compare-target-missing error (10131) when the entry or attribute does not
    /// exist, an invalid-DN error (10112) for malformed DNs, or a directory error (10132).
    pub async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<bool> {
        let session = self.bound_session("compare")?;
        let dn = dn.trim();
        DistinguishedName::parse(dn)?;

        let status = session.compare(dn, attribute, value).await?;
        match status.rc {
            result_code::COMPARE_TRUE => Ok(true),
            result_code::COMPARE_FALSE => Ok(false),
            result_code::NO_SUCH_OBJECT
            | result_code::NO_SUCH_ATTRIBUTE
            | result_code::UNDEFINED_ATTRIBUTE_TYPE => Err(Error::compare_target_missing(format!(
                "cannot compare `{attribute}` on `{dn}`: {}",
                status.text
            ))),
            result_code::INVALID_DN_SYNTAX => Err(Error::invalid_dn(format!(
                "invalid DN `{dn}`: {}",
                status.text
            ))),
            rc => Err(Error::directory(
                codes::COMPARE_FAILED,
                format!("directory compare failed (rc={rc}): {}", status.text),
            )),
        }
    }

    /// Adds the values in `changes` to the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10171) when the directory rejects the addition.
    pub async fn add_attributes(&mut self, dn: &str, changes: &AttributeChangeSet) -> Result<bool> {
        self.modify(ModifyOperation::Add, dn, changes).await
    }

    /// Replaces the attributes in `changes` on the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10151) when the directory rejects the replacement.
    pub async fn replace_attributes(
        &mut self,
        dn: &str,
        changes: &AttributeChangeSet,
    ) -> Result<bool> {
        self.modify(ModifyOperation::Replace, dn, changes).await
    }

    /// Deletes the values (or whole attributes) in `changes` from the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10161) when the directory rejects the deletion.
    pub async fn delete_attributes(
        &mut self,
        dn: &str,
        changes: &AttributeChangeSet,
    ) -> Result<bool> {
        self.modify(ModifyOperation::Delete, dn, changes).await
    }

    async fn modify(
        &mut self,
        operation: ModifyOperation,
        dn: &str,
        changes: &AttributeChangeSet,
    ) -> Result<bool> {
        let session = self.bound_session(operation.as_str())?;
        let dn = dn.trim();
        DistinguishedName::parse(dn)?;

        if changes.is_empty() {
            debug!(dn, "Empty change set; nothing to {}", operation.as_str());
            return Ok(true);
        }

        let status = session
            .modify(dn, &changes.to_modifications(operation))
            .await?;
        if status.is_success() {
            info!(dn, attributes = changes.len(), "Directory {} applied", operation.as_str());
            return Ok(true);
        }

        let code = match operation {
            ModifyOperation::Add => codes::ADD_REJECTED,
            ModifyOperation::Replace => codes::REPLACE_REJECTED,
            ModifyOperation::Delete => codes::DELETE_REJECTED,
        };
        Err(Error::invalid_argument(
            code,
            format!(
                "directory rejected {} on `{dn}` (rc={}): {}",
                operation.as_str(),
                status.rc,
                status.text
            ),
        ))
    }

    /// Resolves `username` to exactly one DN, optionally verifying `password`.
    ///
    /// With search-based resolution the lookup runs under the proxy identity when one is
    /// configured, else anonymously when allowed. With DN templates the candidate DNs are built
    /// directly and, when verifying, bound in turn. A successful verification leaves the client
    /// bound as the user.
    ///
    /// # Errors
    ///
    /// - 10301 when no user query template is configured (checked before any network call)
    /// - 10006 before [`connect`](Self::connect)
    /// - 10321 / 10322 / 10323 when the lookup cannot be performed
    /// - 10302 unknown user, 10303 wrong password, 10304 ambiguous username
    pub async fn get_user_dn(
        &mut self,
        username: &str,
        password: &str,
        verify: bool,
    ) -> Result<String> {
        let config = Arc::clone(&self.config);
        let query = UserQuery::parse(config.user_query()).ok_or_else(|| {
            Error::invalid_argument(
                codes::MISSING_USER_QUERY,
                "no user query template is configured",
            )
        })?;
        self.connected_session("user lookup")?;

        if !config.use_search() {
            return self
                .resolve_templated_dn(&query, username, password, verify)
                .await;
        }

        let base_dn = config.base_dn().trim();
        if base_dn.is_empty() {
            return Err(Error::config_defect(
                codes::BLANK_BASE_DN,
                "cannot search for users without a base DN",
            ));
        }

        self.lookup_bind().await?;

        let filter = query.search_filter(username);
        let results = self.search(Some(base_dn), Some(&filter), &["dn"]).await?;
        let dn = match results.count_entries() {
            0 => {
                info!(username, "User not found in directory");
                return Err(Error::invalid_user(
                    codes::UNKNOWN_USER,
                    format!("user `{username}` not found"),
                ));
            }
            1 => results.dn(0)?.to_string(),
            matches => {
                warn!(username, matches, "User query matched more than one entry");
                return Err(Error::invalid_user(
                    codes::AMBIGUOUS_USER,
                    format!("user `{username}` matched {matches} entries"),
                ));
            }
        };

        if verify {
            self.verify_credentials(&dn, password).await?;
        }
        Ok(dn)
    }

    async fn resolve_templated_dn(
        &mut self,
        query: &UserQuery,
        username: &str,
        password: &str,
        verify: bool,
    ) -> Result<String> {
        let candidates = query.distinguished_names(username);
        for candidate in &candidates {
            DistinguishedName::parse(candidate)?;
        }

        if !verify {
            return candidates.into_iter().next().ok_or_else(|| {
                Error::invalid_user(codes::UNKNOWN_USER, format!("user `{username}` not found"))
            });
        }

        if password.is_empty() {
            return Err(rejected_credentials(username));
        }
        for candidate in candidates {
            if self.bind(Some(&candidate), Some(password)).await? {
                return Ok(candidate);
            }
            debug!(dn = %candidate, "Candidate DN rejected the credentials");
        }
        Err(rejected_credentials(username))
    }

    async fn lookup_bind(&mut self) -> Result<()> {
        let config = Arc::clone(&self.config);
        if let Some(proxy) = config.proxy() {
            match self.proxy_password(proxy) {
                Some(password) => {
                    let identity = BindIdentity::Proxy(proxy.username().to_string());
                    if self
                        .simple_bind(proxy.username(), password.expose_secret(), identity)
                        .await?
                    {
                        return Ok(());
                    }
                    return Err(Error::config_defect(
                        codes::INVALID_PROXY_IDENTITY,
                        "the proxy identity was rejected",
                    ));
                }
                None => debug!("No usable proxy credential; falling back to anonymous lookup"),
            }
        }

        if self.allow_anonymous && self.bind(None, None).await? {
            return Ok(());
        }
        Err(Error::config_defect(
            codes::NO_LOOKUP_IDENTITY,
            "no proxy identity is configured and anonymous lookups are unavailable",
        ))
    }

    async fn verify_credentials(&mut self, dn: &str, password: &str) -> Result<()> {
        if !password.is_empty() && self.bind(Some(dn), Some(password)).await? {
            return Ok(());
        }
        Err(rejected_credentials(dn))
    }

    /// Reads the configured identity attributes (plus `extra_attributes`) of the entry at `dn`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-user error (10302) when no entry exists at `dn`, besides the errors
    /// of [`read`](Self::read).
    pub async fn get_user_details(
        &mut self,
        dn: &str,
        extra_attributes: &[&str],
    ) -> Result<UserDetails> {
        let config = Arc::clone(&self.config);
        let mut attributes = vec![
            config.uid_attribute(),
            config.fullname_attribute(),
            config.email_attribute(),
        ];
        attributes.extend_from_slice(extra_attributes);

        let results = self.read(Some(dn), None, &attributes).await?;
        let entry = results.iter().next().ok_or_else(|| {
            Error::invalid_user(codes::UNKNOWN_USER, format!("no entry at `{dn}`"))
        })?;
        UserDetails::from_entry(entry, &config)
    }

    fn connected_session(
        &mut self,
        operation: &str,
    ) -> Result<&mut (dyn DirectorySession + 'static)> {
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(Error::not_connected(format!(
                "cannot {operation}: not connected to the directory"
            ))),
        }
    }

    fn bound_session(
        &mut self,
        operation: &str,
    ) -> Result<&mut (dyn DirectorySession + 'static)> {
        match (&self.state, self.session.as_deref_mut()) {
            (_, None) => Err(Error::not_connected(format!(
                "cannot {operation}: not connected to the directory"
            ))),
            (ConnectionState::Bound(_), Some(session)) => Ok(session),
            (_, Some(_)) => Err(Error::not_bound(format!(
                "cannot {operation}: the connection is not bound"
            ))),
        }
    }
}

impl std::fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("url", &self.config.url())
            .field("state", &self.state)
            .field("allow_anonymous", &self.allow_anonymous)
            .finish_non_exhaustive()
    }
}

fn requested_attributes(attributes: &[&str]) -> Vec<String> {
    let requested: Vec<String> = attributes
        .iter()
        .map(|attribute| attribute.trim())
        .filter(|attribute| !attribute.is_empty() && !attribute.eq_ignore_ascii_case("dn"))
        .map(str::to_string)
        .collect();

    if requested.is_empty() && !attributes.is_empty() {
        vec![NO_ATTRIBUTES.to_string()]
    } else {
        requested
    }
}

fn rejected_credentials(identity: &str) -> Error {
    Error::invalid_user(
        codes::INVALID_CREDENTIALS,
        format!("credentials rejected for `{identity}`"),
    )
}
