//! LDAP directory client.
//!
//! This crate provides the connection and bind state machine, search/read/compare operations with
//! materialized results, attribute mutation and username-to-DN resolution on top of a pluggable
//! directory session (backed by `ldap3` by default).

#![cfg_attr(not(test), deny(missing_docs))]

mod changes;
mod client;
mod config;
mod dn;
mod query;
mod results;
mod session;
mod user;

pub use changes::{AttributeChangeSet, ModifyOperation};
pub use client::{BindIdentity, ConnectionState, DirectoryClient};
pub use config::{
    DirectoryConfig, ProxyIdentity, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_FILTER,
    DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use dn::{escape_value, DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use query::{escape_filter_value, UserQuery};
pub use results::{Entry, SearchResults};
pub use session::{
    result_code, DirectoryConnector, DirectoryModification, DirectorySession, LdapConnector,
    LdapStatus, RawEntry, RawSearchResult, SearchScope,
};
pub use user::UserDetails;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirbind_core::Result<T>;
