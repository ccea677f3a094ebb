//! Error types for directory operations.
//!
//! Every failure the client can raise is a classified error: a kind (the enum variant), a stable
//! numeric code and a human-readable message. Expected negative outcomes (a rejected password, a
//! compare mismatch, zero search matches) are not errors and never appear here.

use serde::Serialize;
use thiserror::Error;

/// Numeric error codes carried by [`Error`].
pub mod codes {
    /// Opening the connection or negotiating StartTLS failed.
    pub const CONNECT_FAILED: u32 = 10005;
    /// An operation required a connection that was never established.
    pub const NOT_CONNECTED: u32 = 10006;
    /// An operation required a bind while the connection was unbound.
    pub const NOT_BOUND: u32 = 10007;
    /// A directory operation exceeded the configured timeout.
    pub const OPERATION_TIMEOUT: u32 = 10008;

    /// Search rejected by the directory for an unclassified reason.
    pub const SEARCH_FAILED: u32 = 10101;
    /// Search filter rejected.
    pub const INVALID_FILTER: u32 = 10102;
    /// Read rejected by the directory for an unclassified reason.
    pub const READ_FAILED: u32 = 10111;
    /// Distinguished name rejected.
    pub const INVALID_DN: u32 = 10112;
    /// Raw search result could not be materialized.
    pub const INVALID_RAW_RESULT: u32 = 10121;
    /// Entry index outside of a search result.
    pub const ENTRY_OUT_OF_RANGE: u32 = 10122;
    /// Compare target entry or attribute does not exist.
    pub const COMPARE_TARGET_MISSING: u32 = 10131;
    /// Compare rejected by the directory for another reason.
    pub const COMPARE_FAILED: u32 = 10132;
    /// Replace modification rejected.
    pub const REPLACE_REJECTED: u32 = 10151;
    /// Delete modification rejected.
    pub const DELETE_REJECTED: u32 = 10161;
    /// Add modification rejected.
    pub const ADD_REJECTED: u32 = 10171;

    /// Encryption key file missing or unreadable.
    pub const KEY_FILE_UNREADABLE: u32 = 10201;
    /// Proxy secret could not be decrypted.
    pub const DECRYPTION_FAILED: u32 = 10202;

    /// No user query template configured.
    pub const MISSING_USER_QUERY: u32 = 10301;
    /// No directory entry matched the username.
    pub const UNKNOWN_USER: u32 = 10302;
    /// The user entry exists but the credential was rejected.
    pub const INVALID_CREDENTIALS: u32 = 10303;
    /// More than one directory entry matched the username.
    pub const AMBIGUOUS_USER: u32 = 10304;
    /// Base DN is blank.
    pub const BLANK_BASE_DN: u32 = 10321;
    /// The proxy identity was rejected by the directory.
    pub const INVALID_PROXY_IDENTITY: u32 = 10322;
    /// Neither a proxy credential nor anonymous access is available.
    pub const NO_LOOKUP_IDENTITY: u32 = 10323;
    /// Settings failed validation.
    pub const INVALID_SETTINGS: u32 = 10401;
}

/// Broad classification of an [`Error`], independent of its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport or StartTLS failure.
    Connection,
    /// Operation attempted before connecting.
    NotConnected,
    /// Operation attempted while unbound.
    NotBound,
    /// Operation timed out.
    Timeout,
    /// Directory rejected the search filter.
    InvalidFilter,
    /// Directory rejected the DN syntax.
    InvalidDn,
    /// Malformed argument or structurally rejected modification.
    InvalidArgument,
    /// Compare target does not exist.
    CompareTargetMissing,
    /// Unclassified directory rejection.
    Directory,
    /// Proxy credential could not be produced.
    Credential,
    /// Configuration makes the requested operation impossible.
    ConfigDefect,
    /// User resolution failed.
    InvalidUser,
}

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Transport or StartTLS failure
    #[error("Connection error [{code}]: {message}")]
    Connection {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Operation requires a connection
    #[error("Not connected [{code}]: {message}")]
    NotConnected {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Operation requires a bind
    #[error("Not bound [{code}]: {message}")]
    NotBound {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Timeout [{code}]: {message}")]
    Timeout {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Invalid search filter
    #[error("Invalid search filter [{code}]: {message}")]
    InvalidFilter {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Invalid distinguished name
    #[error("Invalid DN [{code}]: {message}")]
    InvalidDn {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Invalid argument or rejected modification
    #[error("Invalid argument [{code}]: {message}")]
    InvalidArgument {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Compare target missing
    #[error("Compare target missing [{code}]: {message}")]
    CompareTargetMissing {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Directory rejected the operation
    #[error("Directory error [{code}]: {message}")]
    Directory {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Credential resolution failed
    #[error("Credential error [{code}]: {message}")]
    Credential {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// Configuration defect
    #[error("Configuration defect [{code}]: {message}")]
    ConfigDefect {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },

    /// User resolution failed
    #[error("Invalid user [{code}]: {message}")]
    InvalidUser {
        /// Numeric error code
        code: u32,
        /// Error message
        message: String,
    },
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error kind
    pub kind: ErrorKind,
    /// Numeric error code
    pub code: u32,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Creates a connection error with the default code.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            code: codes::CONNECT_FAILED,
            message: message.into(),
        }
    }

    /// Creates a not-connected error.
    #[must_use]
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            code: codes::NOT_CONNECTED,
            message: message.into(),
        }
    }

    /// Creates a not-bound error.
    #[must_use]
    pub fn not_bound(message: impl Into<String>) -> Self {
        Self::NotBound {
            code: codes::NOT_BOUND,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            code: codes::OPERATION_TIMEOUT,
            message: message.into(),
        }
    }

    /// Creates an invalid-filter error.
    #[must_use]
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            code: codes::INVALID_FILTER,
            message: message.into(),
        }
    }

    /// Creates an invalid-DN error.
    #[must_use]
    pub fn invalid_dn(message: impl Into<String>) -> Self {
        Self::InvalidDn {
            code: codes::INVALID_DN,
            message: message.into(),
        }
    }

    /// Creates an invalid-argument error with an explicit code.
    #[must_use]
    pub fn invalid_argument(code: u32, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            code,
            message: message.into(),
        }
    }

    /// Creates a compare-target-missing error.
    #[must_use]
    pub fn compare_target_missing(message: impl Into<String>) -> Self {
        Self::CompareTargetMissing {
            code: codes::COMPARE_TARGET_MISSING,
            message: message.into(),
        }
    }

    /// Creates an unclassified directory error with an explicit code.
    #[must_use]
    pub fn directory(code: u32, message: impl Into<String>) -> Self {
        Self::Directory {
            code,
            message: message.into(),
        }
    }

    /// Creates a credential error with an explicit code.
    #[must_use]
    pub fn credential(code: u32, message: impl Into<String>) -> Self {
        Self::Credential {
            code,
            message: message.into(),
        }
    }

    /// Creates a configuration-defect error with an explicit code.
    #[must_use]
    pub fn config_defect(code: u32, message: impl Into<String>) -> Self {
        Self::ConfigDefect {
            code,
            message: message.into(),
        }
    }

    /// Creates an invalid-user error with an explicit code.
    #[must_use]
    pub fn invalid_user(code: u32, message: impl Into<String>) -> Self {
        Self::InvalidUser {
            code,
            message: message.into(),
        }
    }

    /// Returns the numeric code carried by this error.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Connection { code, .. }
            | Self::NotConnected { code, .. }
            | Self::NotBound { code, .. }
            | Self::Timeout { code, .. }
            | Self::InvalidFilter { code, .. }
            | Self::InvalidDn { code, .. }
            | Self::InvalidArgument { code, .. }
            | Self::CompareTargetMissing { code, .. }
            | Self::Directory { code, .. }
            | Self::Credential { code, .. }
            | Self::ConfigDefect { code, .. }
            | Self::InvalidUser { code, .. } => *code,
        }
    }

    /// Returns the message carried by this error.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Connection { message, .. }
            | Self::NotConnected { message, .. }
            | Self::NotBound { message, .. }
            | Self::Timeout { message, .. }
            | Self::InvalidFilter { message, .. }
            | Self::InvalidDn { message, .. }
            | Self::InvalidArgument { message, .. }
            | Self::CompareTargetMissing { message, .. }
            | Self::Directory { message, .. }
            | Self::Credential { message, .. }
            | Self::ConfigDefect { message, .. }
            | Self::InvalidUser { message, .. } => message,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::NotConnected { .. } => ErrorKind::NotConnected,
            Self::NotBound { .. } => ErrorKind::NotBound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidFilter { .. } => ErrorKind::InvalidFilter,
            Self::InvalidDn { .. } => ErrorKind::InvalidDn,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::CompareTargetMissing { .. } => ErrorKind::CompareTargetMissing,
            Self::Directory { .. } => ErrorKind::Directory,
            Self::Credential { .. } => ErrorKind::Credential,
            Self::ConfigDefect { .. } => ErrorKind::ConfigDefect,
            Self::InvalidUser { .. } => ErrorKind::InvalidUser,
        }
    }

    /// Returns a stable identifier for the error kind.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::NotConnected => "NOT_CONNECTED",
            ErrorKind::NotBound => "NOT_BOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InvalidFilter => "INVALID_FILTER",
            ErrorKind::InvalidDn => "INVALID_DN",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::CompareTargetMissing => "COMPARE_TARGET_MISSING",
            ErrorKind::Directory => "DIRECTORY_ERROR",
            ErrorKind::Credential => "CREDENTIAL_ERROR",
            ErrorKind::ConfigDefect => "CONFIG_DEFECT",
            ErrorKind::InvalidUser => "INVALID_USER",
        }
    }

    /// Converts the error into an [`ErrorResponse`].
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            code: self.code(),
            message: self.to_string(),
        }
    }

    /// Returns true if this error signals a defect worth logging as an error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConfigDefect { .. } | Self::Directory { .. }
        )
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::config_defect(
            codes::INVALID_SETTINGS,
            format!("invalid directory endpoint: {err}"),
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::config_defect(codes::INVALID_SETTINGS, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::config_defect(
            codes::INVALID_SETTINGS,
            format!("unparsable settings: {err}"),
        )
    }
}
