//! # dirbind-core
//!
//! Core types for the dirbind directory client.
//!
//! ## Modules
//!
//! - [`error`] - Classified error taxonomy with numeric codes
//! - [`config`] - Deserializable settings surface with validation
//! - [`secret`] - Proxy credential resolution and decryption

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod secret;

// Re-export commonly used types
pub use config::{DirectorySettings, ProxyEncryption};
pub use error::{codes, Error, ErrorKind, Result};
pub use secret::{AesGcmDecryptor, CredentialResolver, KeySource, ProxySecret, SecretDecryptor};
