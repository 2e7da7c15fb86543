//! # Error Handling
//!
//! This module defines the centralized error type for `tree-pager`. It uses
//! the `thiserror` library to build a single `Error` enum covering every
//! failure the caching engine, its backing stores and its configuration layer
//! can report.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all failure kinds. The caching-specific kinds are
//!   `NoPolicy`, `Sync`, `MalformedContent` and `Unsupported`; the rest cover
//!   tree handles, selectors, configuration and wrapped I/O or parser errors.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Failures from `sync`, `flush`, `insert`, `update` and `remove` are always
//! propagated to whatever triggered them. Nothing in this crate retries.

use thiserror::Error;

/// Main error type for tree-pager operations
#[derive(Error, Debug)]
pub enum Error {
    /// An operation that needs a caching policy was attempted on a reference
    /// without one.
    #[error("No caching policy attached to '{node}'")]
    NoPolicy { node: String },

    /// A backing store failed to populate, persist or reconcile a reference.
    ///
    /// The underlying cause, when there is one, is kept as the error source.
    #[error("Sync failed for '{node}': {message}")]
    Sync {
        node: String,
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    /// Serialized content handed to `insert`/`update`/`remove` could not be
    /// parsed. The offending text is kept for diagnostics.
    #[error("Malformed content: {message}\n  content: {text}")]
    MalformedContent { message: String, text: String },

    /// A backing store cannot perform the requested operation (for example a
    /// read-only or directory-shaped source).
    #[error("Unsupported operation: {operation} is not supported by {target}")]
    Unsupported { operation: String, target: String },

    /// A node handle no longer (or never did) refer to a live node.
    #[error("Unknown node handle: {id}")]
    UnknownNode { id: String },

    /// A policy handle or name did not resolve.
    #[error("Unknown caching policy: {name}")]
    UnknownPolicy { name: String },

    /// A write was attempted on a structurally locked node.
    #[error("Node '{node}' is locked")]
    Locked { node: String },

    /// A selector expression could not be parsed.
    #[error("Invalid selector '{expression}': {message}")]
    Selector { expression: String, message: String },

    /// The settings document could not be parsed or resolved.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wraps `cause` as a sync failure of `node`.
    pub fn sync_failure(node: impl Into<String>, cause: Error) -> Self {
        Error::Sync {
            node: node.into(),
            message: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// True for the failure kinds a caller of `sync` or a reconciliation call
    /// sees as "the backing content could not be applied".
    pub fn is_sync_failure(&self) -> bool {
        matches!(self, Error::Sync { .. } | Error::MalformedContent { .. })
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
