//! Error types for the bundle updater
//!
//! One `thiserror`-derived enum per component, aggregated into
//! [`UpdaterError`] the same way a larger app aggregates `IndexError`,
//! `SearchError`, etc. into a single crate-level error.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Top-level error type returned by public crate APIs.
#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("coordinator has not been initialized")]
    NotInitialized,
}

/// Errors from the persisted key-value [`crate::store::Store`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read storage file: {0}")]
    Load(std::io::Error),

    #[error("failed to write storage file: {0}")]
    Save(std::io::Error),

    #[error("storage file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from the download & extraction pipeline.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("too many redirects fetching {url}")]
    TooManyRedirects { url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("server returned {status} for {url}")]
    BadStatus { url: String, status: u16 },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumFailed { expected: String, actual: String },

    #[error("manifest entry hash mismatch for {file_name}: expected {expected}, got {actual}")]
    HashFailed {
        file_name: String,
        expected: String,
        actual: String,
    },

    #[error("payload decryption failed")]
    DecryptionFailed,

    #[error("zip-slip rejected for entry {entry}")]
    ZipSlip { entry: String },

    #[error("zip archive is corrupt: {0}")]
    BadArchive(String),
}

/// Errors from checksum/decrypt/id operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("io error hashing file: {0}")]
    Io(#[from] std::io::Error),

    #[error("session key decryption failed")]
    Decrypt,
}

/// Errors from [`crate::registry::BundleRegistry`] lifecycle operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("bundle {0} not found")]
    NotFound(String),

    #[error("bundle {0} is not in status success")]
    NotSuccess(String),

    #[error("bundle {0} cannot be deleted: {1}")]
    CannotDelete(String, String),

    #[error("operation not allowed: {0}")]
    NotAllowed(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the channel client.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server rejected the request: {0}")]
    Rejected(String),
}
