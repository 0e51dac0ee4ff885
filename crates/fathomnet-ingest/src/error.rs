// SPDX-License-Identifier: Apache-2.0

/// Error type covering all failure modes of the FathomNet ingest tools.
///
/// Most variants wrap errors from the underlying libraries (filesystem,
/// JSON parsing, HTTP, object storage). The remaining variants describe
/// conditions detected by this crate, such as a catalog dataset name
/// collision.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// Object storage operation error.
    StorageError(object_store::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// RPC error with error code and message from the catalog server.
    RpcError(i32, String),
    /// Async task join error.
    JoinError(tokio::task::JoinError),
    /// A catalog dataset with this name already exists.
    DatasetExists(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::StorageError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::JoinError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::StorageError(e) => write!(f, "Object storage error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::RpcError(code, msg) => write!(f, "RPC error {}: {}", code, msg),
            Error::JoinError(e) => write!(f, "Task join error: {}", e),
            Error::DatasetExists(name) => write!(f, "Dataset already exists: {}", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::StorageError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::JoinError(e) => Some(e),
            _ => None,
        }
    }
}
