//! Shared types for the remote content client
//!
//! Spaces, data connections and data files as the tenant API exposes them,
//! plus the error type every remote call returns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named workspace that scopes connections, files and folders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    /// Space type as reported by the tenant (e.g. "shared", "managed")
    #[serde(default, rename = "type")]
    pub space_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Space {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            space_type: None,
            description: None,
        }
    }
}

/// A named reference to an external data source registered in a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConnection {
    pub id: String,
    pub name: String,
    /// Owning space. `None` for personal connections.
    #[serde(default)]
    pub space_id: Option<String>,
    /// Connector type (e.g. "PostgreSQL", "File")
    #[serde(default)]
    pub datasource_id: Option<String>,
}

impl DataConnection {
    pub fn new(id: impl Into<String>, name: impl Into<String>, space_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            space_id: space_id.map(str::to_string),
            datasource_id: None,
        }
    }
}

/// A file or folder stored in a space's file-storage connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: String,
    pub name: String,
    /// Size in bytes (0 for folders)
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub space_id: Option<String>,
    /// Connection the file lives in
    #[serde(default)]
    pub connection_id: Option<String>,
}

impl DataFile {
    pub fn file(id: impl Into<String>, name: impl Into<String>, size: u64, space_id: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            is_folder: false,
            space_id: Some(space_id.to_string()),
            connection_id: None,
        }
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>, space_id: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            is_folder: true,
            space_id: Some(space_id.to_string()),
            connection_id: None,
        }
    }
}

/// Remote client error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Validation(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RemoteError {
    /// Map an HTTP status and its (already sanitized) message to an error
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => RemoteError::Unauthorized(message),
            404 => RemoteError::NotFound(message),
            400 | 409 | 422 => RemoteError::Validation(message),
            408 => RemoteError::Timeout,
            429 => RemoteError::RateLimited(message),
            s if s >= 500 => RemoteError::Server(message),
            _ => RemoteError::Server(format!("unexpected status {}: {}", status, message)),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Parse(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}
