//! Remote Content Client
//!
//! This module provides the abstraction over the tenant's content API.
//! The migration engine only ever talks to a `ContentClient`; the HTTP
//! adapter and the in-memory client both implement it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             ContentClient Trait             │
//! │   spaces, connections, files, copy, dup     │
//! └─────────────────────────────────────────────┘
//!                      │
//!            ┌─────────┴─────────┐
//!            ▼                   ▼
//!     ┌─────────────┐     ┌─────────────┐
//!     │ CloudClient │     │  InMemory   │
//!     │  (reqwest)  │     │ (dry runs)  │
//!     └─────────────┘     └─────────────┘
//! ```

pub mod cloud;
pub mod http_retry;
pub mod memory;
pub mod types;

pub use cloud::CloudContentClient;
pub use memory::{InMemoryContentClient, RemoteCall};
pub use types::*;

use async_trait::async_trait;

/// Unified remote content client trait
///
/// Every call is a single remote request (or a paginated series of them for
/// listings). Implementations must bound each call with a timeout and fail
/// with `RemoteError::Timeout` instead of hanging.
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// List all spaces visible to the authenticated user
    async fn list_spaces(&self) -> Result<Vec<Space>, RemoteError>;

    /// Get a single space, `RemoteError::NotFound` if the id is invalid
    async fn get_space(&self, space_id: &str) -> Result<Space, RemoteError>;

    /// Rename a space, returning the updated record
    async fn rename_space(&self, space_id: &str, new_name: &str) -> Result<Space, RemoteError>;

    /// List data connections, optionally scoped to a space
    async fn list_connections(
        &self,
        space_id: Option<&str>,
    ) -> Result<Vec<DataConnection>, RemoteError>;

    /// Duplicate a connection into the target space, returning the new id
    async fn duplicate_connection(
        &self,
        source_id: &str,
        target_space_id: &str,
        new_name: Option<&str>,
    ) -> Result<String, RemoteError>;

    /// Resolve the file-storage connection of a space, if it has one
    async fn resolve_file_storage_connection(
        &self,
        space_id: &str,
    ) -> Result<Option<String>, RemoteError>;

    /// List the files (and optionally folders) that belong to a space
    async fn list_files(
        &self,
        space_id: &str,
        include_folders: bool,
    ) -> Result<Vec<DataFile>, RemoteError>;

    /// Copy a file into the given connection under `name`, returning the new id.
    /// With no connection id the tenant's default storage is used.
    async fn copy_file(
        &self,
        source_id: &str,
        target_connection_id: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError>;

    /// Copy a folder into the given connection under `name`, returning the new id
    async fn copy_folder(
        &self,
        source_id: &str,
        target_connection_id: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError>;
}
