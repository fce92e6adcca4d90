//! In-process content client
//!
//! Holds spaces, connections and files in memory and behaves like the
//! tenant API for the calls the migrator makes. Used for dry runs and by the
//! test suites, which can inject failures per source object and pause a
//! call mid-flight with a `CallGate`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use super::{ContentClient, DataConnection, DataFile, RemoteError, Space};

/// A call received by the in-memory client, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListSpaces,
    GetSpace { space_id: String },
    RenameSpace { space_id: String, new_name: String },
    ListConnections { space_id: Option<String> },
    DuplicateConnection {
        source_id: String,
        target_space_id: String,
        new_name: Option<String>,
    },
    ResolveFileStorage { space_id: String },
    ListFiles { space_id: String },
    CopyFile {
        source_id: String,
        connection_id: Option<String>,
        name: String,
    },
    CopyFolder {
        source_id: String,
        connection_id: Option<String>,
        name: String,
    },
}

impl RemoteCall {
    /// True for calls that create objects in the target
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteCall::DuplicateConnection { .. }
                | RemoteCall::CopyFile { .. }
                | RemoteCall::CopyFolder { .. }
                | RemoteCall::RenameSpace { .. }
        )
    }

    /// Source object id of a copy/duplicate call
    pub fn source_id(&self) -> Option<&str> {
        match self {
            RemoteCall::DuplicateConnection { source_id, .. }
            | RemoteCall::CopyFile { source_id, .. }
            | RemoteCall::CopyFolder { source_id, .. } => Some(source_id),
            _ => None,
        }
    }
}

/// Pauses a copy/duplicate call for one source object until released
#[derive(Default)]
pub struct CallGate {
    entered: Notify,
    release: Notify,
}

impl CallGate {
    /// Wait until the gated call has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the gated call proceed
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct State {
    spaces: Vec<Space>,
    connections: Vec<DataConnection>,
    files: Vec<DataFile>,
    /// space id -> file-storage connection id
    storage: HashMap<String, String>,
    /// Space that receives copies sent without a connection id
    default_space: Option<String>,
    failures: HashMap<String, RemoteError>,
    gates: HashMap<String, Arc<CallGate>>,
    calls: Vec<RemoteCall>,
    next_id: u64,
}

impl State {
    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn space_exists(&self, space_id: &str) -> bool {
        self.spaces.iter().any(|s| s.id == space_id)
    }

    fn storage_space(&self, connection_id: &str) -> Option<String> {
        self.storage
            .iter()
            .find(|(_, conn)| conn.as_str() == connection_id)
            .map(|(space, _)| space.clone())
    }
}

/// Content client backed by in-memory tables
#[derive(Default)]
pub struct InMemoryContentClient {
    state: Mutex<State>,
}

impl InMemoryContentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_space(mut self, space: Space) -> Self {
        self.state.get_mut().spaces.push(space);
        self
    }

    pub fn with_connection(mut self, connection: DataConnection) -> Self {
        self.state.get_mut().connections.push(connection);
        self
    }

    pub fn with_file(mut self, file: DataFile) -> Self {
        self.state.get_mut().files.push(file);
        self
    }

    /// Register the file-storage connection of a space
    pub fn with_file_storage(mut self, space_id: &str, connection_id: &str) -> Self {
        self.state
            .get_mut()
            .storage
            .insert(space_id.to_string(), connection_id.to_string());
        self
    }

    /// Land file/folder copies made without a connection id in `space_id`,
    /// the way the tenant falls back to its default storage
    pub fn with_default_storage_space(mut self, space_id: &str) -> Self {
        self.state.get_mut().default_space = Some(space_id.to_string());
        self
    }

    /// Make every copy/duplicate of `source_id` fail with `error`
    pub async fn fail_on(&self, source_id: &str, error: RemoteError) {
        self.state
            .lock()
            .await
            .failures
            .insert(source_id.to_string(), error);
    }

    /// Gate the next copy/duplicate of `source_id`
    pub async fn gate(&self, source_id: &str) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        self.state
            .lock()
            .await
            .gates
            .insert(source_id.to_string(), gate.clone());
        gate
    }

    /// All calls received so far
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn connections_in(&self, space_id: &str) -> Vec<DataConnection> {
        self.state
            .lock()
            .await
            .connections
            .iter()
            .filter(|c| c.space_id.as_deref() == Some(space_id))
            .cloned()
            .collect()
    }

    pub async fn files_in(&self, space_id: &str) -> Vec<DataFile> {
        self.state
            .lock()
            .await
            .files
            .iter()
            .filter(|f| f.space_id.as_deref() == Some(space_id))
            .cloned()
            .collect()
    }

    async fn record(&self, call: RemoteCall) {
        self.state.lock().await.calls.push(call);
    }

    /// Record a write call, pass through its gate, and report an injected failure
    async fn enter_write(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let source_id = call.source_id().map(str::to_string);
        let gate = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            source_id
                .as_deref()
                .and_then(|id| state.gates.remove(id))
        };

        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let state = self.state.lock().await;
        match source_id.and_then(|id| state.failures.get(&id).cloned()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn copy_data_file(
        &self,
        source_id: &str,
        connection_id: Option<&str>,
        name: &str,
        folder: bool,
    ) -> Result<String, RemoteError> {
        let mut state = self.state.lock().await;
        let source = state
            .files
            .iter()
            .find(|f| f.id == source_id && f.is_folder == folder)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("data file {}", source_id)))?;

        let target_space = match connection_id {
            Some(conn) => Some(
                state
                    .storage_space(conn)
                    .ok_or_else(|| RemoteError::NotFound(format!("connection {}", conn)))?,
            ),
            None => state.default_space.clone(),
        };

        if state
            .files
            .iter()
            .any(|f| f.name == name && f.space_id == target_space)
        {
            return Err(RemoteError::Validation(format!(
                "a file named '{}' already exists",
                name
            )));
        }

        let id = state.new_id(if folder { "folder" } else { "file" });
        state.files.push(DataFile {
            id: id.clone(),
            name: name.to_string(),
            size: source.size,
            is_folder: folder,
            space_id: target_space,
            connection_id: connection_id.map(str::to_string),
        });
        Ok(id)
    }
}

#[async_trait]
impl ContentClient for InMemoryContentClient {
    async fn list_spaces(&self) -> Result<Vec<Space>, RemoteError> {
        self.record(RemoteCall::ListSpaces).await;
        Ok(self.state.lock().await.spaces.clone())
    }

    async fn get_space(&self, space_id: &str) -> Result<Space, RemoteError> {
        self.record(RemoteCall::GetSpace {
            space_id: space_id.to_string(),
        })
        .await;
        self.state
            .lock()
            .await
            .spaces
            .iter()
            .find(|s| s.id == space_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("space {}", space_id)))
    }

    async fn rename_space(&self, space_id: &str, new_name: &str) -> Result<Space, RemoteError> {
        self.record(RemoteCall::RenameSpace {
            space_id: space_id.to_string(),
            new_name: new_name.to_string(),
        })
        .await;
        let mut state = self.state.lock().await;
        if state.spaces.iter().any(|s| s.name == new_name && s.id != space_id) {
            return Err(RemoteError::Validation(format!(
                "space name '{}' is taken",
                new_name
            )));
        }
        let space = state
            .spaces
            .iter_mut()
            .find(|s| s.id == space_id)
            .ok_or_else(|| RemoteError::NotFound(format!("space {}", space_id)))?;
        space.name = new_name.to_string();
        Ok(space.clone())
    }

    async fn list_connections(
        &self,
        space_id: Option<&str>,
    ) -> Result<Vec<DataConnection>, RemoteError> {
        self.record(RemoteCall::ListConnections {
            space_id: space_id.map(str::to_string),
        })
        .await;
        let state = self.state.lock().await;
        Ok(state
            .connections
            .iter()
            .filter(|c| space_id.map_or(true, |s| c.space_id.as_deref() == Some(s)))
            .cloned()
            .collect())
    }

    async fn duplicate_connection(
        &self,
        source_id: &str,
        target_space_id: &str,
        new_name: Option<&str>,
    ) -> Result<String, RemoteError> {
        self.enter_write(RemoteCall::DuplicateConnection {
            source_id: source_id.to_string(),
            target_space_id: target_space_id.to_string(),
            new_name: new_name.map(str::to_string),
        })
        .await?;

        let mut state = self.state.lock().await;
        if !state.space_exists(target_space_id) {
            return Err(RemoteError::NotFound(format!("space {}", target_space_id)));
        }
        let source = state
            .connections
            .iter()
            .find(|c| c.id == source_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("data connection {}", source_id)))?;

        let name = new_name.unwrap_or(&source.name).to_string();
        if state
            .connections
            .iter()
            .any(|c| c.name == name && c.space_id.as_deref() == Some(target_space_id))
        {
            return Err(RemoteError::Validation(format!(
                "a connection named '{}' already exists",
                name
            )));
        }

        let id = state.new_id("conn");
        state.connections.push(DataConnection {
            id: id.clone(),
            name,
            space_id: Some(target_space_id.to_string()),
            datasource_id: source.datasource_id,
        });
        Ok(id)
    }

    async fn resolve_file_storage_connection(
        &self,
        space_id: &str,
    ) -> Result<Option<String>, RemoteError> {
        self.record(RemoteCall::ResolveFileStorage {
            space_id: space_id.to_string(),
        })
        .await;
        Ok(self.state.lock().await.storage.get(space_id).cloned())
    }

    async fn list_files(
        &self,
        space_id: &str,
        include_folders: bool,
    ) -> Result<Vec<DataFile>, RemoteError> {
        self.record(RemoteCall::ListFiles {
            space_id: space_id.to_string(),
        })
        .await;
        let state = self.state.lock().await;
        Ok(state
            .files
            .iter()
            .filter(|f| f.space_id.as_deref() == Some(space_id))
            .filter(|f| include_folders || !f.is_folder)
            .cloned()
            .collect())
    }

    async fn copy_file(
        &self,
        source_id: &str,
        target_connection_id: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError> {
        self.enter_write(RemoteCall::CopyFile {
            source_id: source_id.to_string(),
            connection_id: target_connection_id.map(str::to_string),
            name: name.to_string(),
        })
        .await?;
        self.copy_data_file(source_id, target_connection_id, name, false)
            .await
    }

    async fn copy_folder(
        &self,
        source_id: &str,
        target_connection_id: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError> {
        self.enter_write(RemoteCall::CopyFolder {
            source_id: source_id.to_string(),
            connection_id: target_connection_id.map(str::to_string),
            name: name.to_string(),
        })
        .await?;
        self.copy_data_file(source_id, target_connection_id, name, true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> InMemoryContentClient {
        InMemoryContentClient::new()
            .with_space(Space::new("S", "Source"))
            .with_space(Space::new("T", "Target"))
            .with_connection(DataConnection::new("c1", "DB1", Some("S")))
            .with_file(DataFile::file("f1", "report.csv", 500, "S"))
            .with_file(DataFile::folder("d1", "raw", "S"))
            .with_file_storage("S", "store-S")
            .with_file_storage("T", "store-T")
    }

    #[tokio::test]
    async fn test_duplicate_connection_into_target() {
        let client = client();
        let id = client.duplicate_connection("c1", "T", None).await.unwrap();
        let target = client.connections_in("T").await;
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].id, id);
        assert_eq!(target[0].name, "DB1");

        let err = client.duplicate_connection("c1", "T", None).await.unwrap_err();
        assert!(matches!(err, RemoteError::Validation(_)));
    }

    #[tokio::test]
    async fn test_copy_file_lands_in_connection_space() {
        let client = client();
        client
            .copy_file("f1", Some("store-T"), "report.csv")
            .await
            .unwrap();
        let files = client.files_in("T").await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 500);

        let err = client.copy_folder("f1", Some("store-T"), "x").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_copy_without_connection_uses_default_space() {
        let client = client().with_default_storage_space("T");
        let id = client.copy_file("f1", None, "report.csv").await.unwrap();
        let files = client.files_in("T").await;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, id);
        assert_eq!(files[0].connection_id, None);
        assert_eq!(client.list_files("T", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_files_excludes_folders_on_request() {
        let client = client();
        assert_eq!(client.list_files("S", true).await.unwrap().len(), 2);
        assert_eq!(client.list_files("S", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let client = client();
        client.fail_on("f1", RemoteError::Timeout).await;
        let err = client
            .copy_file("f1", Some("store-T"), "report.csv")
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Timeout);
        let writes: Vec<_> = client
            .calls()
            .await
            .into_iter()
            .filter(RemoteCall::is_write)
            .collect();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].source_id(), Some("f1"));
    }

    #[tokio::test]
    async fn test_rename_space() {
        let client = client();
        let renamed = client.rename_space("T", "Target v2").await.unwrap();
        assert_eq!(renamed.name, "Target v2");
        let err = client.rename_space("T", "Source").await.unwrap_err();
        assert!(matches!(err, RemoteError::Validation(_)));
        let err = client.rename_space("nope", "x").await.unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }
}
