//! Conflict detection against the target space
//!
//! Connections and files/folders are checked against separate name sets:
//! the remote scopes them independently, so a connection named "sales"
//! does not collide with a file named "sales". Matching is case-sensitive.
//! Nothing is cached; every call reflects the target at detection time.

use std::collections::HashSet;
use tracing::debug;

use crate::remote::{ContentClient, RemoteError};

use super::model::{Conflict, ConflictKind};

/// Candidate names that already exist in the target, per namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedConflicts {
    pub connections: HashSet<String>,
    pub files: HashSet<String>,
}

impl DetectedConflicts {
    pub fn contains(&self, kind: ConflictKind, name: &str) -> bool {
        match kind {
            ConflictKind::Connection => self.connections.contains(name),
            ConflictKind::File => self.files.contains(name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len() + self.files.len()
    }
}

/// Finds candidate names that collide with existing target objects
pub struct ConflictDetector<'a> {
    client: &'a dyn ContentClient,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(client: &'a dyn ContentClient) -> Self {
        Self { client }
    }

    /// Fetch the target's connections and files/folders and return the
    /// candidate names found in each namespace.
    pub async fn detect<'n>(
        &self,
        target_space_id: &str,
        connection_names: impl IntoIterator<Item = &'n str>,
        file_names: impl IntoIterator<Item = &'n str>,
    ) -> Result<DetectedConflicts, RemoteError> {
        let (existing_connections, existing_files) = tokio::try_join!(
            self.client.list_connections(Some(target_space_id)),
            self.client.list_files(target_space_id, true),
        )?;

        let connection_set: HashSet<&str> = existing_connections
            .iter()
            .filter(|c| c.space_id.as_deref() == Some(target_space_id))
            .map(|c| c.name.as_str())
            .collect();
        let file_set: HashSet<&str> = existing_files.iter().map(|f| f.name.as_str()).collect();

        let detected = DetectedConflicts {
            connections: connection_names
                .into_iter()
                .filter(|n| connection_set.contains(n))
                .map(str::to_string)
                .collect(),
            files: file_names
                .into_iter()
                .filter(|n| file_set.contains(n))
                .map(str::to_string)
                .collect(),
        };

        debug!(
            "Conflict check in space {}: {} connection(s), {} file(s) collide",
            target_space_id,
            detected.connections.len(),
            detected.files.len()
        );
        Ok(detected)
    }
}

/// Flatten detected conflicts into a list ordered like the candidates
pub fn conflicts_in_order<'n>(
    detected: &DetectedConflicts,
    candidates: impl IntoIterator<Item = (ConflictKind, &'n str)>,
) -> Vec<Conflict> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(kind, name)| detected.contains(*kind, name))
        .filter(|(kind, name)| seen.insert((*kind, *name)))
        .map(|(kind, name)| Conflict {
            name: name.to_string(),
            kind,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{DataConnection, DataFile, InMemoryContentClient, RemoteCall, Space};

    fn target() -> InMemoryContentClient {
        InMemoryContentClient::new()
            .with_space(Space::new("T", "Target"))
            .with_connection(DataConnection::new("t1", "DB1", Some("T")))
            .with_connection(DataConnection::new("x1", "Other", Some("X")))
            .with_file(DataFile::file("tf1", "report.csv", 10, "T"))
            .with_file(DataFile::folder("td1", "archive", "T"))
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let client = target();
        let detector = ConflictDetector::new(&client);
        let detected = detector
            .detect("T", ["DB1", "report.csv"], ["DB1", "report.csv", "archive"])
            .await
            .unwrap();

        assert!(detected.connections.contains("DB1"));
        assert!(!detected.connections.contains("report.csv"));
        assert!(detected.files.contains("report.csv"));
        assert!(detected.files.contains("archive"));
        assert!(!detected.files.contains("DB1"));
        assert_eq!(detected.len(), 3);
    }

    #[tokio::test]
    async fn test_match_is_case_sensitive() {
        let client = target();
        let detected = ConflictDetector::new(&client)
            .detect("T", ["db1"], ["Report.csv"])
            .await
            .unwrap();
        assert!(detected.is_empty());
    }

    #[tokio::test]
    async fn test_other_space_names_ignored() {
        let client = target();
        let detected = ConflictDetector::new(&client)
            .detect("T", ["Other"], std::iter::empty())
            .await
            .unwrap();
        assert!(detected.is_empty());
    }

    #[tokio::test]
    async fn test_two_list_calls_per_detection() {
        let client = target();
        ConflictDetector::new(&client)
            .detect("T", std::iter::empty(), std::iter::empty())
            .await
            .unwrap();
        let calls = client.calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&RemoteCall::ListConnections {
            space_id: Some("T".into())
        }));
        assert!(calls.contains(&RemoteCall::ListFiles { space_id: "T".into() }));
    }

    #[test]
    fn test_conflicts_in_order_dedups() {
        let detected = DetectedConflicts {
            connections: ["DB1".to_string()].into_iter().collect(),
            files: ["a.csv".to_string()].into_iter().collect(),
        };
        let conflicts = conflicts_in_order(
            &detected,
            [
                (ConflictKind::File, "a.csv"),
                (ConflictKind::Connection, "DB1"),
                (ConflictKind::File, "b.csv"),
                (ConflictKind::File, "a.csv"),
            ],
        );
        assert_eq!(
            conflicts,
            vec![
                Conflict {
                    name: "a.csv".into(),
                    kind: ConflictKind::File
                },
                Conflict {
                    name: "DB1".into(),
                    kind: ConflictKind::Connection
                },
            ]
        );
    }
}
