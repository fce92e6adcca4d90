//! Migration entity model
//!
//! A `Migration` is one run of copying a selected set of items from a
//! source space to a target space. Each `MigrationItem` is tracked through
//! its own status; items keep the order in which they were selected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object being migrated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Connection,
    Folder,
    File,
}

impl ItemKind {
    /// Name namespace this kind lives in on the remote system
    pub fn namespace(&self) -> ConflictKind {
        match self {
            ItemKind::Connection => ConflictKind::Connection,
            ItemKind::Folder | ItemKind::File => ConflictKind::File,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Connection => write!(f, "connection"),
            ItemKind::Folder => write!(f, "folder"),
            ItemKind::File => write!(f, "file"),
        }
    }
}

/// Migration lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl MigrationStatus {
    /// Completed or failed; a cancelled migration is still draining
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Completed | MigrationStatus::Failed)
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::Created => "created",
            MigrationStatus::Running => "running",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-item status: pending -> in_progress -> {completed, failed, skipped}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// What to do with an item whose name already exists in the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Leave the item out of the run
    #[default]
    Skip,
    /// Copy it under a synthesized, non-colliding name
    Rename,
}

impl std::str::FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(ConflictResolution::Skip),
            "rename" => Ok(ConflictResolution::Rename),
            other => Err(format!("unknown conflict resolution '{}'", other)),
        }
    }
}

/// Copy mode. The remote API only supports copying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    #[default]
    Copy,
}

/// Name namespace a conflict was detected in.
/// Connections and files/folders are scoped independently by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Connection,
    File,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Connection => write!(f, "connection"),
            ConflictKind::File => write!(f, "file"),
        }
    }
}

/// A name that already exists in the target space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub name: String,
    pub kind: ConflictKind,
}

/// Why an item is flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    NameExists,
}

/// Conflict annotation carried by an item, with the chosen resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConflict {
    pub reason: ConflictReason,
    pub resolution: ConflictResolution,
}

/// Migration options chosen at creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    pub mode: CopyMode,
    pub conflict_resolution: ConflictResolution,
}

/// Aggregate counts for a migration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// round(100 * completed / total); 100 once the run has finished
    pub percentage: u8,
}

impl MigrationProgress {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> u32 {
        self.completed + self.failed + self.skipped
    }

    /// Recompute `percentage` from the current counts
    pub fn refresh_percentage(&mut self) {
        self.percentage = if self.total == 0 {
            0
        } else {
            ((self.completed as f64 * 100.0) / self.total as f64).round() as u8
        };
    }

    pub fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Completed => self.completed += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Pending | ItemStatus::InProgress => return,
        }
        self.refresh_percentage();
    }
}

/// Snapshot pushed to observers before each item is processed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub progress: MigrationProgress,
    /// Name of the item about to be processed; `None` before start and at the end
    pub current_item: Option<String>,
}

/// One run of copying items between two spaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    /// Session that created the migration
    pub session_id: String,
    pub source_space_id: String,
    pub source_space_name: String,
    pub target_space_id: String,
    pub target_space_name: String,
    pub config: MigrationConfig,
    pub status: MigrationStatus,
    pub progress: MigrationProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when a cancellation request was accepted
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// One object within a migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationItem {
    pub id: String,
    pub migration_id: String,
    /// Id of the object in the source space
    pub source_id: String,
    pub kind: ItemKind,
    pub name: String,
    /// Bytes; 0 for connections and folders
    pub size: u64,
    pub status: ItemStatus,
    pub conflict: Option<ItemConflict>,
    /// Id assigned by the remote to the copy
    pub target_id: Option<String>,
    /// Name the copy was created under, if it differs from `name`
    pub target_name: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationItem {
    /// True if the item is annotated to be left out
    pub fn skip_on_conflict(&self) -> bool {
        matches!(
            self.conflict,
            Some(ItemConflict {
                resolution: ConflictResolution::Skip,
                ..
            })
        )
    }

    /// True if the item must be copied under a new name
    pub fn rename_on_conflict(&self) -> bool {
        matches!(
            self.conflict,
            Some(ItemConflict {
                resolution: ConflictResolution::Rename,
                ..
            })
        )
    }
}

/// An item the caller selected for migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub source_id: String,
    pub kind: ItemKind,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl CandidateItem {
    pub fn connection(source_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            kind: ItemKind::Connection,
            name: name.into(),
            size: 0,
        }
    }

    pub fn file(source_id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            source_id: source_id.into(),
            kind: ItemKind::File,
            name: name.into(),
            size,
        }
    }

    pub fn folder(source_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            kind: ItemKind::Folder,
            name: name.into(),
            size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage_rounds() {
        let mut progress = MigrationProgress::new(3);
        progress.record(ItemStatus::Completed);
        assert_eq!(progress.percentage, 33);
        progress.record(ItemStatus::Completed);
        assert_eq!(progress.percentage, 67);
        progress.record(ItemStatus::Skipped);
        assert_eq!(progress.percentage, 67);
        assert_eq!(progress.processed(), 3);
    }

    #[test]
    fn test_progress_ignores_non_terminal() {
        let mut progress = MigrationProgress::new(2);
        progress.record(ItemStatus::InProgress);
        progress.record(ItemStatus::Pending);
        assert_eq!(progress.processed(), 0);
    }

    #[test]
    fn test_kind_namespaces() {
        assert_eq!(ItemKind::Connection.namespace(), ConflictKind::Connection);
        assert_eq!(ItemKind::File.namespace(), ConflictKind::File);
        assert_eq!(ItemKind::Folder.namespace(), ConflictKind::File);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ItemStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&MigrationStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(serde_json::to_string(&ItemKind::Folder).unwrap(), "\"folder\"");
    }

    #[test]
    fn test_conflict_resolution_from_str() {
        assert_eq!("skip".parse::<ConflictResolution>(), Ok(ConflictResolution::Skip));
        assert_eq!("RENAME".parse::<ConflictResolution>(), Ok(ConflictResolution::Rename));
        assert!("overwrite".parse::<ConflictResolution>().is_err());
    }
}
