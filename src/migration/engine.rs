//! Migration Execution Engine
//!
//! Drives one migration's items through their state machine, strictly one
//! at a time in stored order. Every remote call and the inter-item delay are
//! the only suspension points; everything else is bookkeeping in the
//! registry.
//!
//! A single item failure never aborts the run. Cancellation is observed at
//! the top of each iteration: the in-flight item finishes, every later item
//! is marked skipped without contacting the remote.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MigrationError;
use crate::remote::{ContentClient, RemoteError};

use super::model::{
    ItemKind, ItemStatus, Migration, MigrationItem, MigrationProgress, MigrationStatus,
    ProgressUpdate,
};
use super::naming::CopyNamer;
use super::registry::MigrationRegistry;

/// Default pause between items
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause after each item that reached the remote, to avoid flooding the API
    pub item_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            item_delay: DEFAULT_ITEM_DELAY,
        }
    }
}

/// Everything a single run needs, captured when the run begins
pub struct MigrationRun {
    pub migration: Migration,
    pub items: Vec<MigrationItem>,
    pub cancel: CancellationToken,
    pub progress: Arc<watch::Sender<ProgressUpdate>>,
}

pub struct MigrationEngine {
    client: Arc<dyn ContentClient>,
    registry: Arc<MigrationRegistry>,
    namer: Arc<CopyNamer>,
    config: EngineConfig,
}

impl MigrationEngine {
    pub fn new(
        client: Arc<dyn ContentClient>,
        registry: Arc<MigrationRegistry>,
        namer: Arc<CopyNamer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            registry,
            namer,
            config,
        }
    }

    /// Execute a migration that has already been moved to `running`.
    /// Returns the final aggregate counts.
    pub async fn run(&self, run: MigrationRun) -> Result<MigrationProgress, MigrationError> {
        let MigrationRun {
            migration,
            items,
            cancel,
            progress,
        } = run;
        let migration_id = migration.id.as_str();
        let total = items.len();

        info!(
            "Migration {} started: {} item(s) from '{}' to '{}'",
            migration_id, total, migration.source_space_name, migration.target_space_name
        );

        let storage_connection = self
            .resolve_storage_connection(&migration.target_space_id)
            .await;

        let mut counts = MigrationProgress::new(total as u32);
        let mut cancelled_skips: u32 = 0;

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                counts = self
                    .finish_item(migration_id, index, ItemStatus::Skipped, None, None)
                    .await?;
                cancelled_skips += 1;
                debug!("Skipped {} '{}' (migration cancelled)", item.kind, item.name);
                continue;
            }

            progress.send_replace(ProgressUpdate {
                progress: counts,
                current_item: Some(item.name.clone()),
            });

            self.registry
                .update_item(migration_id, index, |_, i| {
                    i.status = ItemStatus::InProgress;
                    i.started_at = Some(Utc::now());
                })
                .await?;

            if item.skip_on_conflict() {
                counts = self
                    .finish_item(migration_id, index, ItemStatus::Skipped, None, None)
                    .await?;
                debug!("Skipped {} '{}' (name exists in target)", item.kind, item.name);
                continue;
            }

            let effective_name = if item.rename_on_conflict() {
                self.namer.copy_name(&item.name, item.kind)
            } else {
                item.name.clone()
            };

            let outcome = self
                .dispatch(
                    item,
                    &migration.target_space_id,
                    storage_connection.as_deref(),
                    &effective_name,
                )
                .await;

            counts = match outcome {
                Ok(target_id) => {
                    debug!(
                        "Copied {} '{}' as '{}' ({})",
                        item.kind, item.name, effective_name, target_id
                    );
                    let renamed = (effective_name != item.name).then_some(effective_name);
                    self.finish_item(
                        migration_id,
                        index,
                        ItemStatus::Completed,
                        Some(target_id),
                        renamed.map(Ok),
                    )
                    .await?
                }
                Err(err) => {
                    warn!("Failed to copy {} '{}': {}", item.kind, item.name, err);
                    self.finish_item(
                        migration_id,
                        index,
                        ItemStatus::Failed,
                        None,
                        Some(Err(err)),
                    )
                    .await?
                }
            };

            // Only dispatched items are throttled, and never after the last one
            if index + 1 < total && !self.config.item_delay.is_zero() {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        // Items skipped by a cancel were never attempted
        let attempted = counts.total - cancelled_skips;
        let final_status = if attempted > 0 && counts.failed == attempted {
            MigrationStatus::Failed
        } else {
            MigrationStatus::Completed
        };

        let final_progress = self
            .registry
            .update_migration(migration_id, |m| {
                m.status = final_status;
                m.completed_at = Some(Utc::now());
                m.progress.percentage = 100;
                m.progress
            })
            .await?;

        progress.send_replace(ProgressUpdate {
            progress: final_progress,
            current_item: None,
        });

        info!(
            "Migration {} {}: {} completed, {} failed, {} skipped",
            migration_id,
            final_status,
            final_progress.completed,
            final_progress.failed,
            final_progress.skipped
        );
        Ok(final_progress)
    }

    /// Files and folders are copied through the target's storage connection.
    /// Its absence is not fatal: the copy calls then fall back to the
    /// tenant default.
    async fn resolve_storage_connection(&self, target_space_id: &str) -> Option<String> {
        match self
            .client
            .resolve_file_storage_connection(target_space_id)
            .await
        {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                warn!(
                    "Space {} has no file-storage connection; using tenant default",
                    target_space_id
                );
                None
            }
            Err(err) => {
                warn!(
                    "Could not resolve file-storage connection of space {}: {}",
                    target_space_id, err
                );
                None
            }
        }
    }

    async fn dispatch(
        &self,
        item: &MigrationItem,
        target_space_id: &str,
        storage_connection: Option<&str>,
        name: &str,
    ) -> Result<String, RemoteError> {
        match item.kind {
            ItemKind::Connection => {
                let new_name = (name != item.name).then_some(name);
                self.client
                    .duplicate_connection(&item.source_id, target_space_id, new_name)
                    .await
            }
            ItemKind::Folder => {
                self.client
                    .copy_folder(&item.source_id, storage_connection, name)
                    .await
            }
            ItemKind::File => {
                self.client
                    .copy_file(&item.source_id, storage_connection, name)
                    .await
            }
        }
    }

    /// Move an item to a terminal status and fold it into the migration's
    /// counts. `detail` carries the new name on success or the error on
    /// failure. Returns the updated counts.
    async fn finish_item(
        &self,
        migration_id: &str,
        index: usize,
        status: ItemStatus,
        target_id: Option<String>,
        detail: Option<Result<String, RemoteError>>,
    ) -> Result<MigrationProgress, MigrationError> {
        self.registry
            .update_item(migration_id, index, |m, i| {
                i.status = status;
                i.completed_at = Some(Utc::now());
                i.target_id = target_id;
                match detail {
                    Some(Ok(new_name)) => i.target_name = Some(new_name),
                    Some(Err(err)) => i.error = Some(err.to_string()),
                    None => {}
                }
                m.progress.record(status);
                m.progress
            })
            .await
    }
}
