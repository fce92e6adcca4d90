//! Migration Registry - process-scoped record of migrations
//!
//! Maps migration id -> Migration and migration id -> ordered items. Each
//! entry also owns the run's progress channel and cancellation token.
//! There is no eviction and no persistence; the registry lives as long as
//! the process. All state sits behind a single lock so every read returns a
//! consistent snapshot of a migration and its items.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::MigrationError;

use super::model::{Migration, MigrationItem, MigrationStatus, ProgressUpdate};

struct Entry {
    migration: Migration,
    items: Vec<MigrationItem>,
    progress: Arc<watch::Sender<ProgressUpdate>>,
    cancel: CancellationToken,
    /// Insertion order, breaks created_at ties when listing
    seq: u64,
}

/// Consistent view of one migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSnapshot {
    pub migration: Migration,
    pub items: Vec<MigrationItem>,
    pub latest: ProgressUpdate,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

/// In-memory migration store shared by the service and running engines
#[derive(Default)]
pub struct MigrationRegistry {
    inner: RwLock<Inner>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a migration, or replace the record of an existing one.
    /// A new entry starts with no items, a fresh progress channel and an
    /// untripped cancellation token.
    pub async fn put_migration(&self, migration: Migration) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get_mut(&migration.id) {
            entry.migration = migration;
            return;
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        let (tx, _rx) = watch::channel(ProgressUpdate {
            progress: migration.progress,
            current_item: None,
        });
        info!(
            "Registered migration {} ({} -> {})",
            migration.id, migration.source_space_name, migration.target_space_name
        );
        inner.entries.insert(
            migration.id.clone(),
            Entry {
                migration,
                items: Vec::new(),
                progress: Arc::new(tx),
                cancel: CancellationToken::new(),
                seq,
            },
        );
    }

    /// Replace the ordered item list of a migration
    pub async fn put_items(
        &self,
        migration_id: &str,
        items: Vec<MigrationItem>,
    ) -> Result<(), MigrationError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .get_mut(migration_id)
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;
        entry.items = items;
        Ok(())
    }

    pub async fn get_migration(&self, migration_id: &str) -> Option<Migration> {
        let inner = self.inner.read().await;
        inner.entries.get(migration_id).map(|e| e.migration.clone())
    }

    pub async fn get_items(&self, migration_id: &str) -> Option<Vec<MigrationItem>> {
        let inner = self.inner.read().await;
        inner.entries.get(migration_id).map(|e| e.items.clone())
    }

    pub async fn snapshot(&self, migration_id: &str) -> Option<MigrationSnapshot> {
        let inner = self.inner.read().await;
        inner.entries.get(migration_id).map(|e| MigrationSnapshot {
            migration: e.migration.clone(),
            items: e.items.clone(),
            latest: e.progress.borrow().clone(),
        })
    }

    /// Migrations created by `session_id`, newest first
    pub async fn list_migrations(&self, session_id: &str) -> Vec<Migration> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| e.migration.session_id == session_id)
            .collect();
        entries.sort_by(|a, b| {
            b.migration
                .created_at
                .cmp(&a.migration.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries.into_iter().map(|e| e.migration.clone()).collect()
    }

    /// Mutate a migration record in place
    pub async fn update_migration<R>(
        &self,
        migration_id: &str,
        f: impl FnOnce(&mut Migration) -> R,
    ) -> Result<R, MigrationError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .get_mut(migration_id)
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;
        Ok(f(&mut entry.migration))
    }

    /// Mutate one item (by position) and its migration under a single lock
    pub async fn update_item<R>(
        &self,
        migration_id: &str,
        index: usize,
        f: impl FnOnce(&mut Migration, &mut MigrationItem) -> R,
    ) -> Result<R, MigrationError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .get_mut(migration_id)
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;
        let Entry {
            migration, items, ..
        } = entry;
        let item = items.get_mut(index).ok_or_else(|| {
            MigrationError::NotFound(format!("item #{} of migration {}", index, migration_id))
        })?;
        Ok(f(migration, item))
    }

    /// Move a migration from `created` to `running`, returning the run's
    /// inputs. Fails if the migration is unknown or in any other status, so
    /// two concurrent starts cannot both succeed.
    pub async fn begin_run(
        &self,
        migration_id: &str,
    ) -> Result<(Migration, Vec<MigrationItem>), MigrationError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .get_mut(migration_id)
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;

        if entry.migration.status != MigrationStatus::Created {
            return Err(MigrationError::AlreadyStarted {
                id: migration_id.to_string(),
                status: entry.migration.status.to_string(),
            });
        }

        entry.migration.status = MigrationStatus::Running;
        entry.migration.started_at = Some(chrono::Utc::now());
        Ok((entry.migration.clone(), entry.items.clone()))
    }

    /// Progress channel of a migration, for the engine to publish into
    pub async fn progress_sender(
        &self,
        migration_id: &str,
    ) -> Option<Arc<watch::Sender<ProgressUpdate>>> {
        let inner = self.inner.read().await;
        inner.entries.get(migration_id).map(|e| e.progress.clone())
    }

    /// Watch the latest progress of a migration
    pub async fn subscribe(&self, migration_id: &str) -> Option<watch::Receiver<ProgressUpdate>> {
        let inner = self.inner.read().await;
        inner.entries.get(migration_id).map(|e| e.progress.subscribe())
    }

    pub async fn cancellation_token(&self, migration_id: &str) -> Option<CancellationToken> {
        let inner = self.inner.read().await;
        inner.entries.get(migration_id).map(|e| e.cancel.clone())
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::model::{ItemKind, ItemStatus, MigrationConfig, MigrationProgress};
    use chrono::{Duration, Utc};

    fn migration(id: &str, session: &str, age_secs: i64) -> Migration {
        Migration {
            id: id.to_string(),
            session_id: session.to_string(),
            source_space_id: "S".into(),
            source_space_name: "Source".into(),
            target_space_id: "T".into(),
            target_space_name: "Target".into(),
            config: MigrationConfig::default(),
            status: MigrationStatus::Created,
            progress: MigrationProgress::new(1),
            created_at: Utc::now() - Duration::seconds(age_secs),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    fn item(migration_id: &str) -> MigrationItem {
        MigrationItem {
            id: "i1".into(),
            migration_id: migration_id.into(),
            source_id: "c1".into(),
            kind: ItemKind::Connection,
            name: "DB1".into(),
            size: 0,
            status: ItemStatus::Pending,
            conflict: None,
            target_id: None,
            target_name: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let registry = MigrationRegistry::new();
        assert!(registry.is_empty().await);
        registry.put_migration(migration("m1", "s1", 0)).await;
        registry.put_items("m1", vec![item("m1")]).await.unwrap();

        assert_eq!(registry.get_migration("m1").await.unwrap().id, "m1");
        assert_eq!(registry.get_items("m1").await.unwrap().len(), 1);
        assert!(registry.get_migration("nope").await.is_none());
        assert!(matches!(
            registry.put_items("nope", vec![]).await,
            Err(MigrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_session_newest_first() {
        let registry = MigrationRegistry::new();
        registry.put_migration(migration("old", "s1", 60)).await;
        registry.put_migration(migration("new", "s1", 0)).await;
        registry.put_migration(migration("other", "s2", 0)).await;

        let ids: Vec<String> = registry
            .list_migrations("s1")
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(registry.list_migrations("s3").await.is_empty());
    }

    #[tokio::test]
    async fn test_begin_run_only_once() {
        let registry = MigrationRegistry::new();
        registry.put_migration(migration("m1", "s1", 0)).await;
        registry.put_items("m1", vec![item("m1")]).await.unwrap();

        let (running, items) = registry.begin_run("m1").await.unwrap();
        assert_eq!(running.status, MigrationStatus::Running);
        assert!(running.started_at.is_some());
        assert_eq!(items.len(), 1);

        assert!(matches!(
            registry.begin_run("m1").await,
            Err(MigrationError::AlreadyStarted { .. })
        ));
        assert!(matches!(
            registry.begin_run("nope").await,
            Err(MigrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_item_sees_migration() {
        let registry = MigrationRegistry::new();
        registry.put_migration(migration("m1", "s1", 0)).await;
        registry.put_items("m1", vec![item("m1")]).await.unwrap();

        registry
            .update_item("m1", 0, |m, i| {
                i.status = ItemStatus::Completed;
                m.progress.record(i.status);
            })
            .await
            .unwrap();

        let snap = registry.snapshot("m1").await.unwrap();
        assert_eq!(snap.items[0].status, ItemStatus::Completed);
        assert_eq!(snap.migration.progress.completed, 1);
        assert!(registry.update_item("m1", 5, |_, _| ()).await.is_err());
    }

    #[tokio::test]
    async fn test_replacing_record_keeps_channel() {
        let registry = MigrationRegistry::new();
        registry.put_migration(migration("m1", "s1", 0)).await;
        let mut rx = registry.subscribe("m1").await.unwrap();

        let mut updated = migration("m1", "s1", 0);
        updated.status = MigrationStatus::Cancelled;
        registry.put_migration(updated).await;

        registry
            .progress_sender("m1")
            .await
            .unwrap()
            .send_replace(ProgressUpdate {
                progress: MigrationProgress::new(1),
                current_item: Some("DB1".into()),
            });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().current_item.as_deref(), Some("DB1"));
        assert_eq!(
            registry.get_migration("m1").await.unwrap().status,
            MigrationStatus::Cancelled
        );
    }
}
