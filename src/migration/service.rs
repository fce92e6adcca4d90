//! Caller-facing migration operations
//!
//! `MigrationService` is built once per process and shared by whatever
//! presentation layer drives it. It validates input, runs conflict
//! detection, stores migrations in the registry and spawns the execution
//! engine for each started migration.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::MigrationError;
use crate::remote::{ContentClient, RemoteError, Space};

use super::conflict::{conflicts_in_order, ConflictDetector};
use super::engine::{EngineConfig, MigrationEngine, MigrationRun};
use super::model::{
    CandidateItem, Conflict, ConflictKind, ConflictReason, ConflictResolution, CopyMode,
    ItemConflict, ItemStatus, Migration, MigrationConfig, MigrationItem, MigrationProgress,
    MigrationStatus, ProgressUpdate,
};
use super::naming::CopyNamer;
use super::registry::{MigrationRegistry, MigrationSnapshot};

/// Input of `create_migration`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMigrationRequest {
    pub session_id: String,
    pub source_space_id: String,
    pub target_space_id: String,
    /// Items in processing order
    pub items: Vec<CandidateItem>,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
}

/// Result of `create_migration`
#[derive(Debug, Clone, Serialize)]
pub struct CreatedMigration {
    pub migration: Migration,
    pub items: Vec<MigrationItem>,
    pub conflicts: Vec<Conflict>,
}

pub type MigrationTask = JoinHandle<Result<MigrationProgress, MigrationError>>;

pub struct MigrationService {
    client: Arc<dyn ContentClient>,
    registry: Arc<MigrationRegistry>,
    namer: Arc<CopyNamer>,
    engine_config: EngineConfig,
}

impl MigrationService {
    pub fn new(
        client: Arc<dyn ContentClient>,
        registry: Arc<MigrationRegistry>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            client,
            registry,
            namer: Arc::new(CopyNamer::new()),
            engine_config,
        }
    }

    pub fn registry(&self) -> &Arc<MigrationRegistry> {
        &self.registry
    }

    /// Validate the selection, detect conflicts and register a new migration
    /// in status `created`.
    pub async fn create_migration(
        &self,
        request: CreateMigrationRequest,
    ) -> Result<CreatedMigration, MigrationError> {
        validate_request(&request)?;

        let (source, target) = tokio::try_join!(
            self.resolve_space(&request.source_space_id),
            self.resolve_space(&request.target_space_id),
        )?;

        let detected = ConflictDetector::new(self.client.as_ref())
            .detect(
                &target.id,
                names_of(&request.items, ConflictKind::Connection),
                names_of(&request.items, ConflictKind::File),
            )
            .await?;

        let conflicts = conflicts_in_order(
            &detected,
            request
                .items
                .iter()
                .map(|c| (c.kind.namespace(), c.name.as_str())),
        );

        let migration_id = Uuid::new_v4().to_string();
        let config = MigrationConfig {
            mode: CopyMode::Copy,
            conflict_resolution: request.conflict_resolution,
        };

        let items: Vec<MigrationItem> = request
            .items
            .iter()
            .map(|candidate| MigrationItem {
                id: Uuid::new_v4().to_string(),
                migration_id: migration_id.clone(),
                source_id: candidate.source_id.clone(),
                kind: candidate.kind,
                name: candidate.name.clone(),
                size: candidate.size,
                status: ItemStatus::Pending,
                conflict: detected
                    .contains(candidate.kind.namespace(), &candidate.name)
                    .then_some(ItemConflict {
                        reason: ConflictReason::NameExists,
                        resolution: config.conflict_resolution,
                    }),
                target_id: None,
                target_name: None,
                error: None,
                started_at: None,
                completed_at: None,
            })
            .collect();

        let migration = Migration {
            id: migration_id.clone(),
            session_id: request.session_id.clone(),
            source_space_id: source.id,
            source_space_name: source.name,
            target_space_id: target.id,
            target_space_name: target.name,
            config,
            status: MigrationStatus::Created,
            progress: MigrationProgress::new(items.len() as u32),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        self.registry.put_migration(migration.clone()).await;
        self.registry.put_items(&migration_id, items.clone()).await?;

        info!(
            "Created migration {} with {} item(s), {} conflict(s)",
            migration_id,
            items.len(),
            conflicts.len()
        );

        Ok(CreatedMigration {
            migration,
            items,
            conflicts,
        })
    }

    /// Begin executing a migration in the background.
    ///
    /// Fails with `AlreadyStarted` unless the migration is in `created`.
    /// The returned handle resolves to the final counts once every item has
    /// been processed; callers that only poll status may drop it.
    pub async fn start_migration(&self, migration_id: &str) -> Result<MigrationTask, MigrationError> {
        if migration_id.trim().is_empty() {
            return Err(MigrationError::validation("migration id is required"));
        }

        let (migration, items) = self.registry.begin_run(migration_id).await?;
        let cancel = self
            .registry
            .cancellation_token(migration_id)
            .await
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;
        let progress = self
            .registry
            .progress_sender(migration_id)
            .await
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;

        let engine = MigrationEngine::new(
            self.client.clone(),
            self.registry.clone(),
            self.namer.clone(),
            self.engine_config.clone(),
        );
        let run = MigrationRun {
            migration,
            items,
            cancel,
            progress,
        };

        let id = migration_id.to_string();
        Ok(tokio::spawn(async move {
            let result = engine.run(run).await;
            if let Err(ref e) = result {
                error!("Migration {} aborted: {}", id, e);
            }
            result
        }))
    }

    /// Current migration record, its items and the latest progress update
    pub async fn get_migration_status(
        &self,
        migration_id: &str,
    ) -> Result<MigrationSnapshot, MigrationError> {
        self.registry
            .snapshot(migration_id)
            .await
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))
    }

    /// All migrations of a session, newest first
    pub async fn list_migrations(&self, session_id: &str) -> Vec<Migration> {
        self.registry.list_migrations(session_id).await
    }

    /// Request cancellation. Items not yet dispatched will be skipped.
    ///
    /// Idempotent; a migration that already finished is left untouched.
    pub async fn cancel_migration(&self, migration_id: &str) -> Result<Migration, MigrationError> {
        let token = self
            .registry
            .cancellation_token(migration_id)
            .await
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))?;

        let (migration, accepted) = self
            .registry
            .update_migration(migration_id, |m| {
                let accepted =
                    !m.status.is_terminal() && m.status != MigrationStatus::Cancelled;
                if accepted {
                    m.status = MigrationStatus::Cancelled;
                    m.cancelled_at = Some(Utc::now());
                }
                (m.clone(), accepted)
            })
            .await?;

        if accepted {
            token.cancel();
            info!("Cancellation requested for migration {}", migration_id);
        }
        Ok(migration)
    }

    /// Watch progress updates of a migration
    pub async fn subscribe(
        &self,
        migration_id: &str,
    ) -> Result<watch::Receiver<ProgressUpdate>, MigrationError> {
        self.registry
            .subscribe(migration_id)
            .await
            .ok_or_else(|| MigrationError::migration_not_found(migration_id))
    }

    async fn resolve_space(&self, space_id: &str) -> Result<Space, MigrationError> {
        self.client.get_space(space_id).await.map_err(|e| match e {
            RemoteError::NotFound(_) => MigrationError::NotFound(format!("space {}", space_id)),
            other => MigrationError::Remote(other),
        })
    }
}

fn validate_request(request: &CreateMigrationRequest) -> Result<(), MigrationError> {
    if request.session_id.trim().is_empty() {
        return Err(MigrationError::validation("session id is required"));
    }
    if request.source_space_id.trim().is_empty() {
        return Err(MigrationError::validation("source space id is required"));
    }
    if request.target_space_id.trim().is_empty() {
        return Err(MigrationError::validation("target space id is required"));
    }
    if request.items.is_empty() {
        return Err(MigrationError::validation("at least one item is required"));
    }
    if let Some(bad) = request
        .items
        .iter()
        .find(|c| c.source_id.trim().is_empty() || c.name.is_empty())
    {
        return Err(MigrationError::validation(format!(
            "{} item '{}' is missing its source id or name",
            bad.kind, bad.name
        )));
    }
    Ok(())
}

fn names_of(items: &[CandidateItem], namespace: ConflictKind) -> impl Iterator<Item = &str> {
    items
        .iter()
        .filter(move |c| c.kind.namespace() == namespace)
        .map(|c| c.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{DataConnection, InMemoryContentClient};

    fn service() -> MigrationService {
        let client = InMemoryContentClient::new()
            .with_space(Space::new("S", "Source"))
            .with_space(Space::new("T", "Target"))
            .with_connection(DataConnection::new("c1", "DB1", Some("S")))
            .with_connection(DataConnection::new("t1", "DB1", Some("T")));
        MigrationService::new(
            Arc::new(client),
            Arc::new(MigrationRegistry::new()),
            EngineConfig {
                item_delay: std::time::Duration::ZERO,
            },
        )
    }

    fn request(items: Vec<CandidateItem>) -> CreateMigrationRequest {
        CreateMigrationRequest {
            session_id: "sess".into(),
            source_space_id: "S".into(),
            target_space_id: "T".into(),
            items,
            conflict_resolution: ConflictResolution::Skip,
        }
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let svc = service();
        let err = svc.create_migration(request(vec![])).await.unwrap_err();
        assert!(matches!(err, MigrationError::Validation(_)));

        let mut req = request(vec![CandidateItem::connection("c1", "DB1")]);
        req.target_space_id = " ".into();
        let err = svc.create_migration(req).await.unwrap_err();
        assert!(matches!(err, MigrationError::Validation(_)));

        let err = svc
            .create_migration(request(vec![CandidateItem::connection("", "DB1")]))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Validation(_)));
        assert!(svc.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_space() {
        let svc = service();
        let mut req = request(vec![CandidateItem::connection("c1", "DB1")]);
        req.source_space_id = "missing".into();
        let err = svc.create_migration(req).await.unwrap_err();
        assert_eq!(err, MigrationError::NotFound("space missing".into()));
        assert!(svc.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_annotates_conflicts() {
        let svc = service();
        let created = svc
            .create_migration(request(vec![
                CandidateItem::connection("c1", "DB1"),
                CandidateItem::file("f1", "DB1", 3),
            ]))
            .await
            .unwrap();

        assert_eq!(created.migration.status, MigrationStatus::Created);
        assert_eq!(created.migration.source_space_name, "Source");
        assert_eq!(created.migration.progress.total, 2);
        assert_eq!(created.conflicts.len(), 1);
        assert_eq!(created.conflicts[0].kind, ConflictKind::Connection);
        assert!(created.items[0].skip_on_conflict());
        assert!(created.items[1].conflict.is_none());
        assert_ne!(created.items[0].id, created.items[0].source_id);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let svc = service();
        let created = svc
            .create_migration(request(vec![CandidateItem::connection("c1", "DB1")]))
            .await
            .unwrap();
        let id = created.migration.id;

        let handle = svc.start_migration(&id).await.unwrap();
        let err = svc.start_migration(&id).await.unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyStarted { .. }));
        handle.await.unwrap().unwrap();

        assert!(matches!(
            svc.start_migration("nope").await,
            Err(MigrationError::NotFound(_))
        ));
        assert!(matches!(
            svc.start_migration("").await,
            Err(MigrationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_blocks_start() {
        let svc = service();
        let created = svc
            .create_migration(request(vec![CandidateItem::connection("c1", "DB1")]))
            .await
            .unwrap();
        let id = created.migration.id;

        let first = svc.cancel_migration(&id).await.unwrap();
        assert_eq!(first.status, MigrationStatus::Cancelled);
        let second = svc.cancel_migration(&id).await.unwrap();
        assert_eq!(second.status, MigrationStatus::Cancelled);
        assert_eq!(first.cancelled_at, second.cancelled_at);

        assert!(matches!(
            svc.start_migration(&id).await,
            Err(MigrationError::AlreadyStarted { .. })
        ));
        assert!(matches!(
            svc.cancel_migration("nope").await,
            Err(MigrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_finish_is_noop() {
        let svc = service();
        let created = svc
            .create_migration(request(vec![CandidateItem::connection("c1", "DB1")]))
            .await
            .unwrap();
        let id = created.migration.id;
        svc.start_migration(&id).await.unwrap().await.unwrap().unwrap();

        let after = svc.cancel_migration(&id).await.unwrap();
        assert_eq!(after.status, MigrationStatus::Completed);
        assert!(after.cancelled_at.is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_failure_is_noop() {
        let client = InMemoryContentClient::new()
            .with_space(Space::new("S", "Source"))
            .with_space(Space::new("T", "Target"))
            .with_connection(DataConnection::new("c2", "DB2", Some("S")));
        client.fail_on("c2", RemoteError::Timeout).await;
        let svc = MigrationService::new(
            Arc::new(client),
            Arc::new(MigrationRegistry::new()),
            EngineConfig {
                item_delay: std::time::Duration::ZERO,
            },
        );
        let created = svc
            .create_migration(request(vec![CandidateItem::connection("c2", "DB2")]))
            .await
            .unwrap();
        let id = created.migration.id;
        svc.start_migration(&id).await.unwrap().await.unwrap().unwrap();

        let after = svc.cancel_migration(&id).await.unwrap();
        assert_eq!(after.status, MigrationStatus::Failed);
        assert!(after.cancelled_at.is_none());
    }

    #[tokio::test]
    async fn test_status_of_unknown_migration() {
        let svc = service();
        assert!(matches!(
            svc.get_migration_status("nope").await,
            Err(MigrationError::NotFound(_))
        ));
        assert!(svc.subscribe("nope").await.is_err());
    }
}
