// Space Migrator - copy data connections, files and folders between spaces
// of an analytics cloud tenant, with conflict detection and live progress

pub mod config;
pub mod error;
pub mod logging;
pub mod migration;
pub mod remote;

pub use error::MigrationError;
pub use migration::{
    CandidateItem, CreateMigrationRequest, CreatedMigration, Migration, MigrationItem,
    MigrationProgress, MigrationRegistry, MigrationService, MigrationStatus, ProgressUpdate,
};
pub use remote::{CloudContentClient, ContentClient, InMemoryContentClient, RemoteError};
