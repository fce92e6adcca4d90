//! Migration orchestration
//!
//! ```text
//! select items ──► ConflictDetector ──► MigrationRegistry ◄── status polling
//!                                             ▲
//!                  start ──► MigrationEngine ─┘ (one item at a time)
//! ```

pub mod conflict;
pub mod engine;
pub mod model;
pub mod naming;
pub mod registry;
pub mod service;

pub use conflict::{ConflictDetector, DetectedConflicts};
pub use engine::{EngineConfig, MigrationEngine, MigrationRun};
pub use model::*;
pub use naming::CopyNamer;
pub use registry::{MigrationRegistry, MigrationSnapshot};
pub use service::{CreateMigrationRequest, CreatedMigration, MigrationService, MigrationTask};
