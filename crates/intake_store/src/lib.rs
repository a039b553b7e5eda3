//! Storage for Intake.
//!
//! The submission service talks to four collaborator traits
//! ([`SubjectDirectory`], [`SchemaRepository`], [`DocumentStore`],
//! [`AssignmentStore`]). Two backends implement all of them: [`MemoryStore`]
//! for tests and embedding, and [`SqliteStore`] for on-disk use.

pub mod error;
pub mod lock;
pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use error::{Result, StorageError};
pub use lock::PairLocks;
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SCHEMA_VERSION};
pub use traits::{
    AssignmentStore, DocumentStore, MergeFn, MergeOutcome, SchemaRepository, SubjectDirectory,
};
pub use types::{Assignment, AssignmentStatus, ResponseDocument};
