//! Collaborator traits consumed by the submission service.
//!
//! All operations are synchronous. Implementations must be shareable across
//! threads.

use crate::error::Result;
use crate::types::{Assignment, ResponseDocument};
use intake_ids::{DocumentId, SchemaId, SubjectRef};
use intake_schema::{FieldErrors, FormSchema, ResultMap};

/// Resolves subject references to known subjects.
pub trait SubjectDirectory: Send + Sync {
    fn resolve(&self, subject: &SubjectRef) -> Result<bool>;
}

/// Source of compiled form schemas.
pub trait SchemaRepository: Send + Sync {
    fn get_schema(&self, id: &SchemaId) -> Result<Option<FormSchema>>;
    fn save_schema(&self, schema: &FormSchema) -> Result<()>;
    fn list_schemas(&self) -> Result<Vec<FormSchema>>;
}

/// Merge callback for [`DocumentStore::update_with`]: current result map in,
/// merged map or validation errors out.
pub type MergeFn<'a> = dyn FnMut(&ResultMap) -> std::result::Result<ResultMap, FieldErrors> + 'a;

/// What [`DocumentStore::update_with`] did.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// The merged map was written.
    Merged(ResponseDocument),
    /// The callback rejected the submission; the stored map is unchanged.
    Rejected(FieldErrors),
}

/// Response documents, one per (subject, schema) pair.
pub trait DocumentStore: Send + Sync {
    /// Load the pair's document, creating an empty one if none exists.
    fn get_or_create(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<ResponseDocument>;

    fn load(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<ResponseDocument>>;

    /// Replace the result map of an existing document.
    fn update_result(&self, id: &DocumentId, result: &ResultMap) -> Result<ResponseDocument>;

    /// Read-modify-write of the pair's document as one atomic step.
    fn update_with(
        &self,
        subject: &SubjectRef,
        schema_id: &SchemaId,
        merge: &mut MergeFn<'_>,
    ) -> Result<MergeOutcome>;
}

/// Assignments, one per (subject, schema) pair.
pub trait AssignmentStore: Send + Sync {
    fn get_or_create_assignment(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Assignment>;

    fn load_assignment(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<Assignment>>;

    fn save_assignment(&self, assignment: &Assignment) -> Result<()>;
}
