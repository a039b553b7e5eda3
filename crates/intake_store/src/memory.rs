//! In-memory backend implementing every store trait.

use crate::error::{Result, StorageError};
use crate::traits::{
    AssignmentStore, DocumentStore, MergeFn, MergeOutcome, SchemaRepository, SubjectDirectory,
};
use crate::types::{Assignment, ResponseDocument};
use chrono::Utc;
use intake_ids::{DocumentId, SchemaId, SubjectRef};
use intake_schema::{FormSchema, ResultMap};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

type PairKey = (SubjectRef, SchemaId);

#[derive(Debug, Default)]
struct MemoryState {
    subjects: HashSet<SubjectRef>,
    schemas: HashMap<SchemaId, FormSchema>,
    documents: HashMap<PairKey, ResponseDocument>,
    assignments: HashMap<PairKey, Assignment>,
}

/// A store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn key(subject: &SubjectRef, schema_id: &SchemaId) -> PairKey {
    (subject.clone(), schema_id.clone())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Make a subject known to [`SubjectDirectory::resolve`].
    pub fn register_subject(&self, subject: &SubjectRef) -> Result<()> {
        self.state()?.subjects.insert(subject.clone());
        Ok(())
    }
}

impl SubjectDirectory for MemoryStore {
    fn resolve(&self, subject: &SubjectRef) -> Result<bool> {
        Ok(self.state()?.subjects.contains(subject))
    }
}

impl SchemaRepository for MemoryStore {
    fn get_schema(&self, id: &SchemaId) -> Result<Option<FormSchema>> {
        Ok(self.state()?.schemas.get(id).cloned())
    }

    fn save_schema(&self, schema: &FormSchema) -> Result<()> {
        self.state()?.schemas.insert(schema.id().clone(), schema.clone());
        Ok(())
    }

    fn list_schemas(&self) -> Result<Vec<FormSchema>> {
        let mut schemas: Vec<FormSchema> = self.state()?.schemas.values().cloned().collect();
        schemas.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(schemas)
    }
}

impl DocumentStore for MemoryStore {
    fn get_or_create(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<ResponseDocument> {
        let mut state = self.state()?;
        let doc = state
            .documents
            .entry(key(subject, schema_id))
            .or_insert_with(|| ResponseDocument::new(subject.clone(), schema_id.clone()));
        Ok(doc.clone())
    }

    fn load(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<ResponseDocument>> {
        Ok(self.state()?.documents.get(&key(subject, schema_id)).cloned())
    }

    fn update_result(&self, id: &DocumentId, result: &ResultMap) -> Result<ResponseDocument> {
        let mut state = self.state()?;
        let doc = state
            .documents
            .values_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| StorageError::not_found(format!("document {}", id)))?;
        doc.result = result.clone();
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    fn update_with(
        &self,
        subject: &SubjectRef,
        schema_id: &SchemaId,
        merge: &mut MergeFn<'_>,
    ) -> Result<MergeOutcome> {
        let mut state = self.state()?;
        let doc = state
            .documents
            .entry(key(subject, schema_id))
            .or_insert_with(|| ResponseDocument::new(subject.clone(), schema_id.clone()));
        match merge(&doc.result) {
            Ok(merged) => {
                doc.result = merged;
                doc.updated_at = Utc::now();
                Ok(MergeOutcome::Merged(doc.clone()))
            }
            Err(errors) => Ok(MergeOutcome::Rejected(errors)),
        }
    }
}

impl AssignmentStore for MemoryStore {
    fn get_or_create_assignment(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Assignment> {
        let mut state = self.state()?;
        let assignment = state
            .assignments
            .entry(key(subject, schema_id))
            .or_insert_with(|| Assignment::new(subject.clone(), schema_id.clone()));
        Ok(assignment.clone())
    }

    fn load_assignment(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<Assignment>> {
        Ok(self.state()?.assignments.get(&key(subject, schema_id)).cloned())
    }

    fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.state()?
            .assignments
            .insert(key(&assignment.subject, &assignment.schema_id), assignment.clone());
        Ok(())
    }
}
