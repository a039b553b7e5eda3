//! Page-by-page submission against stored documents.
//!
//! The service owns no data. It resolves the subject and schema through the
//! collaborator traits, validates one page at a time and merges accepted
//! pages into the pair's single response document. Work on one
//! (subject, schema) pair is serialized; distinct pairs run in parallel.

use crate::pagination::{build_page_schema, initial_values_for_page, InitialValues, PageError};
use crate::workflow::AssignmentWorkflow;
use chrono::{DateTime, Utc};
use intake_ids::{SchemaId, SubjectRef};
use intake_schema::{validate, FieldErrors, FormSchema, SchemaField, SubmittedMap};
use intake_store::{
    Assignment, AssignmentStore, DocumentStore, MergeOutcome, PairLocks, ResponseDocument, SchemaRepository,
    StorageError, SubjectDirectory,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What was found inactive when opening a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveTarget {
    Schema,
    Assignment,
}

impl fmt::Display for InactiveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InactiveTarget::Schema => write!(f, "schema"),
            InactiveTarget::Assignment => write!(f, "assignment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(SchemaId),

    #[error("Unknown subject: {0}")]
    UnknownSubject(SubjectRef),

    #[error("The {0} is inactive")]
    Inactive(InactiveTarget),

    #[error(transparent)]
    Page(#[from] PageError),

    /// The page was rejected; the stored document is unchanged.
    #[error("Submission rejected: {0}")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SubmissionError>;

/// A page ready to be shown.
#[derive(Debug, Clone)]
pub struct PageView {
    pub schema_id: SchemaId,
    pub schema_name: String,
    pub number: usize,
    pub total_pages: usize,
    pub fields: Vec<SchemaField>,
    pub initial: InitialValues,
    pub assignment: Assignment,
}

/// Result of an accepted page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Advance { next_page: usize },
    Completed { completed_at: DateTime<Utc> },
}

pub struct SubmissionService {
    subjects: Arc<dyn SubjectDirectory>,
    schemas: Arc<dyn SchemaRepository>,
    documents: Arc<dyn DocumentStore>,
    workflow: AssignmentWorkflow,
    locks: PairLocks,
    page_size: usize,
}

impl SubmissionService {
    pub fn new(
        subjects: Arc<dyn SubjectDirectory>,
        schemas: Arc<dyn SchemaRepository>,
        documents: Arc<dyn DocumentStore>,
        assignments: Arc<dyn AssignmentStore>,
        page_size: usize,
    ) -> std::result::Result<Self, PageError> {
        if page_size == 0 {
            return Err(PageError::ZeroPageSize);
        }
        Ok(Self {
            subjects,
            schemas,
            documents,
            workflow: AssignmentWorkflow::new(assignments),
            locks: PairLocks::new(),
            page_size,
        })
    }

    /// Build a service whose collaborators are all one store.
    pub fn with_store<S>(store: Arc<S>, page_size: usize) -> std::result::Result<Self, PageError>
    where
        S: SubjectDirectory + SchemaRepository + DocumentStore + AssignmentStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store, page_size)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn workflow(&self) -> &AssignmentWorkflow {
        &self.workflow
    }

    fn resolve_subject(&self, subject: &SubjectRef) -> Result<()> {
        if self.subjects.resolve(subject)? {
            Ok(())
        } else {
            Err(SubmissionError::UnknownSubject(subject.clone()))
        }
    }

    fn load_schema(&self, schema_id: &SchemaId) -> Result<FormSchema> {
        self.schemas
            .get_schema(schema_id)?
            .ok_or_else(|| SubmissionError::SchemaNotFound(schema_id.clone()))
    }

    /// Starting a form (page 1) requires an active schema and, when one
    /// exists, an active assignment. Nothing is written on refusal.
    fn ensure_can_start(&self, schema: &FormSchema, subject: &SubjectRef, page: usize) -> Result<()> {
        if page != 1 {
            return Ok(());
        }
        if !schema.is_active() {
            return Err(SubmissionError::Inactive(InactiveTarget::Schema));
        }
        match self.workflow.current(subject, schema.id())? {
            Some(assignment) if !assignment.active => Err(SubmissionError::Inactive(InactiveTarget::Assignment)),
            _ => Ok(()),
        }
    }

    /// Open `page` for `subject`, with the values already on file.
    ///
    /// Page 1 is refused on an inactive schema or assignment. Later pages and
    /// revisits are not checked.
    pub fn open_page(&self, subject: &SubjectRef, schema_id: &SchemaId, page: usize) -> Result<PageView> {
        self.resolve_subject(subject)?;
        let schema = self.load_schema(schema_id)?;
        let slice = build_page_schema(&schema, page, self.page_size)?;
        self.ensure_can_start(&schema, subject, page)?;

        let assignment = self.workflow.assign(subject, schema_id)?;
        let document = self.documents.get_or_create(subject, schema_id)?;
        let initial = initial_values_for_page(&document, slice.fields);
        debug!(
            subject = %subject,
            schema_id = %schema_id,
            page,
            total_pages = slice.total_pages,
            prefilled = initial.len(),
            "Opened page"
        );

        Ok(PageView {
            schema_id: schema_id.clone(),
            schema_name: schema.name().to_string(),
            number: slice.number,
            total_pages: slice.total_pages,
            fields: slice.fields.to_vec(),
            initial,
            assignment,
        })
    }

    /// Validate `submitted` against `page` and merge it into the document.
    ///
    /// Accepting the last page completes the assignment. A rejected page
    /// leaves the document untouched. Page 1 is held to the same activity
    /// checks as [`open_page`](Self::open_page).
    pub fn submit_page(
        &self,
        subject: &SubjectRef,
        schema_id: &SchemaId,
        page: usize,
        submitted: &SubmittedMap,
    ) -> Result<SubmitOutcome> {
        self.resolve_subject(subject)?;
        let schema = self.load_schema(schema_id)?;
        let slice = build_page_schema(&schema, page, self.page_size)?;

        self.locks.with_lock(subject, schema_id, || -> Result<SubmitOutcome> {
            self.ensure_can_start(&schema, subject, page)?;
            let outcome = self
                .documents
                .update_with(subject, schema_id, &mut |current| validate(slice.fields, submitted, current))?;

            let document: ResponseDocument = match outcome {
                MergeOutcome::Merged(document) => document,
                MergeOutcome::Rejected(errors) => {
                    warn!(
                        subject = %subject,
                        schema_id = %schema_id,
                        page,
                        errors = errors.len(),
                        "Submission rejected"
                    );
                    return Err(SubmissionError::Invalid(errors));
                }
            };
            info!(
                document_id = %document.id,
                subject = %subject,
                schema_id = %schema_id,
                page,
                keys = submitted.len(),
                "Merged page into document"
            );

            match slice.next_page() {
                Some(next_page) => Ok(SubmitOutcome::Advance { next_page }),
                None => {
                    let assignment = self.workflow.complete(subject, schema_id)?;
                    let completed_at = assignment.completed_at.unwrap_or_else(Utc::now);
                    Ok(SubmitOutcome::Completed { completed_at })
                }
            }
        })
    }

    /// The pair's document, if one was started.
    pub fn document(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<ResponseDocument>> {
        Ok(self.documents.load(subject, schema_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_schema::{FieldDefinition, FieldError, FieldType, FieldValue};
    use intake_store::MemoryStore;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: SubmissionService,
        subject: SubjectRef,
        schema_id: SchemaId,
    }

    fn fixture(page_size: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let subject = SubjectRef::parse("donor-1").unwrap();
        store.register_subject(&subject).unwrap();

        let fields = vec![
            FieldDefinition::new("age", "Age", FieldType::Integer).required().compile().unwrap(),
            FieldDefinition::new("dob", "Date of birth", FieldType::Date).compile().unwrap(),
            FieldDefinition::new("sex", "Sex", FieldType::Choice)
                .with_choices(["male", "female"])
                .compile()
                .unwrap(),
        ];
        let schema = FormSchema::new(SchemaId::new(), "Screening", fields).unwrap();
        let schema_id = schema.id().clone();
        store.save_schema(&schema).unwrap();

        let service = SubmissionService::with_store(store.clone(), page_size).unwrap();
        Fixture {
            store,
            service,
            subject,
            schema_id,
        }
    }

    fn submission(pairs: &[(&str, FieldValue)]) -> SubmittedMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            SubmissionService::with_store(store, 0),
            Err(PageError::ZeroPageSize)
        ));
    }

    #[test]
    fn test_walk_pages_to_completion() {
        let fx = fixture(2);

        let first = fx.service.open_page(&fx.subject, &fx.schema_id, 1).unwrap();
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.fields.len(), 2);
        assert!(first.initial.is_empty());

        let outcome = fx
            .service
            .submit_page(
                &fx.subject,
                &fx.schema_id,
                1,
                &submission(&[("age", "42".into()), ("dob", "2024-01-01".into())]),
            )
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Advance { next_page: 2 });

        let outcome = fx
            .service
            .submit_page(&fx.subject, &fx.schema_id, 2, &submission(&[("sex", "male".into())]))
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Completed { .. }));

        let doc = fx.service.document(&fx.subject, &fx.schema_id).unwrap().unwrap();
        assert_eq!(doc.result["age"], json!(42));
        assert_eq!(doc.result["dob"], json!("2024-01-01"));
        assert_eq!(doc.result["sex"], json!("male"));

        let assignment = fx.store.load_assignment(&fx.subject, &fx.schema_id).unwrap().unwrap();
        assert!(assignment.is_completed());
    }

    #[test]
    fn test_revisit_shows_stored_values() {
        let fx = fixture(2);
        fx.service
            .submit_page(
                &fx.subject,
                &fx.schema_id,
                1,
                &submission(&[("age", "42".into()), ("dob", "2024-01-01".into())]),
            )
            .unwrap();

        let page = fx.service.open_page(&fx.subject, &fx.schema_id, 1).unwrap();
        assert_eq!(page.initial["age"], FieldValue::Integer(42));
        assert_eq!(page.initial["dob"].to_string(), "2024-01-01");
    }

    #[test]
    fn test_rejected_page_leaves_document() {
        let fx = fixture(3);
        let err = fx
            .service
            .submit_page(
                &fx.subject,
                &fx.schema_id,
                1,
                &submission(&[("age", "x".into()), ("sex", "other".into())]),
            )
            .unwrap_err();
        match err {
            SubmissionError::Invalid(errors) => {
                assert!(errors.contains("age", &FieldError::InvalidType(FieldType::Integer)));
                assert!(errors.contains("sex", &FieldError::InvalidChoice));
            }
            other => panic!("unexpected error: {}", other),
        }
        let doc = fx.service.document(&fx.subject, &fx.schema_id).unwrap().unwrap();
        assert!(doc.result.is_empty());
    }

    #[test]
    fn test_unknown_subject_and_schema() {
        let fx = fixture(2);
        let stranger = SubjectRef::parse("nobody").unwrap();
        assert!(matches!(
            fx.service.open_page(&stranger, &fx.schema_id, 1),
            Err(SubmissionError::UnknownSubject(_))
        ));
        assert!(matches!(
            fx.service.open_page(&fx.subject, &SchemaId::new(), 1),
            Err(SubmissionError::SchemaNotFound(_))
        ));
        assert!(matches!(
            fx.service.open_page(&fx.subject, &fx.schema_id, 9),
            Err(SubmissionError::Page(PageError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_inactive_blocks_only_first_page() {
        let fx = fixture(2);
        let schema = fx.store.get_schema(&fx.schema_id).unwrap().unwrap().with_active(false);
        fx.store.save_schema(&schema).unwrap();

        assert!(matches!(
            fx.service.open_page(&fx.subject, &fx.schema_id, 1),
            Err(SubmissionError::Inactive(InactiveTarget::Schema))
        ));
        assert!(fx.store.load_assignment(&fx.subject, &fx.schema_id).unwrap().is_none());
        assert!(fx.service.open_page(&fx.subject, &fx.schema_id, 2).is_ok());
    }

    #[test]
    fn test_inactive_schema_refuses_first_page_submit() {
        let fx = fixture(5);
        let schema = fx.store.get_schema(&fx.schema_id).unwrap().unwrap().with_active(false);
        fx.store.save_schema(&schema).unwrap();

        let err = fx
            .service
            .submit_page(&fx.subject, &fx.schema_id, 1, &submission(&[("age", "5".into())]))
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Inactive(InactiveTarget::Schema)));
        assert!(fx.service.document(&fx.subject, &fx.schema_id).unwrap().is_none());
        assert!(fx.store.load_assignment(&fx.subject, &fx.schema_id).unwrap().is_none());
    }

    #[test]
    fn test_inactive_assignment_blocks_start() {
        let fx = fixture(2);
        let mut assignment = fx.service.workflow().assign(&fx.subject, &fx.schema_id).unwrap();
        assignment.active = false;
        fx.store.save_assignment(&assignment).unwrap();

        assert!(matches!(
            fx.service.open_page(&fx.subject, &fx.schema_id, 1),
            Err(SubmissionError::Inactive(InactiveTarget::Assignment))
        ));
        assert!(matches!(
            fx.service
                .submit_page(&fx.subject, &fx.schema_id, 1, &submission(&[("age", "5".into())])),
            Err(SubmissionError::Inactive(InactiveTarget::Assignment))
        ));
        let stored = fx.store.load_assignment(&fx.subject, &fx.schema_id).unwrap().unwrap();
        assert!(!stored.is_completed());
    }
}
