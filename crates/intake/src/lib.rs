//! Intake: paginated, schema-driven data collection.
//!
//! Schemas and validation live in `intake_schema`, persistence in
//! `intake_store`. This crate slices schemas into pages, runs page
//! submissions against a subject's response document and completes the
//! subject's assignment once the last page is accepted.

pub mod config;
pub mod pagination;
pub mod submission;
pub mod workflow;

pub use config::{ConfigError, IntakeConfig, DEFAULT_PAGE_SIZE};
pub use pagination::{
    build_page_schema, initial_values, initial_values_for_page, total_pages, InitialValues, Page, PageError,
};
pub use submission::{InactiveTarget, PageView, SubmissionError, SubmissionService, SubmitOutcome};
pub use workflow::{finalize, finalize_at, AssignmentWorkflow};
