//! Records owned by a (subject, schema) pair.

use chrono::{DateTime, Utc};
use intake_ids::{AssignmentId, DocumentId, SchemaId, SubjectRef};
use intake_schema::ResultMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The accumulated answers of one subject for one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    pub id: DocumentId,
    pub subject: SubjectRef,
    pub schema_id: SchemaId,
    pub result: ResultMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResponseDocument {
    pub fn new(subject: SubjectRef, schema_id: SchemaId) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            subject,
            schema_id,
            result: ResultMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    Completed,
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStatus::Pending => write!(f, "PENDING"),
            AssignmentStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Binds a subject to a schema and tracks completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub subject: SubjectRef,
    pub schema_id: SchemaId,
    pub active: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    /// A new, active, pending assignment.
    pub fn new(subject: SubjectRef, schema_id: SchemaId) -> Self {
        let now = Utc::now();
        Self {
            id: AssignmentId::new(),
            subject,
            schema_id,
            active: true,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> AssignmentStatus {
        if self.completed_at.is_some() {
            AssignmentStatus::Completed
        } else {
            AssignmentStatus::Pending
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}
