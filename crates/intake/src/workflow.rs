//! Assignment lifecycle: `PENDING` until the last page is accepted, then
//! `COMPLETED`.

use chrono::{DateTime, Utc};
use intake_ids::{SchemaId, SubjectRef};
use intake_store::{Assignment, AssignmentStore, Result};
use std::sync::Arc;
use tracing::info;

/// Mark `assignment` completed now.
pub fn finalize(assignment: &Assignment) -> Assignment {
    finalize_at(assignment, Utc::now())
}

/// Mark `assignment` completed at `now`.
///
/// Re-finalizing moves `completed_at` forward but never back, even if the
/// clock did.
pub fn finalize_at(assignment: &Assignment, now: DateTime<Utc>) -> Assignment {
    let completed_at = match assignment.completed_at {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    Assignment {
        completed_at: Some(completed_at),
        updated_at: completed_at.max(assignment.updated_at),
        ..assignment.clone()
    }
}

/// Creates and completes assignments against an [`AssignmentStore`].
#[derive(Clone)]
pub struct AssignmentWorkflow {
    store: Arc<dyn AssignmentStore>,
}

impl AssignmentWorkflow {
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        Self { store }
    }

    /// The pair's assignment, created active and pending if missing.
    pub fn assign(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Assignment> {
        let assignment = self.store.get_or_create_assignment(subject, schema_id)?;
        info!(
            assignment_id = %assignment.id,
            subject = %subject,
            schema_id = %schema_id,
            status = %assignment.status(),
            "Assignment ready"
        );
        Ok(assignment)
    }

    /// The pair's assignment, if one exists. Never creates one.
    pub fn current(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Option<Assignment>> {
        self.store.load_assignment(subject, schema_id)
    }

    /// Finalize and persist the pair's assignment.
    pub fn complete(&self, subject: &SubjectRef, schema_id: &SchemaId) -> Result<Assignment> {
        let current = self.store.get_or_create_assignment(subject, schema_id)?;
        let completed = finalize(&current);
        self.store.save_assignment(&completed)?;
        info!(
            assignment_id = %completed.id,
            subject = %subject,
            schema_id = %schema_id,
            refinalized = current.is_completed(),
            "Assignment completed"
        );
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use intake_store::{AssignmentStatus, MemoryStore};

    fn pending() -> Assignment {
        Assignment::new(SubjectRef::parse("donor-1").unwrap(), SchemaId::new())
    }

    #[test]
    fn test_finalize_marks_completed() {
        let a = pending();
        let done = finalize(&a);
        assert_eq!(done.status(), AssignmentStatus::Completed);
        assert_eq!(done.id, a.id);
        assert!(done.active);
    }

    #[test]
    fn test_refinalize_moves_forward() {
        let t0 = Utc::now();
        let first = finalize_at(&pending(), t0);
        let second = finalize_at(&first, t0 + Duration::seconds(5));
        assert_eq!(second.completed_at, Some(t0 + Duration::seconds(5)));
    }

    #[test]
    fn test_refinalize_never_moves_back() {
        let t0 = Utc::now();
        let first = finalize_at(&pending(), t0);
        let skewed = finalize_at(&first, t0 - Duration::hours(1));
        assert_eq!(skewed.completed_at, Some(t0));
    }

    #[test]
    fn test_workflow_persists_completion() {
        let store = Arc::new(MemoryStore::new());
        let workflow = AssignmentWorkflow::new(store.clone());
        let subject = SubjectRef::parse("donor-1").unwrap();
        let schema = SchemaId::new();

        let assigned = workflow.assign(&subject, &schema).unwrap();
        assert!(!assigned.is_completed());

        let done = workflow.complete(&subject, &schema).unwrap();
        assert_eq!(done.id, assigned.id);
        let stored = store.load_assignment(&subject, &schema).unwrap().unwrap();
        assert_eq!(stored.completed_at, done.completed_at);
    }
}
