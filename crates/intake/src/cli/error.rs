//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use intake::SubmissionError;
use intake_schema::FieldErrors;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// File does not exist
    pub fn file_not_found(path: &Path) -> Self {
        Self::new(format!("File not found: {}", path.display()))
            .with_context("The specified file does not exist")
            .with_suggestions([
                format!("TRY: Check if the file exists: ls -la {}", path.display()),
                format!(
                    "TRY: Look for similar files: ls {}",
                    path.parent().map(|p| p.display().to_string()).unwrap_or_else(|| ".".to_string())
                ),
            ])
    }

    /// Schema definition failed to load or compile
    pub fn invalid_schema(path: &Path, details: &str) -> Self {
        Self::new(format!("Invalid schema definition: {}", details))
            .with_context(format!("Failed to load schema file: {}", path.display()))
            .with_suggestions([
                "TRY: Schema files must end in .json or .toml".to_string(),
                "TRY: Field keys must be lowercase slugs and unique within the schema".to_string(),
            ])
    }

    /// Submission or result file is not a JSON object
    pub fn json_parse_error(path: &Path, details: &str) -> Self {
        Self::new(format!("JSON parse error: {}", details))
            .with_context(format!("Failed to parse JSON file: {}", path.display()))
            .with_suggestions([
                "TRY: The file must hold one JSON object keyed by field key".to_string(),
                "TRY: Validate the JSON: cat FILE | python -m json.tool".to_string(),
            ])
    }

    /// Validation failed; the field errors were already printed
    pub fn submission_rejected(errors: &FieldErrors) -> Self {
        Self::new(format!("Submission rejected: {} field(s) with errors", errors.len()))
            .with_context(format!("Fields: {}", errors.keys().collect::<Vec<_>>().join(", ")))
    }

    /// Map service errors onto CLI guidance. Field errors pass through
    /// unchanged so JSON output can list them.
    pub fn from_submission(err: SubmissionError, subject: &str, schema: &str) -> anyhow::Error {
        let helpful = match &err {
            SubmissionError::UnknownSubject(_) => Self::new(err.to_string())
                .with_context("The subject has no assignment on this database")
                .with_suggestion(format!("TRY: intake assign --subject {} --schema {}", subject, schema)),
            SubmissionError::SchemaNotFound(_) => Self::new(err.to_string())
                .with_context("No schema with this id has been imported")
                .with_suggestion("TRY: intake import-schema <file> and use the printed id"),
            SubmissionError::Inactive(_) => Self::new(err.to_string())
                .with_context("New forms cannot be started on an inactive schema or assignment"),
            SubmissionError::Page(_) => Self::new(err.to_string())
                .with_suggestion(format!("TRY: intake show-page --subject {} --schema {} --page 1", subject, schema)),
            SubmissionError::Invalid(_) | SubmissionError::Storage(_) => return err.into(),
        };
        helpful.into()
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print a command failure as JSON on stdout.
pub fn print_json_error(err: &anyhow::Error) {
    let mut payload = serde_json::json!({ "error": { "message": err.to_string() } });
    if let Some(helpful) = err.downcast_ref::<HelpfulError>() {
        payload["error"]["message"] = helpful.message.clone().into();
        payload["error"]["context"] = helpful.context.clone().into();
        payload["error"]["suggestions"] = helpful.suggestions.clone().into();
    }
    if let Some(SubmissionError::Invalid(errors)) = err.downcast_ref::<SubmissionError>() {
        payload["field_errors"] = serde_json::to_value(errors).unwrap_or_default();
    }
    match serde_json::to_string_pretty(&payload) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", payload),
    }
}
