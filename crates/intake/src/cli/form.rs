//! Form commands: `assign`, `show-page`, `submit`.

use crate::cli::error::HelpfulError;
use crate::cli::{field_json, open_store, read_json_object};
use anyhow::{Context, Result};
use intake::{total_pages, AssignmentWorkflow, IntakeConfig, SubmissionService, SubmitOutcome};
use intake_ids::{SchemaId, SubjectRef};
use intake_schema::{FieldValue, SubmittedMap};
use intake_store::SchemaRepository;
use std::path::PathBuf;

#[derive(Debug, clap::Args)]
pub struct AssignArgs {
    /// Subject reference
    #[arg(long)]
    pub subject: String,

    /// Schema id
    #[arg(long)]
    pub schema: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct ShowPageArgs {
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub schema: String,

    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub schema: String,

    /// Page number, starting at 1
    #[arg(long)]
    pub page: usize,

    /// Submission: a JSON object keyed by field key
    pub submission: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_pair(subject: &str, schema: &str) -> Result<(SubjectRef, SchemaId)> {
    let subject = SubjectRef::parse(subject).context("Invalid --subject")?;
    let schema_id = SchemaId::parse(schema).context("Invalid --schema")?;
    Ok((subject, schema_id))
}

pub fn run_assign(args: AssignArgs, config: &IntakeConfig) -> Result<()> {
    let (subject, schema_id) = parse_pair(&args.subject, &args.schema)?;
    let store = open_store(config)?;
    let schema = store.get_schema(&schema_id)?.ok_or_else(|| {
        HelpfulError::new(format!("Schema not found: {}", schema_id))
            .with_suggestion("TRY: intake import-schema <file> and use the printed id")
    })?;

    store.register_subject(&subject)?;
    let assignment = AssignmentWorkflow::new(store.clone()).assign(&subject, &schema_id)?;
    let pages = total_pages(schema.fields().len(), config.page_size);

    if args.json {
        let payload = serde_json::json!({
            "assignment_id": assignment.id,
            "subject": assignment.subject,
            "schema_id": assignment.schema_id,
            "status": assignment.status(),
            "active": assignment.active,
            "completed_at": assignment.completed_at,
            "total_pages": pages,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "Assigned {} to {} ({}, {} pages)",
            schema.name(),
            subject,
            assignment.status(),
            pages
        );
    }
    Ok(())
}

pub fn run_show_page(args: ShowPageArgs, config: &IntakeConfig) -> Result<()> {
    let (subject, schema_id) = parse_pair(&args.subject, &args.schema)?;
    let service = SubmissionService::with_store(open_store(config)?, config.page_size)?;
    let view = service
        .open_page(&subject, &schema_id, args.page)
        .map_err(|e| HelpfulError::from_submission(e, &args.subject, &args.schema))?;

    if args.json {
        let fields: Vec<_> = view
            .fields
            .iter()
            .map(|f| field_json(f, view.initial.get(f.key())))
            .collect();
        let payload = serde_json::json!({
            "schema_id": view.schema_id,
            "schema_name": view.schema_name,
            "page": view.number,
            "total_pages": view.total_pages,
            "status": view.assignment.status(),
            "fields": fields,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!(
        "{} - page {}/{} ({})",
        view.schema_name,
        view.number,
        view.total_pages,
        view.assignment.status()
    );
    println!();
    for field in &view.fields {
        let value = view
            .initial
            .get(field.key())
            .map(FieldValue::to_string)
            .unwrap_or_default();
        println!(
            "  {}{}: {}",
            field.label(),
            if field.is_required() { " *" } else { "" },
            value
        );
        println!("      {} ({})", field.display_help_text(), field.key());
    }
    Ok(())
}

pub fn run_submit(args: SubmitArgs, config: &IntakeConfig) -> Result<()> {
    let (subject, schema_id) = parse_pair(&args.subject, &args.schema)?;
    let submitted: SubmittedMap = read_json_object(&args.submission)?
        .iter()
        .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
        .collect();

    let service = SubmissionService::with_store(open_store(config)?, config.page_size)?;
    let outcome = service
        .submit_page(&subject, &schema_id, args.page, &submitted)
        .map_err(|e| HelpfulError::from_submission(e, &args.subject, &args.schema))?;

    if args.json {
        let mut payload = serde_json::to_value(&outcome)?;
        payload["page"] = args.page.into();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    match outcome {
        SubmitOutcome::Advance { next_page } => {
            println!("Saved page {}. Next: page {}", args.page, next_page)
        }
        SubmitOutcome::Completed { completed_at } => {
            println!("Saved page {}. Form completed at {}", args.page, completed_at.to_rfc3339())
        }
    }
    Ok(())
}
