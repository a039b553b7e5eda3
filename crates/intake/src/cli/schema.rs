//! Schema commands: `check-schema`, `validate`, `import-schema`.

use crate::cli::error::HelpfulError;
use crate::cli::{field_json, open_store, read_json_object, resolve_schema_path};
use anyhow::Result;
use intake::{build_page_schema, total_pages, IntakeConfig};
use intake_schema::{FieldValue, FormSchema, ResultMap, SubmittedMap};
use intake_store::SchemaRepository;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct CheckSchemaArgs {
    /// Schema definition (.json or .toml)
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct ValidateArgs {
    /// Schema definition (.json or .toml)
    pub schema: PathBuf,

    /// Submission: a JSON object keyed by field key
    pub submission: PathBuf,

    /// Answers already on file, merged under the submission
    #[arg(long)]
    pub previous: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct ImportSchemaArgs {
    /// Schema definition (.json or .toml)
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn load_schema(file: &Path, config: &IntakeConfig) -> Result<FormSchema> {
    let path = resolve_schema_path(file, config)?;
    FormSchema::load_file(&path).map_err(|e| HelpfulError::invalid_schema(&path, &e.to_string()).into())
}

pub fn run_check(args: CheckSchemaArgs, config: &IntakeConfig) -> Result<()> {
    let schema = load_schema(&args.file, config)?;
    let pages = total_pages(schema.fields().len(), config.page_size);
    let mut page_keys = Vec::with_capacity(pages);
    for number in 1..=pages {
        let page = build_page_schema(&schema, number, config.page_size)?;
        page_keys.push(page.keys().map(str::to_string).collect::<Vec<_>>());
    }

    if args.json {
        let payload = serde_json::json!({
            "id": schema.id(),
            "name": schema.name(),
            "slug": schema.slug(),
            "description": schema.description(),
            "active": schema.is_active(),
            "page_size": config.page_size,
            "total_pages": pages,
            "pages": page_keys,
            "fields": schema.fields().iter().map(|f| field_json(f, None)).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{} ({})", schema.name(), schema.slug());
    if let Some(description) = schema.description() {
        println!("{}", description);
    }
    if !schema.is_active() {
        println!("(inactive)");
    }
    println!();
    for (index, keys) in page_keys.iter().enumerate() {
        println!("Page {}/{}", index + 1, pages);
        for key in keys {
            if let Some(field) = schema.field(key) {
                println!(
                    "  {:<24} {:<12} {}{}",
                    field.key(),
                    field.field_type().as_str(),
                    field.label(),
                    if field.is_required() { " *" } else { "" }
                );
            }
        }
    }
    if pages == 0 {
        println!("No fields.");
    }
    Ok(())
}

pub fn run_validate(args: ValidateArgs, config: &IntakeConfig) -> Result<()> {
    let schema = load_schema(&args.schema, config)?;
    let submitted: SubmittedMap = read_json_object(&args.submission)?
        .iter()
        .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
        .collect();
    let previous: ResultMap = match &args.previous {
        Some(path) => read_json_object(path)?.into_iter().collect(),
        None => ResultMap::new(),
    };

    match schema.validate(&submitted, &previous) {
        Ok(merged) => {
            println!("{}", serde_json::to_string_pretty(&merged)?);
            Ok(())
        }
        Err(errors) => {
            println!("{}", serde_json::to_string_pretty(&errors)?);
            Err(HelpfulError::submission_rejected(&errors).into())
        }
    }
}

pub fn run_import(args: ImportSchemaArgs, config: &IntakeConfig) -> Result<()> {
    let schema = load_schema(&args.file, config)?;
    let store = open_store(config)?;
    store.save_schema(&schema)?;
    info!(schema_id = %schema.id(), schema = schema.slug(), fields = schema.fields().len(), "Imported schema");

    if args.json {
        let payload = serde_json::json!({
            "id": schema.id(),
            "name": schema.name(),
            "fields": schema.fields().len(),
            "database": config.database_path.to_string_lossy(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Imported {} as {}", schema.name(), schema.id());
    }
    Ok(())
}
