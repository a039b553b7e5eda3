//! Intake command-line interface
//!
//! - **Schema files**: compile, page and validate definitions without a database
//! - **Forms**: import schemas, assign subjects and submit pages against SQLite

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use intake::config::default_config_path;
use intake::IntakeConfig;
use intake_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "intake", about = "Schema-driven data collection")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (defaults to $INTAKE_HOME/config.toml)
    #[arg(long, global = true, env = "INTAKE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a schema definition and list its fields by page
    CheckSchema(cli::schema::CheckSchemaArgs),

    /// Validate a submission against a schema file and print the merged answers
    Validate(cli::schema::ValidateArgs),

    /// Store a schema definition in the database
    ImportSchema(cli::schema::ImportSchemaArgs),

    /// Assign a schema to a subject
    Assign(cli::form::AssignArgs),

    /// Show one page of a subject's form with the answers on file
    ShowPage(cli::form::ShowPageArgs),

    /// Submit one page of a subject's form
    Submit(cli::form::SubmitArgs),

    /// Show resolved configuration
    Config(cli::config::ConfigArgs),
}

fn command_wants_json(cmd: &Commands) -> bool {
    match cmd {
        Commands::CheckSchema(args) => args.json,
        Commands::Validate(_) => false,
        Commands::ImportSchema(args) => args.json,
        Commands::Assign(args) => args.json,
        Commands::ShowPage(args) => args.json,
        Commands::Submit(args) => args.json,
        Commands::Config(args) => args.json,
    }
}

fn run_command(command: Commands, config: &IntakeConfig, config_path: &std::path::Path) -> Result<()> {
    match command {
        Commands::CheckSchema(args) => cli::schema::run_check(args, config),
        Commands::Validate(args) => cli::schema::run_validate(args, config),
        Commands::ImportSchema(args) => cli::schema::run_import(args, config),
        Commands::Assign(args) => cli::form::run_assign(args, config),
        Commands::ShowPage(args) => cli::form::run_show_page(args, config),
        Commands::Submit(args) => cli::form::run_submit(args, config),
        Commands::Config(args) => cli::config::run(args, config, config_path),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = IntakeConfig::resolve(Some(&config_path))
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    debug!(
        config = %config_path.display(),
        database = %config.database_path.display(),
        page_size = config.page_size,
        "Resolved configuration"
    );
    run_command(cli.command, &config, &config_path)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    let _log_guard = match init_logging(LogConfig {
        app_name: "intake",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else if let Some(helpful) = err.downcast_ref::<cli::error::HelpfulError>() {
                eprint!("{}", helpful);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
