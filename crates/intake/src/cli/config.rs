//! `intake config`: show resolved paths and settings.

use intake::IntakeConfig;
use intake_logging::{intake_home, logs_dir};
use std::path::Path;

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Show resolved configuration in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs, config: &IntakeConfig, config_path: &Path) -> anyhow::Result<()> {
    let home = intake_home();
    let logs = logs_dir();

    if args.json {
        let payload = serde_json::json!({
            "home": home.to_string_lossy(),
            "config_file": {
                "path": config_path.to_string_lossy(),
                "exists": config_path.exists(),
            },
            "database": {
                "path": config.database_path.to_string_lossy(),
                "exists": config.database_path.exists(),
            },
            "schema_dir": {
                "path": config.schema_dir.to_string_lossy(),
                "exists": config.schema_dir.exists(),
            },
            "logs": {
                "path": logs.to_string_lossy(),
                "exists": logs.exists(),
            },
            "page_size": config.page_size,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("INTAKE CONFIGURATION");
        println!("====================");
        println!();
        println!("Home:       {}", home.display());
        println!("Config:     {} ({})", config_path.display(), exists_label(config_path.exists()));
        println!(
            "Database:   {} ({})",
            config.database_path.display(),
            exists_label(config.database_path.exists())
        );
        println!(
            "Schemas:    {} ({})",
            config.schema_dir.display(),
            exists_label(config.schema_dir.exists())
        );
        println!("Logs:       {}", logs.display());
        println!();
        println!("Page size:  {}", config.page_size);
    }

    Ok(())
}

fn exists_label(exists: bool) -> &'static str {
    if exists {
        "exists"
    } else {
        "not found"
    }
}
