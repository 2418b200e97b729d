//! R-Droid Preview command line
//!
//! Opens a project's preview session and runs one inspection command.

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use r_droid_core::{AppConfig, APP_NAME, VERSION};
use r_droid_preview::commands::{IdsCommand, LocalesCommand, NamesCommand, RClassCommand, ResolveCommand};
use r_droid_preview::PreviewSession;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "r-droid-preview", version, about = "Inspect the resources and R classes of an Android project")]
struct Cli {
    /// Project directory containing rdroid.toml
    project: PathBuf,

    /// Configuration file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a resource for a device configuration
    Resolve {
        /// Resource reference, e.g. @string/app_name
        resource: String,
        /// Device qualifiers, e.g. fr-rFR-night-xxhdpi
        #[arg(short, long)]
        qualifiers: Option<String>,
        #[arg(short, long)]
        module: Option<String>,
    },
    /// List resource ids
    Ids {
        /// Only this resource type
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,
        #[arg(short, long)]
        module: Option<String>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// List the names of a resource type
    Names {
        resource_type: String,
        #[arg(short, long)]
        module: Option<String>,
    },
    /// List translated locales
    Locales {
        #[arg(short, long)]
        module: Option<String>,
    },
    /// Generate R classes
    Rclass {
        /// Describe one class, e.g. com.example.R$string
        #[arg(short, long)]
        class: Option<String>,
        /// Write .class files into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        module: Option<String>,
    },
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path).await,
        None => AppConfig::load().await,
    }
    .context("Failed to load configuration")?;

    init_logging(&config);
    info!("{} v{} starting...", APP_NAME, VERSION);

    let project = std::fs::canonicalize(&cli.project)
        .with_context(|| format!("Project directory {:?} not found", cli.project))?;
    let session = PreviewSession::open(project.clone(), config.clone())?;

    let report = match cli.command {
        Command::Resolve {
            resource,
            qualifiers,
            module,
        } => ResolveCommand {
            module,
            resource,
            qualifiers,
        }
        .execute(&session)?,
        Command::Ids {
            resource_type,
            module,
            json,
        } => IdsCommand {
            module,
            resource_type,
            json,
        }
        .execute(&session)?,
        Command::Names { resource_type, module } => NamesCommand { module, resource_type }.execute(&session)?,
        Command::Locales { module } => LocalesCommand { module }.execute(&session)?,
        Command::Rclass { class, output, module } => RClassCommand { module, class, output }.execute(&session)?,
    };
    print!("{}", report);

    session.close();

    config.add_recent_project(project);
    let saved = match &cli.config {
        Some(path) => config.save_to(path).await,
        None => config.save().await,
    };
    if let Err(e) = saved {
        warn!("Could not update recent projects: {}", e);
    }

    Ok(())
}

/// Install the fmt subscriber; `RUST_LOG` overrides the configured filter
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(config.logging.with_file)
        .with_line_number(config.logging.with_line_number)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}
