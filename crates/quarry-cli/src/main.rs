//! Quarry CLI: project and data-file backend for LLM-assisted analysis.
//!
//! Commands: serve, list, show, create, rename, delete, replace-file,
//! insight, suggest, completions

mod format;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use quarry_core::QuarryConfig;
use quarry_server::ProjectManager;
use quarry_vault::FileSource;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::format::{format_insight, OutputFormat};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(version)]
#[command(about = "Project and data-file backend for LLM-assisted data analysis")]
struct Cli {
    /// Backend root holding quarry.toml, the record document and the vault
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the REST server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// List all projects
    #[command(alias = "ls")]
    List,
    /// Show one project
    Show { id: String },
    /// Create a project from a data file
    Create {
        #[arg(long)]
        name: String,
        /// Path to the data file, resolved against the root
        #[arg(long)]
        file: String,
    },
    /// Rename a project
    Rename {
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Delete a project and its stored file
    #[command(alias = "rm")]
    Delete { id: String },
    /// Point a project at a new data file
    ReplaceFile {
        id: String,
        #[arg(long)]
        file: String,
    },
    /// Ask the analysis service about a project's data
    Insight {
        id: String,
        #[arg(long)]
        prompt: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Ask the analysis service for suggested questions
    Suggest { id: String },
    /// Generate shell completions
    Completions { shell: Shell },
}

fn init_logging(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "quarry", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = QuarryConfig::load(&cli.root)
        .with_context(|| format!("loading configuration from {}", cli.root.display()))?;

    if let Commands::Serve { bind } = &cli.command {
        if let Some(bind) = bind {
            config.bind.clone_from(bind);
        }
        let app = quarry_server::app(&config).await?;
        let listener = tokio::net::TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("binding {}", config.bind))?;
        quarry_server::serve(listener, app, shutdown_signal()).await?;
        return Ok(());
    }

    let manager = ProjectManager::from_config(&config)?;
    match cli.command {
        Commands::List => print_json(&manager.list().await?),
        Commands::Show { id } => print_json(&manager.get(&id).await?),
        Commands::Create { name, file } => {
            print_json(&manager.create(&name, Some(FileSource::Path(file))).await?)
        }
        Commands::Rename { id, name } => print_json(&manager.rename(&id, &name).await?),
        Commands::Delete { id } => {
            let removed = manager.delete(&id).await?;
            print_json(&json!({
                "message": "Project deleted successfully",
                "project": removed,
            }))
        }
        Commands::ReplaceFile { id, file } => {
            print_json(&manager.replace_file(&id, Some(FileSource::Path(file))).await?)
        }
        Commands::Insight { id, prompt, format } => {
            let answer = manager.insight(&id, &prompt).await?;
            print!("{}", format_insight(&prompt, &answer, format));
            if format == OutputFormat::Json {
                println!();
            }
            Ok(())
        }
        Commands::Suggest { id } => print_json(&manager.suggestions(&id).await?),
        Commands::Serve { .. } | Commands::Completions { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
