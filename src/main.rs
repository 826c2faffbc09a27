//! ticket-sync - Notion task status driven by GitHub events
//!
//! Runs as a GitHub Actions step: reads the triggering event from the
//! runner environment and updates the matching Notion tasks.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ticket_sync::config::{ENV_GITHUB_EVENT_NAME, ENV_GITHUB_EVENT_PATH};
use ticket_sync::store::WorkspaceStore;
use ticket_sync::{
    BranchClassifier, ConfigSource, IdentifierExtractor, NotionCredentials, NotionStore, Result,
    SourceEvent, SyncConfig, SyncError, SyncOrchestrator,
};

#[derive(Parser)]
#[command(name = "ticket-sync")]
#[command(version)]
#[command(about = "Keep Notion task status in step with GitHub pull requests and pushes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ./ticket-sync.toml, then the user config dir)
    #[arg(short, long, global = true, env = "TICKET_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply one GitHub event to the task database
    Sync {
        /// Event name, e.g. pull_request or push
        #[arg(long, env = "GITHUB_EVENT_NAME")]
        event_name: Option<String>,

        /// Path to the event payload JSON
        #[arg(long, env = "GITHUB_EVENT_PATH")]
        event_path: Option<PathBuf>,

        /// Resolve everything but do not write statuses
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the task database's property types
    Schema {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a branch name resolves to, without contacting Notion
    Extract {
        /// Branch name, e.g. feature/GEN-42
        branch: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
    /// List the configuration search paths
    Paths,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "ticket_sync=debug,info"
    } else {
        "ticket_sync=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let working_dir = std::env::current_dir()?;

    match cli.command {
        Commands::Sync {
            event_name,
            event_path,
            dry_run,
            json,
        } => {
            let (config, _) = load_config(cli.config.as_deref(), &working_dir)?;
            let credentials = NotionCredentials::from_env()?;
            let event_name = event_name.ok_or_else(|| missing(ENV_GITHUB_EVENT_NAME))?;
            let event_path = event_path.ok_or_else(|| missing(ENV_GITHUB_EVENT_PATH))?;

            let event = SourceEvent::from_file(&event_name, &event_path)?;
            let store = NotionStore::new(&credentials, config.notion.clone(), config.properties.clone())?;

            let report = SyncOrchestrator::new(config, Arc::new(store))
                .with_dry_run(dry_run)
                .handle(&event)
                .await?;

            if json {
                println!("{}", report.to_json()?);
            } else {
                let label = if report.is_skipped() {
                    "Skipped".yellow().bold()
                } else if report.failed() > 0 {
                    "Partial".yellow().bold()
                } else {
                    "OK".green().bold()
                };
                println!("{label} {}", event.name());
                println!("{report}");
            }
        }

        Commands::Schema { json } => {
            let (config, _) = load_config(cli.config.as_deref(), &working_dir)?;
            let credentials = NotionCredentials::from_env()?;
            let store = NotionStore::new(&credentials, config.notion, config.properties)?;
            let schema = store.schema().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                println!("{} {} properties", "Schema:".cyan().bold(), schema.len());
                println!("{}", "─".repeat(40));
                for (name, kind) in schema.iter() {
                    println!("   {name:<24} {kind}");
                }
            }
        }

        Commands::Extract { branch, json } => {
            let (config, _) = load_config(cli.config.as_deref(), &working_dir)?;
            let extractor = IdentifierExtractor::new(&config.branches);
            let class = BranchClassifier::new(&config.branches).classify(&branch);
            let candidates = extractor.fallback_candidates(&branch);

            if json {
                let value = serde_json::json!({
                    "branch": branch,
                    "class": class,
                    "supported": extractor.is_supported(&branch),
                    "numeric_id": extractor.extract_numeric_id(&branch),
                    "composite_key": extractor.extract_composite_key(&branch),
                    "candidates": candidates,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let or_none = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
                println!("branch:     {branch}");
                println!("class:      {class}");
                println!(
                    "supported:  {}",
                    if extractor.is_supported(&branch) { "yes".green() } else { "no".red() }
                );
                println!(
                    "numeric id: {}",
                    or_none(extractor.extract_numeric_id(&branch).map(|n| n.to_string()))
                );
                println!("composite:  {}", or_none(extractor.extract_composite_key(&branch)));
                let chain: Vec<String> = candidates.iter().map(ToString::to_string).collect();
                println!("candidates: {}", if chain.is_empty() { "-".to_string() } else { chain.join(", ") });
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let (config, source) = load_config(cli.config.as_deref(), &working_dir)?;
                println!("# source: {source}");
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Validate => {
                let (_, source) = load_config(cli.config.as_deref(), &working_dir)?;
                println!("{} configuration is valid ({source})", "OK".green().bold());
            }
            ConfigAction::Paths => {
                for path in SyncConfig::search_paths(cli.config.as_deref(), &working_dir) {
                    let marker = if path.is_file() {
                        "found".green()
                    } else {
                        "missing".dimmed()
                    };
                    println!("{marker:>8}  {}", path.display());
                }
            }
        },
    }

    Ok(())
}

fn load_config(explicit: Option<&Path>, working_dir: &Path) -> Result<(SyncConfig, ConfigSource)> {
    let (config, source) = SyncConfig::load(explicit, working_dir)?;
    config.validate()?;
    tracing::debug!(%source, "configuration loaded");
    Ok((config, source))
}

fn missing(name: &str) -> SyncError {
    SyncError::MissingCredential {
        name: name.to_string(),
    }
}
