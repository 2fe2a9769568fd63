//! Binary entry point for agentmem.
//!
//! Every command prints one JSON document on stdout. Failures print the
//! `{"error": {"kind", "message"}}` payload and exit non-zero.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use agentmem::config::{ConfigStore, default_config_path};
use agentmem::facade::{
    CheckpointArgs, DecisionArgs, ForgetArgs, MaintenanceArgs, SearchArgs, UpdateArgs, WriteArgs,
};
use agentmem::models::parse_timestamp;
use agentmem::observability::{self, LogFormat};
use agentmem::{CancelToken, Event, MemoryConfig, MemoryFacade};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// agentmem - per-agent memory for multi-agent assistants.
#[derive(Parser)]
#[command(name = "agentmem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "AGENTMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory holding per-agent data.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Agent whose memory to operate on.
    #[arg(short, long, global = true, env = "AGENTMEM_AGENT", default_value = "default")]
    agent: String,

    /// Log format: pretty or json.
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Search items.
    Search {
        /// Query text; omit to list by importance.
        query: Option<String>,

        /// Maximum results.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum importance.
        #[arg(long)]
        min_importance: Option<i64>,

        /// Status to search within.
        #[arg(long)]
        status: Option<String>,
    },

    /// Store an item.
    Write {
        /// Item content.
        content: String,

        /// Item title.
        #[arg(short, long)]
        title: String,

        /// Item kind.
        #[arg(short, long, default_value = "note")]
        kind: String,

        /// Importance 1-5.
        #[arg(short, long)]
        importance: Option<i64>,

        /// Confidence 0-1.
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Change fields of an item.
    Update {
        /// Item id.
        id: String,

        /// New kind.
        #[arg(long)]
        kind: Option<String>,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// New content.
        #[arg(long)]
        content: Option<String>,

        /// New importance.
        #[arg(long)]
        importance: Option<i64>,

        /// New confidence.
        #[arg(long)]
        confidence: Option<f64>,

        /// New status.
        #[arg(long)]
        status: Option<String>,
    },

    /// Forget an item.
    Forget {
        /// Item id.
        id: String,
    },

    /// Show item counts and database size.
    Health,

    /// Record a decision.
    Decision {
        /// What was decided.
        content: String,

        /// Decision title.
        #[arg(short, long)]
        title: String,

        /// Importance 1-5.
        #[arg(short, long)]
        importance: Option<i64>,
    },

    /// Distill new journal events into items.
    Checkpoint {
        /// Events read at most.
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// Archive duplicates and stale items.
    Maintain {
        /// Staleness threshold in days.
        #[arg(long)]
        stale_days: Option<i64>,

        /// Report without changing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Append one JSON event to the journal.
    Ingest {
        /// Event JSON, e.g. '{"type":"user_message","text":"hi"}'.
        event: String,
    },

    /// List journal events.
    Events {
        /// Only events after this RFC 3339 instant.
        #[arg(long)]
        since: Option<String>,

        /// Maximum events (most recent kept).
        #[arg(long, default_value_t = 100)]
        max: usize,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (keys as references only).
    Show,

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let config = match load_config(config_path.as_deref(), &cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config, config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let payload = e.downcast_ref::<agentmem::Error>().map_or_else(
                || json!({"error": {"kind": "internal", "message": format!("{e:#}")}}),
                agentmem::Error::to_payload,
            );
            println!("{payload}");
            ExitCode::FAILURE
        },
    }
}

/// Loads the config file, then applies environment and flag overrides.
fn load_config(path: Option<&Path>, cli: &Cli) -> anyhow::Result<MemoryConfig> {
    let mut config = match path {
        Some(path) => ConfigStore::load(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => MemoryConfig::default(),
    }
    .with_env_overrides();

    if let Some(root) = &cli.root {
        config.root_dir.clone_from(root);
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = LogFormat::parse(format);
    }
    Ok(config)
}

/// Runs the selected command.
fn run_command(cli: Cli, config: MemoryConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    if let Commands::Config { action } = &cli.command {
        return cmd_config(action, &config, config_path.as_deref());
    }

    let cancel = CancelToken::new();
    let facade = MemoryFacade::open(config, &cli.agent)?;

    let result = match cli.command {
        Commands::Search {
            query,
            limit,
            min_importance,
            status,
        } => print_json(&facade.search(
            SearchArgs {
                query,
                limit,
                min_importance,
                status,
            },
            &cancel,
        )?),

        Commands::Write {
            content,
            title,
            kind,
            importance,
            confidence,
        } => {
            let mut args = WriteArgs::new(kind, title, content);
            args.importance = importance;
            args.confidence = confidence;
            print_json(&facade.write(args, &cancel)?)
        },

        Commands::Update {
            id,
            kind,
            title,
            content,
            importance,
            confidence,
            status,
        } => print_json(&facade.update(
            UpdateArgs {
                id,
                kind,
                title,
                content,
                importance,
                confidence,
                status,
            },
            &cancel,
        )?),

        Commands::Forget { id } => print_json(&facade.forget(ForgetArgs { id }, &cancel)?),

        Commands::Health => print_json(&facade.health(&cancel)?),

        Commands::Decision {
            content,
            title,
            importance,
        } => {
            let mut args = DecisionArgs::new(title, content);
            args.importance = importance;
            print_json(&facade.decision_log(args, &cancel)?)
        },

        Commands::Checkpoint { max_events } => {
            print_json(&facade.checkpoint(CheckpointArgs { max_events }, &cancel)?)
        },

        Commands::Maintain {
            stale_days,
            dry_run,
        } => print_json(&facade.maintenance(
            MaintenanceArgs {
                stale_days,
                dry_run: Some(dry_run),
            },
            &cancel,
        )?),

        Commands::Ingest { event } => {
            let event: Event = serde_json::from_str(&event).context("parsing event JSON")?;
            facade.ingest(event)?;
            facade.close()?;
            print_json(&facade.journal_stats())
        },

        Commands::Events { since, max } => {
            let since = since.as_deref().map(parse_timestamp).transpose()?;
            print_json(&facade.events_since(since, max)?)
        },

        Commands::Config { .. } => Ok(()),
    };

    facade.close()?;
    result
}

fn cmd_config(action: &ConfigAction, config: &MemoryConfig, path: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => print_json(&config.to_config_file()),
        ConfigAction::Init { force } => {
            let path = path.context("no configuration path available; pass --config")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists; use --force to overwrite", path.display());
            }
            ConfigStore::save(path, &MemoryConfig::default())?;
            print_json(&json!({"written": path.display().to_string()}))
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("encoding output")?;
    println!("{rendered}");
    Ok(())
}
