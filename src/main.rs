//! subd - terminal client for the subd record server
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use subd_client::{ClientConfig, Connection, Session, StateStore};
use subd_protocol::{Filter, RecordFields};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "subd")]
#[command(about = "Terminal client for the subd record server")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "SUBD_CONFIG")]
    config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Session state file (overrides config)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Don't watch for changes made by other clients
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Open a data file on the server
    Open {
        /// File path, as seen by the server
        file: String,
    },

    /// Show one page of the current selection
    Show {
        /// Page number (defaults to the stored page)
        #[arg(short, long)]
        page: Option<u32>,

        /// Rows per page (defaults to the stored size)
        #[arg(short, long)]
        size: Option<u32>,
    },

    /// Select records from the whole file
    Select(FilterArgs),

    /// Narrow the current selection
    Reselect(FilterArgs),

    /// Add a record
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        rating: String,
        #[arg(long, default_value = "")]
        info: String,
    },

    /// Update the records matching the --where-* filters
    Update {
        #[command(flatten)]
        fields: FieldArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Remove the records matching the --where-* filters
    Remove(TargetArgs),

    /// Save the server's data to disk
    Save,

    /// Send a raw command, e.g. `exec "print all"`
    Exec {
        command: String,
    },
}

/// Record filter.
#[derive(Args, Debug, Default)]
pub(crate) struct FilterArgs {
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub group: Option<String>,
    #[arg(long)]
    pub rating: Option<String>,
}

impl FilterArgs {
    pub(crate) fn to_filter(&self) -> Filter {
        Filter {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            group: self.group.clone().unwrap_or_default(),
            rating: self.rating.clone().unwrap_or_default(),
        }
    }
}

/// Records a one-shot `update` or `remove` applies to.
#[derive(Args, Debug, Default)]
pub(crate) struct TargetArgs {
    /// Only the record with this id
    #[arg(long)]
    pub where_id: Option<String>,
    /// Only records with this name
    #[arg(long)]
    pub where_name: Option<String>,
    /// Only records in this group
    #[arg(long)]
    pub where_group: Option<String>,
    /// Only records with this rating
    #[arg(long)]
    pub where_rating: Option<String>,

    /// Apply to every record in the file
    #[arg(
        long,
        conflicts_with_all = ["where_id", "where_name", "where_group", "where_rating"]
    )]
    pub all: bool,
}

impl TargetArgs {
    pub(crate) fn to_filter(&self) -> Filter {
        Filter {
            id: self.where_id.clone().unwrap_or_default(),
            name: self.where_name.clone().unwrap_or_default(),
            group: self.where_group.clone().unwrap_or_default(),
            rating: self.where_rating.clone().unwrap_or_default(),
        }
    }

    /// Rejects a target that names no records without `--all`.
    pub(crate) fn check(&self) -> Result<(), String> {
        if !self.all && self.to_filter().is_empty() {
            return Err(
                "no records targeted: pass --where-* filters, or --all for every record"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// Fields to change.
#[derive(Args, Debug, Default)]
pub(crate) struct FieldArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub group: Option<String>,
    #[arg(long)]
    pub rating: Option<String>,
    #[arg(long)]
    pub info: Option<String>,
}

impl FieldArgs {
    pub(crate) fn to_fields(&self) -> RecordFields {
        RecordFields {
            name: self.name.clone().unwrap_or_default(),
            group: self.group.clone().unwrap_or_default(),
            rating: self.rating.clone().unwrap_or_default(),
            info: self.info.clone().unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Config file and environment first, then flags
    let mut config = ClientConfig::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("{}: {}", "Configuration error".red(), e);
        e
    })?;
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(path) = cli.state_file {
        config.state.path = path;
    }
    if cli.no_sync {
        config.sync.enabled = false;
    }
    config.validate()?;
    tracing::debug!(
        "Server {}:{}, state file {}",
        config.network.host,
        config.network.port,
        config.state.path.display()
    );

    let connection = Arc::new(Connection::new(config.connection_config()));
    let session = Session::new(connection.clone(), StateStore::new(&config.state.path));

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(session, &config).await?;
        }
        Some(cmd) => {
            // Connect for one-shot command
            connection.connect().await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            let mut session = session;
            let result = commands::execute(&mut session, cmd).await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    let _ = session.close().await;
                    std::process::exit(1);
                }
            }

            session.close().await?;
        }
    }

    Ok(())
}
