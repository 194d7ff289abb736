mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use commands::save::ReportForm;
use commands::update::DraftEdit;
use konnekt::config::{drafts_db_path, find_workspace, RemoteConfig, DEFAULT_TIMEOUT_SECS};
use konnekt::connectivity::Backoff;
use konnekt::db::DraftStore;
use konnekt::error::ConfigError;
use konnekt::remote::HttpBackend;
use konnekt::sync::SyncCoordinator;

#[derive(Parser)]
#[command(name = "konnekt")]
#[command(about = "Offline issue-report drafts for Konnekt My City")]
#[command(version)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "KONNEKT_URL")]
    url: Option<String>,

    /// Public API key sent with every request
    #[arg(long, global = true, env = "KONNEKT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Session token of the signed-in citizen
    #[arg(long, global = true, env = "KONNEKT_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "KONNEKT_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a drafts workspace in the current directory
    Init,

    /// Save a report as a local draft without contacting the backend
    Save(ReportForm),

    /// Submit a report, keeping it as a draft when offline
    Submit(ReportForm),

    /// List saved drafts, newest first
    List {
        /// Print drafts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show draft details
    Show {
        /// Draft ID
        id: i64,
    },

    /// Print a draft's fields for pre-filling the report form
    Restore {
        /// Draft ID (defaults to the newest draft)
        id: Option<i64>,
        /// Write the attached photo to this file or directory
        #[arg(long)]
        image_out: Option<PathBuf>,
    },

    /// Edit a saved draft
    Update {
        /// Draft ID
        id: i64,
        /// New title
        #[arg(short, long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
        /// New category ID
        #[arg(short, long)]
        category: Option<String>,
        /// New municipality ID
        #[arg(short, long)]
        municipality: Option<String>,
        /// New address (empty clears it)
        #[arg(short, long)]
        address: Option<String>,
        /// New latitude (empty clears it)
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<String>,
        /// New longitude (empty clears it)
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<String>,
        /// Replace the photo
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Attach the photo as-is
        #[arg(long)]
        no_compress: bool,
        /// Remove the photo
        #[arg(long)]
        clear_image: bool,
    },

    /// Delete a draft
    Delete {
        /// Draft ID
        id: i64,
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Upload every saved draft once
    Sync,

    /// Keep running and sync whenever the backend becomes reachable
    Watch {
        /// Seconds between connectivity checks
        #[arg(long, default_value_t = 15)]
        interval_secs: u64,
    },
}

fn init_logging(verbose: u8, json: bool) {
    let default_level = match verbose {
        0 => "konnekt=info",
        1 => "konnekt=debug",
        _ => "konnekt=trace",
    };

    let filter = env::var("KONNEKT_LOG")
        .or_else(|_| env::var("RUST_LOG"))
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn get_store() -> Result<DraftStore> {
    let workspace = find_workspace()?;
    DraftStore::open(&drafts_db_path(&workspace)).context("Failed to open draft store")
}

fn remote_config(cli: &Cli) -> Result<RemoteConfig, ConfigError> {
    RemoteConfig::new(
        cli.url.clone(),
        cli.api_key.clone(),
        cli.access_token.clone(),
        cli.timeout_secs,
    )
}

/// `submit` can still keep a draft when no backend is configured.
fn optional_remote(
    config: Result<RemoteConfig, ConfigError>,
) -> Result<Option<RemoteConfig>, ConfigError> {
    match config {
        Ok(config) => Ok(Some(config)),
        Err(ConfigError::MissingUrl) => Ok(None),
        Err(e) => Err(e),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match &cli.command {
        Commands::Init => {
            let cwd = env::current_dir()?;
            commands::init::run(&cwd)
        }

        Commands::Save(form) => {
            let store = get_store()?;
            commands::save::run(&store, form).map(|_| ())
        }

        Commands::Submit(form) => {
            let config = match optional_remote(remote_config(&cli))? {
                Some(config) => config,
                None => {
                    warn!("No backend URL configured, keeping the report as a draft");
                    commands::submit::run_offline(get_store, form);
                    return Ok(());
                }
            };
            let timeout = config.timeout;
            let backend = HttpBackend::new(config)?;
            let remote = commands::submit::Remote {
                probe: &backend,
                records: &backend,
                blobs: &backend,
                identity: &backend,
                timeout,
            };
            runtime()?
                .block_on(commands::submit::run(get_store, remote, form))
                .map(|_| ())
        }

        Commands::List { json } => {
            let store = get_store()?;
            commands::list::run(&store, *json)
        }

        Commands::Show { id } => {
            let store = get_store()?;
            commands::show::run(&store, *id)
        }

        Commands::Restore { id, image_out } => {
            let store = get_store()?;
            commands::restore::run(&store, *id, image_out.as_deref()).map(|_| ())
        }

        Commands::Update {
            id,
            title,
            description,
            category,
            municipality,
            address,
            latitude,
            longitude,
            image,
            no_compress,
            clear_image,
        } => {
            let store = get_store()?;
            let edit = DraftEdit {
                title: title.clone(),
                description: description.clone(),
                category: category.clone(),
                municipality: municipality.clone(),
                address: address.clone(),
                latitude: latitude.clone(),
                longitude: longitude.clone(),
                image: image.clone(),
                no_compress: *no_compress,
                clear_image: *clear_image,
            };
            commands::update::run(&store, *id, edit)
        }

        Commands::Delete { id, force } => {
            let store = get_store()?;
            commands::delete::run(&store, *id, *force)
        }

        Commands::Sync => {
            let store = get_store()?;
            let config = remote_config(&cli)?;
            let timeout = config.timeout;
            let backend = HttpBackend::new(config)?;
            let coordinator = SyncCoordinator::new(&store, &backend, &backend, &backend, timeout);
            runtime()?
                .block_on(commands::sync::run(&coordinator))
                .map(|_| ())
        }

        Commands::Watch { interval_secs } => {
            let store = get_store()?;
            let config = remote_config(&cli)?;
            let timeout = config.timeout;
            let backend = HttpBackend::new(config)?;
            let coordinator = SyncCoordinator::new(&store, &backend, &backend, &backend, timeout);

            let shutdown = Arc::new(AtomicBool::new(false));
            signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
            signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

            runtime()?
                .block_on(commands::watch::run(
                    &store,
                    &backend,
                    &coordinator,
                    Duration::from_secs((*interval_secs).max(1)),
                    Backoff::default(),
                    &shutdown,
                ))
                .map(|_| ())
        }
    }
}
