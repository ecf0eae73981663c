//! Concur CLI - keeps a local notes folder in sync with a Concur server.
//!
//! This tool provisions a remote vault, runs single sync cycles, and runs
//! the periodic sync daemon with optional file watching.

mod settings;
mod watcher;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

use concur_remote::{HttpRemote, RemoteApi};
use concur_storage::FsVault;
use concur_sync::{
    CycleOutcome, StateStore, SyncController, SyncMode, SyncReport, SyncScheduler,
};

use settings::Settings;
use watcher::VaultWatcher;

type Controller = SyncController<FsVault, HttpRemote>;

#[derive(Parser)]
#[command(name = "concur")]
#[command(about = "Concur - two-way sync for a notes folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (default: <config dir>/concur/settings.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vault directory, overriding the settings file.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the remote vault and remember its id.
    Provision {
        /// Vault name.
        #[arg(short, long)]
        name: String,

        /// Server URL, saved to the settings file.
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Run a single sync cycle.
    Sync,

    /// Sync periodically until interrupted.
    Run {
        /// Also sync as soon as local documents change.
        #[arg(short, long)]
        watch: bool,
    },

    /// Show sync state and pending local changes.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG takes precedence over --verbose.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings_path = match cli.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let mut settings = Settings::load(&settings_path)?;
    if let Some(vault) = cli.vault {
        settings.vault_root = Some(vault);
    }

    match cli.command {
        Commands::Provision { name, api_url } => {
            cmd_provision(&mut settings, &settings_path, &name, api_url).await
        }
        Commands::Sync => cmd_sync(&settings).await,
        Commands::Run { watch } => cmd_run(&settings, watch).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

/// Build the controller from settings.
///
/// Configuration problems surface here, once, before any cycle runs.
fn build_controller(settings: &Settings) -> Result<Controller> {
    let config = settings.sync_config()?;
    let root = settings.vault_root()?;

    let vault = FsVault::new(root)
        .with_context(|| format!("Failed to open vault at {}", root.display()))?
        .with_extensions(settings.extensions.clone());
    let remote = HttpRemote::new(&config.api_url, config.request_timeout)
        .context("Failed to create HTTP client")?;

    let controller = SyncController::new(
        Arc::new(vault),
        Arc::new(remote),
        StateStore::in_vault(root),
        config,
    )?;
    Ok(controller)
}

fn print_report(report: &SyncReport) {
    println!("Sync completed in {:?}", report.duration);
    println!("  Applied from remote: {}", report.remote_applied);
    println!("  Pushed:              {}", report.pushed);
    if report.refreshed > 0 {
        println!("  Unchanged (touched): {}", report.refreshed);
    }
    if report.fetch_failed {
        println!("  Remote changes could not be fetched; will retry");
    }
    if report.push_failed {
        println!("  Local changes could not be pushed; will retry");
    }
}

/// Create the remote vault.
async fn cmd_provision(
    settings: &mut Settings,
    settings_path: &Path,
    name: &str,
    api_url: Option<String>,
) -> Result<()> {
    if let Some(vault_id) = settings.vault_id {
        bail!(
            "Vault already provisioned (id {}); edit {} to change it",
            vault_id,
            settings_path.display()
        );
    }
    if let Some(api_url) = api_url {
        settings.api_url = api_url;
    }

    info!("Provisioning vault: {}", name);

    let url = Url::parse(&settings.api_url)
        .with_context(|| format!("Invalid API URL: {}", settings.api_url))?;
    let remote = HttpRemote::new(&url, concur_remote::http::DEFAULT_TIMEOUT)?;
    let store = remote
        .create_store(name)
        .await
        .context("Failed to create vault on server")?;

    settings.vault_id = Some(store.id.get());
    settings.save(settings_path)?;

    println!("Vault provisioned successfully!");
    println!("  Name: {}", store.name);
    println!("  ID:   {}", store.id);
    println!("  Settings: {}", settings_path.display());

    Ok(())
}

/// Run one cycle.
async fn cmd_sync(settings: &Settings) -> Result<()> {
    let controller = build_controller(settings)?;

    match controller.check_for_changes().await {
        CycleOutcome::Completed(report) => {
            print_report(&report);
            Ok(())
        }
        CycleOutcome::Aborted { reason } => bail!("Sync aborted: {}", reason),
        CycleOutcome::Busy => bail!("A sync cycle is already running"),
    }
}

/// Run the sync daemon until Ctrl-C.
async fn cmd_run(settings: &Settings, watch: bool) -> Result<()> {
    let controller = Arc::new(build_controller(settings)?);
    let root = settings.vault_root()?.to_path_buf();
    let interval = settings.interval();

    let mode = if watch {
        SyncMode::Hybrid { interval }
    } else {
        SyncMode::Periodic { interval }
    };
    let (scheduler, handle) = SyncScheduler::new(mode);

    let worker = {
        let controller = controller.clone();
        tokio::spawn(handle.run(move |request| {
            let controller = controller.clone();
            async move {
                debug!("Sync triggered: {:?}", request);
                controller.check_for_changes().await
            }
        }))
    };

    let watcher_task = if watch {
        let mut watcher = VaultWatcher::new(&root, settings.extensions.clone())
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        let scheduler = scheduler.clone();
        Some(tokio::spawn(async move {
            while let Some(paths) = watcher.next_batch().await {
                scheduler.notify_change(paths).await;
            }
        }))
    } else {
        None
    };

    info!(
        "Syncing {} every {:?}{}",
        root.display(),
        interval,
        if watch { " and on change" } else { "" }
    );

    if let Ok(CycleOutcome::Completed(report)) = scheduler.request_sync().await {
        debug!(pushed = report.pushed, applied = report.remote_applied, "Initial sync done");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Stopping");

    if let Some(task) = watcher_task {
        task.abort();
    }
    scheduler.shutdown().await;
    worker.await.context("Scheduler task failed")?;

    Ok(())
}

/// Show sync state.
async fn cmd_status(settings: &Settings) -> Result<()> {
    let controller = build_controller(settings)?;
    let status = controller.status().await?;

    println!("Vault:     {}", settings.vault_root()?.display());
    println!("Server:    {}", controller.config().api_url);
    println!("Vault ID:  {}", controller.config().store_id);
    if status.watermark_ms > 0 {
        let last = chrono::DateTime::from_timestamp_millis(status.watermark_ms)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| status.watermark_ms.to_string());
        println!("Last push: {}", last);
    } else {
        println!("Last push: never");
    }
    println!("Tracked:   {} documents", status.marker_count);

    if status.pending.is_empty() {
        println!("No pending local changes");
    } else {
        println!("Pending local changes ({}):", status.pending.len());
        for path in &status.pending {
            println!("  {}", path);
        }
    }

    Ok(())
}
