//! RecruitSync CLI - sync agent and local cache inspector
//!
//! Runs the realtime sync client and reconciliation loop as a long-lived
//! agent, and offers one-shot commands for inspecting and draining the
//! on-device state.

mod error;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use recruitsync_core::drain::drain_outbox;
use recruitsync_core::gateway::{GatewayConfig, RemoteGateway};
use recruitsync_core::models::{Booking, Candidate, User, UserRole};
use recruitsync_core::recon::{Reconciler, RemoteSource};
use recruitsync_core::store::LocalCache;
use recruitsync_core::sync::{
    ConnectivitySignal, HttpChannelTransport, RealtimeSyncClient, StaticConnectivity, SyncContext,
};
use recruitsync_core::util::normalize_text_option;
use recruitsync_core::{load_initial, Snapshot, SnapshotPayload};

use error::CliError;

const DEFAULT_CHANNEL: &str = "portal-sync";

#[derive(Parser)]
#[command(name = "recruitsync")]
#[command(about = "Local-first sync agent for the RecruitSync portal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local cache database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync agent (fan-out client + reconciliation) until Ctrl-C
    Agent,
    /// Show cache, outbox, and backend status
    Status,
    /// Replay pending outbox items against the remote backend once
    Flush,
    /// Print the current snapshot as JSON
    Export,
    /// Write a small demo snapshot into the local cache
    Seed,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("recruitsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Agent => run_agent(&db_path).await?,
        Commands::Status => run_status(&db_path).await?,
        Commands::Flush => run_flush(&db_path).await?,
        Commands::Export => run_export(&db_path).await?,
        Commands::Seed => run_seed(&db_path).await?,
    }

    Ok(())
}

fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Some(path) = normalize_text_option(env::var("RECRUITSYNC_DB_PATH").ok()) {
        return PathBuf::from(path);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recruitsync")
        .join("recruitsync.db")
}

fn gateway_config() -> GatewayConfig {
    let base_url = normalize_text_option(env::var("RECRUITSYNC_API_URL").ok());
    let api_key = normalize_text_option(env::var("RECRUITSYNC_API_KEY").ok());
    GatewayConfig { base_url, api_key }
}

fn channel_name() -> String {
    normalize_text_option(env::var("RECRUITSYNC_CHANNEL").ok())
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
}

fn new_client_id() -> String {
    format!("cli-{}", uuid::Uuid::now_v7().simple())
}

async fn open_cache(db_path: &PathBuf) -> Arc<LocalCache> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    Arc::new(LocalCache::open(db_path).await)
}

async fn run_agent(db_path: &PathBuf) -> Result<(), CliError> {
    let cache = open_cache(db_path).await;
    let config = gateway_config();
    let configured = config.is_configured();
    let gateway = Arc::new(RemoteGateway::new(config.clone())?);
    let connectivity: Arc<dyn ConnectivitySignal> = Arc::new(StaticConnectivity::new(true));
    let client_id = new_client_id();

    let initial = load_initial(&cache, SnapshotPayload::default()).await;
    tracing::info!(
        client_id,
        updated_at = initial.updated_at,
        configured,
        "Agent starting"
    );

    let mut ctx = SyncContext::new(client_id.clone(), Arc::clone(&cache));
    if configured {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| CliError::Config("backend URL vanished mid-setup".to_string()))?;
        let transport =
            HttpChannelTransport::new(base_url, config.api_key.clone(), channel_name(), client_id)?;
        ctx = ctx.with_remote(Arc::new(transport));
    }

    // Accepted remote snapshots are persisted so restarts pick up from the
    // latest state.
    let cache_for_accepts = Arc::clone(&cache);
    let client = RealtimeSyncClient::new(ctx, move |snapshot| {
        tracing::info!(
            updated_at = snapshot.updated_at,
            updated_by = %snapshot.updated_by,
            "Accepted snapshot"
        );
        let cache = Arc::clone(&cache_for_accepts);
        tokio::spawn(async move {
            cache.save_snapshot(&snapshot).await;
        });
    });
    client.start().await;

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&gateway) as Arc<dyn RemoteSource>,
        Arc::clone(&connectivity),
        |payload| {
            tracing::info!(
                bookings = payload.bookings.len(),
                candidates = payload.candidates.len(),
                users = payload.users.len(),
                "Remote state applied"
            );
        },
        |notice| println!("{notice}"),
    ));
    reconciler.seed(initial.payload());
    let recon_handle = reconciler.start();

    // Drain anything queued while the agent was down.
    let report = drain_outbox(&cache, &gateway, connectivity.as_ref()).await;
    if report.attempted > 0 {
        tracing::info!(
            drained = report.drained,
            retained = report.retained,
            "Startup outbox drain"
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    recon_handle.stop();
    client.stop();
    Ok(())
}

async fn run_status(db_path: &PathBuf) -> Result<(), CliError> {
    let cache = open_cache(db_path).await;
    let config = gateway_config();

    println!("Cache:    {}", db_path.display());
    println!(
        "Storage:  {}",
        if cache.is_available() {
            "available"
        } else {
            "unavailable (degraded mode)"
        }
    );
    match cache.load_snapshot().await {
        Some(snapshot) => println!(
            "Snapshot: updated_at={} updated_by={} ({} bookings, {} candidates, {} users)",
            snapshot.updated_at,
            snapshot.updated_by,
            snapshot.bookings.len(),
            snapshot.candidates.len(),
            snapshot.users.len(),
        ),
        None => println!("Snapshot: none"),
    }
    println!("Outbox:   {} pending", cache.outbox_len().await);
    println!(
        "Backend:  {}",
        if config.is_configured() {
            "configured"
        } else {
            "not configured (local-only mode)"
        }
    );
    Ok(())
}

async fn run_flush(db_path: &PathBuf) -> Result<(), CliError> {
    let cache = open_cache(db_path).await;
    let gateway = RemoteGateway::new(gateway_config())?;
    let online = StaticConnectivity::new(true);

    let report = drain_outbox(&cache, &gateway, &online).await;
    println!(
        "Attempted {}, drained {}, retained {}",
        report.attempted, report.drained, report.retained
    );
    Ok(())
}

async fn run_export(db_path: &PathBuf) -> Result<(), CliError> {
    let cache = open_cache(db_path).await;
    let snapshot = cache.load_snapshot().await.ok_or(CliError::NoSnapshot)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_seed(db_path: &PathBuf) -> Result<(), CliError> {
    let cache = open_cache(db_path).await;
    if !cache.is_available() {
        return Err(CliError::Config(
            "cannot seed: local storage is unavailable".to_string(),
        ));
    }

    let candidate = Candidate::new("Ada Lovelace", "ada@example.com", "Backend Engineer");
    let booking = Booking::new(candidate.id.clone(), "Technical interview, round 1");
    let payload = SnapshotPayload {
        bookings: vec![booking],
        candidates: vec![candidate],
        users: vec![User::new("Grace Hopper", "grace@example.com", UserRole::Admin)],
        ..SnapshotPayload::default()
    };

    let snapshot = Snapshot::new(payload, "seed");
    cache.save_snapshot(&snapshot).await;
    println!("Seeded snapshot at {}", snapshot.updated_at);
    Ok(())
}
