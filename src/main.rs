//! prop-lifecycle: operator tool for the property lifecycle document
//!
//! Inspects and drives the same cache and shared document the app uses:
//! - Show the cached state and pull or push it
//! - Run the display id repair pass
//! - Follow live remote changes
//! - Sign a user in or out

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use prop_lifecycle_store::ids::IdKind;
use prop_lifecycle_store::repair::collect_display_ids;
use prop_lifecycle_store::{
    format_currency, generate_display_id, session, Config, RemoteStatus, SledCache, SledCacheConfig,
    SqliteRemote, SqliteRemoteConfig, SubscriptionState, Synchronizer, WriteTicket,
};

#[derive(Parser)]
#[command(name = "prop-lifecycle")]
#[command(about = "Inspect and sync the property lifecycle app state")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PROP_LIFECYCLE_CONFIG")]
    config: Option<PathBuf>,

    /// sled cache directory (overrides config file)
    #[arg(long, env = "PROP_LIFECYCLE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Shared document database (overrides config file)
    #[arg(long, env = "PROP_LIFECYCLE_REMOTE_DB")]
    remote_db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summarize the cached state
    Show,

    /// Fetch the shared document into the cache
    Pull,

    /// Persist the cached state to the shared document
    Push,

    /// Backfill missing or legacy display ids
    Repair,

    /// Follow remote changes until Ctrl-C
    Watch,

    /// Print a fresh display id
    NewId {
        /// agent, tenant, property, request or application
        kind: IdKind,
    },

    /// Sign in by internal user id
    SignIn { uid: String },

    /// Clear the signed-in user
    SignOut,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("prop_lifecycle_store=info".parse()?)
                .add_directive("prop_lifecycle=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) if path.exists() => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        Some(path) => {
            info!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        }
        None => Config::default(),
    };

    if let Some(cache_dir) = cli.cache_dir {
        config.cache.path = cache_dir;
    }
    if let Some(remote_db) = cli.remote_db {
        config.remote.db_path = remote_db;
    }
    config.validate()?;

    let cache = SledCache::open(SledCacheConfig {
        path: config.cache.path.clone(),
        key: config.cache.key.clone(),
        temporary: false,
    })
    .context("Failed to open local cache")?;
    let remote = SqliteRemote::open(SqliteRemoteConfig::from(&config.remote))
        .context("Failed to open shared document store")?;
    let sync = Synchronizer::new(Arc::new(cache), Arc::new(remote))
        .with_max_id_attempts(config.ids.max_attempts);

    match cli.command {
        Command::Show => show(&sync),
        Command::Pull => match sync.pull().await? {
            Some(state) => println!(
                "Pulled {} users, {} properties",
                state.users.len(),
                state.properties.len()
            ),
            None => println!("No shared document yet"),
        },
        Command::Push => report(sync.push().await?),
        Command::Repair => {
            let (repair, ticket) = sync.repair()?;
            for change in &repair.changes {
                println!(
                    "{} {}: {} -> {}",
                    change.collection,
                    change.id,
                    change.old.as_deref().unwrap_or("<none>"),
                    change.new
                );
            }
            match ticket {
                Some(ticket) => settle(ticket).await,
                None => println!("Nothing to repair"),
            }
        }
        Command::Watch => watch(&sync).await?,
        Command::NewId { kind } => {
            let state = sync.read();
            let taken = match kind {
                IdKind::Agent | IdKind::Tenant => collect_display_ids(&state.users),
                IdKind::Property => collect_display_ids(&state.properties),
                IdKind::Request => collect_display_ids(&state.tickets),
                IdKind::Application => collect_display_ids(&state.applications),
            };
            println!("{}", generate_display_id(kind, &taken, sync.max_id_attempts())?);
        }
        Command::SignIn { uid } => {
            let signed_in = session::sign_in(&sync, &uid)?;
            println!(
                "Signed in {} ({})",
                signed_in.user.name,
                signed_in.user.display_id.as_deref().unwrap_or("-")
            );
            if signed_in.repair.was_modified() {
                println!("Repaired {} display ids", signed_in.repair.changes.len());
            }
            settle(signed_in.ticket).await;
        }
        Command::SignOut => settle(session::sign_out(&sync)?).await,
    }

    Ok(())
}

fn show(sync: &Synchronizer) {
    let state = sync.read();
    println!("schema version  {}", state.schema_version);
    println!("users           {}", state.users.len());
    println!("properties      {}", state.properties.len());
    println!("agreements      {}", state.agreements.len());
    println!("payments        {}", state.payments.len());
    println!("tickets         {}", state.tickets.len());
    println!("applications    {}", state.applications.len());
    println!("notifications   {}", state.notifications.len());

    let rent: f64 = state.properties.iter().map(|p| p.rent).sum();
    println!("total rent      {}", format_currency(rent, &state.settings));

    match &state.current_user {
        Some(user) => println!(
            "signed in       {} ({})",
            user.name,
            user.display_id.as_deref().unwrap_or("-")
        ),
        None => println!("signed in       -"),
    }
}

async fn settle(ticket: WriteTicket) {
    report(ticket.remote_settled().await);
}

fn report(status: RemoteStatus) {
    match &status {
        RemoteStatus::Failed(_) => warn!(%status, "Saved locally only"),
        _ => println!("Remote {status}"),
    }
}

async fn watch(sync: &Synchronizer) -> anyhow::Result<()> {
    let subscription = sync.init_sync(
        |state| {
            info!(
                users = state.users.len(),
                properties = state.properties.len(),
                tickets = state.tickets.len(),
                "Remote update"
            );
        },
        |e| warn!(error = %e, "Subscription ended"),
    );

    let connected = subscription
        .wait_for(Duration::from_secs(30), |s| s != SubscriptionState::Connecting)
        .await;
    if let Some(state) = connected {
        info!(%state, "Watching shared document, Ctrl-C to stop");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    subscription.unsubscribe();
    info!("Stopped watching");
    Ok(())
}
