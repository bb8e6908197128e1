//! Warehouse pick-list server for ManaPool orders
//!
//! Pulls unfulfilled marketplace orders into aggregated pick batches and
//! serves the picking API plus a live websocket feed.

use clap::Parser;
use picklist::broadcast::ConnectionManager;
use picklist::db::init_schema;
use picklist::manapool::{ManapoolClient, ManapoolConfig};
use picklist::scryfall::{ScryfallClient, ScryfallConfig};
use picklist::web::{self, AppState};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Pick-list server - aggregates ManaPool orders into warehouse pick batches
#[derive(Parser, Debug)]
#[command(name = "picklist")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Port for the web API
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Run one sync and exit instead of serving
    #[arg(long, default_value_t = false)]
    sync: bool,

    /// Concurrent order fetches during a sync
    #[arg(long, default_value_t = 4)]
    sync_workers: usize,

    /// Warn when another batch was generated within this many minutes
    #[arg(long, default_value_t = 10)]
    recent_minutes: i64,
}

/// Returns the default database path: ~/.local/share/picklist/picklist.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("picklist")
        .join("picklist.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting picklist...");
    log::info!("Database path: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let conn = match Connection::open(&db_path) {
        Ok(conn) => {
            log::info!("Opened database: {}", db_path.display());
            conn
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    let db = Arc::new(Mutex::new(conn));
    let manapool = Arc::new(ManapoolClient::new(ManapoolConfig::from_env()));
    let scryfall = Arc::new(ScryfallClient::new(ScryfallConfig::from_env()));

    if !manapool.is_configured() {
        log::warn!("ManaPool credentials not set; batch generation is disabled");
    }

    if args.sync {
        match picklist::sync::run_sync(
            &db,
            &manapool,
            &scryfall,
            args.sync_workers,
            args.recent_minutes,
        )
        .await
        {
            Ok(summary) => {
                log::info!(
                    "Created batch {} ({}) with {} unique cards",
                    summary.batch_id,
                    summary.batch_name,
                    summary.unique_cards
                );
            }
            Err(e) => {
                log::error!("Sync failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let state = AppState {
        db,
        manapool,
        scryfall,
        manager: Arc::new(ConnectionManager::new()),
        sync_workers: args.sync_workers,
        recent_minutes: args.recent_minutes,
    };
    if let Err(e) = web::serve(state, args.port).await {
        log::error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
