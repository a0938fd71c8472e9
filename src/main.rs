//! Covenant - permit and proof broker for Elohim worlds
//!
//! "I will make a covenant with them"

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use covenant::{
    clock::{Clock, SystemClock},
    config::Args,
    db::{MemoryStore, MongoStore},
    server, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("covenant={},info", args.log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Never print secrets or the connection URI
    info!("======================================");
    info!("  Covenant - permit and proof broker");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB database: {}", args.mongodb_db);
    let guard = args.world_guard();
    info!("Worlds: {}", guard.allowed().collect::<Vec<_>>().join(", "));
    let closed: Vec<_> = guard.closed().collect();
    if !closed.is_empty() {
        warn!("Closed worlds: {}", closed.join(", "));
    }
    info!("======================================");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = match args.mongodb_uri() {
        Some(uri) => match MongoStore::connect(&uri, &args.mongodb_db).await {
            Ok(store) => {
                info!("MongoDB connected successfully");
                AppState::new(args, Arc::new(store), clock)?
            }
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                AppState::new(args, Arc::new(MemoryStore::new()), clock)?
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No MONGODB_URI (dev mode, using in-memory store)");
            AppState::new(args, Arc::new(MemoryStore::new()), clock)?
        }
    };

    server::run(Arc::new(state)).await?;
    Ok(())
}
