//! Reel identity API server binary.

use std::sync::Arc;

use clap::Parser;
use reel_api::AppState;
use reel_api::config::ApiConfig;
use reel_core::clock::SystemClock;
use reel_core::mail::LogMailer;
use reel_core::store::{MemoryStore, PgStore, Store};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,reel_api=debug,reel_core=debug";

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "reel_api_server", about = "Reel identity API server")]
struct Args {
    /// Port to listen on; overrides the port in `BIND_ADDR` (0 = ephemeral).
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep all state in memory instead of PostgreSQL. Local development only.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "127.0.0.1".into());
        config.bind_addr = format!("{host}:{port}");
    }
    if !config.secure_cookies {
        warn!("refresh cookie Secure flag disabled; use only without TLS in development");
    }

    info!(
        version = reel_core::version(),
        bind_addr = %config.bind_addr,
        in_memory = args.in_memory,
        "starting reel_api_server"
    );

    let store: Arc<dyn Store> = if args.in_memory {
        warn!("using in-memory store; all state is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&config.pg_connection_url)
            .await?;

        info!("running database migrations");
        reel_api::migrate(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(config, store, Arc::new(LogMailer), Arc::new(SystemClock));
    let app = reel_api::router(state);

    info!(addr = %local_addr, "REST API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
