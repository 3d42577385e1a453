use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use resource_community::{
    api::{create_router, SecurityMiddlewareConfig, SecurityState, TokenVerifier},
    config::{sanitize_dsn, CommunityConfig},
    database::{DatabasePool, MemoryStore, Store},
    engine::Engine,
    scanner::select_scanner,
    storage::FsContentStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all security requirements
    let config = CommunityConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting resource community server");

    let store = connect_store(&config).await?;

    let content = FsContentStore::new(&config.storage.upload_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to prepare upload directory {}",
                config.storage.upload_dir.display()
            )
        })?;
    info!("Content store at {}", content.root_dir().display());

    let scanner = select_scanner(config.scanner.clamav_addr.as_deref()).await;

    let engine = Engine::new(store, Arc::new(content), scanner, config.engine_config());

    let security_state = SecurityState::new(
        SecurityMiddlewareConfig {
            rate_limit_per_minute: config.security.rate_limit_per_minute,
            log_requests: config.logging.log_requests,
        },
        TokenVerifier::new(&config.auth.jwt_secret),
    );
    spawn_rate_limit_cleanup(&security_state);

    let app = create_router(engine, security_state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Resource community server listening on {}", bind_addr);
    info!(
        "Rate limit={}/min, Max upload={}MB",
        config.security.rate_limit_per_minute,
        config.storage.max_upload_bytes / (1024 * 1024)
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging(config: &CommunityConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

async fn connect_store(config: &CommunityConfig) -> Result<Arc<dyn Store>> {
    if !config.database.postgres_enabled {
        warn!("POSTGRES_ENABLED=false: using in-memory store, data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    info!(
        "Connecting to PostgreSQL at {}",
        sanitize_dsn(&config.database.postgres_url)
    );
    let pool = DatabasePool::new(
        &config.database.postgres_url,
        config.database.max_connections,
    )
    .await?;
    pool.init_schema().await?;
    Ok(Arc::new(pool))
}

fn spawn_rate_limit_cleanup(state: &SecurityState) {
    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup();
        }
    });
}
