use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use showtime_booking::{
    app,
    cache::CacheService,
    config::{Config, StoreConfig},
    database::Database,
    redis_client::RedisClient,
    services::{ExpiryReaper, ReservationCoordinator},
    store::{MemoryStore, PgStore, Store},
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.app.rust_log));
    let registry = tracing_subscriber::registry().with(filter);
    if config.app.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!(environment = %config.app.environment, "Starting showtime booking service");

    let (store, database): (Arc<dyn Store>, Option<Database>) = match &config.store {
        StoreConfig::Postgres(db_config) => {
            let db = Database::connect(db_config)
                .await
                .context("failed to connect to PostgreSQL")?;
            db.run_migrations().await.context("failed to run migrations")?;
            (Arc::new(PgStore::new(db.clone())), Some(db))
        }
        StoreConfig::Memory => {
            warn!("Using the in-memory store; bookings are lost on restart");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let mut coordinator = ReservationCoordinator::new(store, config.booking.clone());

    let cache = match &config.redis {
        Some(redis_config) => match RedisClient::connect(&redis_config.url).await {
            Ok(redis) => {
                info!("Redis connected, seat map cache enabled");
                Some(CacheService::new(redis, redis_config.seat_cache_ttl_seconds))
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, seat map cache disabled");
                None
            }
        },
        None => None,
    };
    if let Some(cache) = &cache {
        coordinator = coordinator.with_cache(cache.clone());
    }
    let coordinator = Arc::new(coordinator);

    // --- Background tasks ---
    let reaper = ExpiryReaper::new(coordinator.clone(), config.reaper.clone()).spawn();

    // --- Web server ---
    let mut state = AppState::new(coordinator, config.clone());
    if let Some(db) = database {
        state = state.with_database(db);
    }
    if let Some(cache) = cache {
        state = state.with_cache(cache);
    }

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app(Arc::new(state)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    reaper.abort();
    Ok(())
}
