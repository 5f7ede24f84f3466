pub mod cache;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use services::ReservationCoordinator;

// Shared state for every handler
pub struct AppState {
    pub coordinator: Arc<ReservationCoordinator>,
    pub database: Option<database::Database>,
    pub cache: Option<cache::CacheService>,
    pub config: config::Config,
}

impl AppState {
    pub fn new(coordinator: Arc<ReservationCoordinator>, config: config::Config) -> Self {
        Self {
            coordinator,
            database: None,
            cache: None,
            config,
        }
    }

    pub fn with_database(mut self, database: database::Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_cache(mut self, cache: cache::CacheService) -> Self {
        self.cache = Some(cache);
        self
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(controllers::health::liveness))
        .route("/health/ready", get(controllers::health::readiness))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
