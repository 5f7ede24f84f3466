use chrono::Duration as HoldDuration;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("{0}")]
    Invalid(String),
}

// Root configuration, one section per concern.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub redis: Option<RedisConfig>,
    pub booking: BookingSettings,
    pub reaper: ReaperConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub json_logs: bool,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(DatabaseConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub seat_cache_ttl_seconds: u64,
}

/// Hold and retry policy applied by the reservation coordinator.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub hold_duration: HoldDuration,
    pub max_conflict_retries: u32,
    pub conflict_backoff: Duration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            hold_duration: HoldDuration::minutes(10),
            max_conflict_retries: 3,
            conflict_backoff: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub batch_size: u32,
    pub concurrency: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 200,
            concurrency: 8,
        }
    }
}

// Flat view of the environment; every key is the lowercased variable name.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    host: String,
    port: u16,
    environment: String,
    rust_log: String,
    log_format: String,
    store_backend: String,
    database_url: Option<String>,
    db_pool_size: u32,
    db_acquire_timeout_seconds: u64,
    redis_url: Option<String>,
    seat_cache_ttl_seconds: u64,
    hold_minutes: i64,
    conflict_retries: u32,
    conflict_backoff_ms: u64,
    reaper_interval_seconds: u64,
    reaper_batch_size: u32,
    reaper_concurrency: usize,
}

impl Config {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(config::Environment::default().try_parsing(true))
    }

    pub fn load(environment: config::Environment) -> Result<Self, ConfigError> {
        let settings: EnvSettings = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 8000)?
            .set_default("environment", "development")?
            .set_default("rust_log", "showtime_booking=debug,tower_http=debug")?
            .set_default("log_format", "text")?
            .set_default("store_backend", "postgres")?
            .set_default("db_pool_size", 20)?
            .set_default("db_acquire_timeout_seconds", 5)?
            .set_default("seat_cache_ttl_seconds", 30)?
            .set_default("hold_minutes", 10)?
            .set_default("conflict_retries", 3)?
            .set_default("conflict_backoff_ms", 20)?
            .set_default("reaper_interval_seconds", 30)?
            .set_default("reaper_batch_size", 200)?
            .set_default("reaper_concurrency", 8)?
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.try_into()
    }
}

impl TryFrom<EnvSettings> for Config {
    type Error = ConfigError;

    fn try_from(env: EnvSettings) -> Result<Self, Self::Error> {
        let store = match env.store_backend.as_str() {
            "postgres" => StoreConfig::Postgres(DatabaseConfig {
                url: env
                    .database_url
                    .ok_or_else(|| ConfigError::Invalid("DATABASE_URL must be set for the postgres store".into()))?,
                pool_size: env.db_pool_size,
                acquire_timeout: Duration::from_secs(env.db_acquire_timeout_seconds),
            }),
            "memory" => StoreConfig::Memory,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"
                )))
            }
        };

        if env.hold_minutes <= 0 {
            return Err(ConfigError::Invalid("HOLD_MINUTES must be positive".into()));
        }
        if env.reaper_batch_size == 0 || env.reaper_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "REAPER_BATCH_SIZE and REAPER_CONCURRENCY must be positive".into(),
            ));
        }

        Ok(Config {
            app: AppConfig {
                host: env.host,
                port: env.port,
                environment: env.environment,
                rust_log: env.rust_log,
                json_logs: env.log_format.eq_ignore_ascii_case("json"),
            },
            store,
            redis: env.redis_url.filter(|url| !url.is_empty()).map(|url| RedisConfig {
                url,
                seat_cache_ttl_seconds: env.seat_cache_ttl_seconds,
            }),
            booking: BookingSettings {
                hold_duration: HoldDuration::minutes(env.hold_minutes),
                max_conflict_retries: env.conflict_retries,
                conflict_backoff: Duration::from_millis(env.conflict_backoff_ms),
            },
            reaper: ReaperConfig {
                interval: Duration::from_secs(env.reaper_interval_seconds),
                batch_size: env.reaper_batch_size,
                concurrency: env.reaper_concurrency,
            },
        })
    }
}
