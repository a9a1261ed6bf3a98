use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::time::Duration;

// Product service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct ProductConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    // Postgres when DATABASE_URL is set; in-memory otherwise.
    pub postgres: Option<PostgresConfig>,
    // Redis idempotency store; disabled when unset.
    pub redis_url: Option<String>,
    // Default reservation expiry (1 m <= ttl <= 1 h).
    pub reservation_ttl: Duration,
    // Expirer cadence (10 s <= interval <= 5 m).
    pub ttl_worker_interval: Duration,
    pub ttl_worker_batch_size: i64,
    // Upper bound on items per batch reserve (1..=100).
    pub max_batch_size: usize,
    pub idempotency_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl ProductConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("PRODUCT_BIND", "0.0.0.0:8081")
            .parse()
            .with_context(|| "parse PRODUCT_BIND")?;
        let metrics_bind = env_or("PRODUCT_METRICS_BIND", "0.0.0.0:9091")
            .parse()
            .with_context(|| "parse PRODUCT_METRICS_BIND")?;

        let postgres = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Some(PostgresConfig {
                url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
                acquire_timeout_ms: parse_or("DATABASE_ACQUIRE_TIMEOUT_MS", 5000)?,
            }),
            _ => None,
        };
        let redis_url = std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let config = Self {
            bind_addr,
            metrics_bind,
            postgres,
            redis_url,
            reservation_ttl: secs_or("RESERVATION_TTL_SECONDS", 900)?,
            ttl_worker_interval: secs_or("TTL_WORKER_INTERVAL_SECONDS", 30)?,
            ttl_worker_batch_size: parse_or("TTL_WORKER_BATCH_SIZE", 100)?,
            max_batch_size: parse_or("MAX_BATCH_SIZE", 50)?,
            idempotency_ttl: secs_or("IDEMPOTENCY_KEY_TTL_SECONDS", 86_400)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_batch_size < 1 || self.max_batch_size > 100 {
            bail!(
                "MAX_BATCH_SIZE must be between 1 and 100, got {}",
                self.max_batch_size
            );
        }
        if self.reservation_ttl < Duration::from_secs(60)
            || self.reservation_ttl > Duration::from_secs(3600)
        {
            bail!(
                "RESERVATION_TTL_SECONDS must be between 1 minute and 1 hour, got {:?}",
                self.reservation_ttl
            );
        }
        if self.ttl_worker_interval < Duration::from_secs(10)
            || self.ttl_worker_interval > Duration::from_secs(300)
        {
            bail!(
                "TTL_WORKER_INTERVAL_SECONDS must be between 10 seconds and 5 minutes, got {:?}",
                self.ttl_worker_interval
            );
        }
        if self.ttl_worker_batch_size < 1 {
            bail!("TTL_WORKER_BATCH_SIZE must be at least 1");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: u64) -> Result<Duration> {
    Ok(Duration::from_secs(parse_or(key, default)?))
}
