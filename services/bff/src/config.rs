use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::time::Duration;

use crate::middleware::RateLimitConfig;

// Edge gateway configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct BffConfig {
    // HTTP bind address for the RPC surface.
    pub bind_addr: SocketAddr,
    // Prometheus metrics bind address.
    pub metrics_bind: SocketAddr,
    // Expected `iss` claim (exact match).
    pub issuer: String,
    // Expected entry in the `aud` claim.
    pub audience: String,
    // Tolerance for exp/nbf validation.
    pub clock_skew: Duration,
    // IdP JWKS endpoint.
    pub jwks_url: String,
    // Scheduled background refresh cadence.
    pub jwks_refresh_interval: Duration,
    // On-demand refresh throttle (10 s floor).
    pub jwks_min_refresh_interval: Duration,
    pub rate_limit: RateLimitConfig,
    // Comma-separated exact procedure names that bypass authentication.
    pub public_endpoints: Vec<String>,
    // Header the fronting proxy sets with the client IP.
    pub trusted_proxy_header: String,
    pub user_service_url: String,
    // Deadline for downstream calls.
    pub backend_timeout: Duration,
}

impl BffConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("BFF_BIND", "0.0.0.0:8080")
            .parse()
            .with_context(|| "parse BFF_BIND")?;
        let metrics_bind = env_or("BFF_METRICS_BIND", "0.0.0.0:9090")
            .parse()
            .with_context(|| "parse BFF_METRICS_BIND")?;

        let issuer = required("AUTH_ISSUER_URL")?;
        let audience = required("AUTH_AUDIENCE")?;
        let jwks_url = required("AUTH_JWKS_URL")?;
        let user_service_url = required("USER_SERVICE_URL")?;

        let config = Self {
            bind_addr,
            metrics_bind,
            issuer,
            audience,
            clock_skew: secs_or("AUTH_CLOCK_SKEW_SECONDS", 30)?,
            jwks_url,
            jwks_refresh_interval: secs_or("JWKS_REFRESH_INTERVAL_SECONDS", 3600)?,
            jwks_min_refresh_interval: secs_or("JWKS_MIN_REFRESH_INTERVAL_SECONDS", 10)?,
            rate_limit: RateLimitConfig {
                failure_threshold: parse_or("AUTH_RATE_LIMIT_FAILURES", 10)?,
                window: secs_or("AUTH_RATE_LIMIT_WINDOW_SECONDS", 60)?,
                cooldown: secs_or("AUTH_RATE_LIMIT_COOLDOWN_SECONDS", 300)?,
            },
            public_endpoints: split_endpoints(&env_or("PUBLIC_ENDPOINTS", "")),
            trusted_proxy_header: env_or("TRUSTED_PROXY_HEADER", "X-Real-IP"),
            user_service_url,
            backend_timeout: secs_or("BACKEND_REQUEST_TIMEOUT_SECONDS", 10)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jwks_refresh_interval < Duration::from_secs(60) {
            bail!("JWKS_REFRESH_INTERVAL_SECONDS must be at least 60");
        }
        if self.jwks_min_refresh_interval < Duration::from_secs(10) {
            bail!("JWKS_MIN_REFRESH_INTERVAL_SECONDS must be at least 10");
        }
        if self.rate_limit.failure_threshold < 1 {
            bail!("AUTH_RATE_LIMIT_FAILURES must be at least 1");
        }
        if self.rate_limit.window < Duration::from_secs(1) {
            bail!("AUTH_RATE_LIMIT_WINDOW_SECONDS must be at least 1");
        }
        if self.rate_limit.cooldown < Duration::from_secs(1) {
            bail!("AUTH_RATE_LIMIT_COOLDOWN_SECONDS must be at least 1");
        }
        if self.backend_timeout < Duration::from_secs(1) {
            bail!("BACKEND_REQUEST_TIMEOUT_SECONDS must be at least 1");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String> {
    let value = std::env::var(key).unwrap_or_default();
    if value.is_empty() {
        bail!("{key} is required");
    }
    Ok(value)
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

fn split_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
