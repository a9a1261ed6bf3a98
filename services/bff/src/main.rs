// Mercata edge gateway (BFF)
// --------------------------
// Terminates client RPC traffic, verifies bearer tokens against the IdP's
// rotating key set, enforces per-IP failure rate limits and object-level
// authorization, and proxies verified requests to backend services with the
// identity forwarded in reserved headers.
//
// Startup is strict: the initial JWKS fetch must succeed or the process
// exits, because serving without key material turns every request into an
// opaque 401.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use bff::app::{AppState, build_router};
use bff::auth::{Authorizer, KeySetCache, KeySetConfig, TokenValidator, ValidatorConfig};
use bff::client::ConnectClient;
use bff::config::BffConfig;
use bff::middleware::{AuthState, FailureRateLimiter, HeaderSanitizer, PublicEndpointMatcher};
use bff::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let metrics_handle = observability::init_observability();
    let config = BffConfig::from_env().context("load bff config")?;

    let key_set = KeySetCache::connect(KeySetConfig {
        url: config.jwks_url.clone(),
        refresh_interval: config.jwks_refresh_interval,
        min_refresh_interval: config.jwks_min_refresh_interval,
    })
    .await
    .context("initial JWKS fetch")?;
    tracing::info!(keys = key_set.key_count(), "key set cache ready");

    let validator = Arc::new(TokenValidator::new(
        ValidatorConfig {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            clock_skew: config.clock_skew,
        },
        Arc::clone(&key_set),
    ));
    let rate_limiter = FailureRateLimiter::new(config.rate_limit.clone());
    let public_endpoints = Arc::new(PublicEndpointMatcher::new(config.public_endpoints.clone()));

    let auth = AuthState {
        validator,
        rate_limiter: Arc::clone(&rate_limiter),
        public_endpoints,
        trusted_proxy_header: config.trusted_proxy_header.clone(),
    };
    let state = AppState {
        user_client: ConnectClient::new(config.user_service_url.clone(), config.backend_timeout),
        authorizer: Authorizer::new(),
        key_set: Arc::clone(&key_set),
    };

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state, auth, HeaderSanitizer::default());
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "bff listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    rate_limiter.close();
    key_set.close();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
