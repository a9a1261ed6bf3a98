// Mercata product service
// -----------------------
// Catalog reads plus the inventory reservation engine: transactional
// multi-item stock holds with idempotency keys, TTL expiry, and a
// background expirer that returns abandoned holds to available stock.
//
// Storage backend selection follows the environment: DATABASE_URL picks
// Postgres (migrations run at startup), otherwise an in-memory store serves
// local development. REDIS_URL enables the idempotency store; without it,
// idempotency keys are accepted but have no effect.
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;

use product::app::{AppState, build_router};
use product::config::ProductConfig;
use product::idempotency::{
    IdempotencyStore, MemoryIdempotencyStore, NoopIdempotencyStore, RedisIdempotencyStore,
};
use product::observability;
use product::store::{ProductStore, memory::MemoryStore, postgres::PostgresStore};
use product::usecase::{ReservationUseCase, ReservationUseCaseConfig};
use product::worker::ReservationExpirer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let metrics_handle = observability::init_observability();
    let config = ProductConfig::from_env().context("load product config")?;

    let store: Arc<dyn ProductStore> = match &config.postgres {
        Some(pg) => Arc::new(
            PostgresStore::connect(pg)
                .await
                .map_err(|err| anyhow::anyhow!("connect postgres: {err}"))?,
        ),
        None => {
            tracing::warn!("DATABASE_URL unset; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!(backend = store.backend_name(), "product store ready");

    let idempotency: Arc<dyn IdempotencyStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisIdempotencyStore::connect(url, "")
                .await
                .map_err(|err| anyhow::anyhow!("connect redis: {err}"))?,
        ),
        None if config.postgres.is_none() => {
            // Local development pairing: memory store + memory idempotency.
            Arc::new(MemoryIdempotencyStore::new())
        }
        None => {
            tracing::warn!("REDIS_URL unset; idempotency keys are inert");
            Arc::new(NoopIdempotencyStore)
        }
    };

    let reservations = Arc::new(ReservationUseCase::new(
        Arc::clone(&store),
        idempotency,
        ReservationUseCaseConfig {
            max_batch_size: config.max_batch_size,
            default_ttl: config.reservation_ttl,
            idempotency_ttl: config.idempotency_ttl,
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let expirer = ReservationExpirer::new(
        Arc::clone(&store),
        config.ttl_worker_interval,
        config.ttl_worker_batch_size,
    );
    let expirer_handle = tokio::spawn(expirer.run(shutdown_rx));

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let state = AppState {
        store,
        reservations,
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "product service listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the expirer before exiting; in-flight work completes atomically.
    let _ = shutdown_tx.send(true);
    let _ = expirer_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
