mod app;
mod handlers;
mod models;
mod service;
mod state;

use std::{process::ExitCode, sync::Arc, time::Duration};

use tokio::sync::RwLock;

use legal_calc::RateTable;
use legal_common::{bind_listener, env_or, init_tracing, shutdown_signal, RunMode};
use legal_store::PgStore;

use crate::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let _guards = init_tracing("calc-service", "info", RunMode::Daemon);

    let port = env_or("PORT", 8080u16);
    let rates_refresh = Duration::from_secs(env_or("RATES_REFRESH_SECS", 3600u64).max(1));

    let store = match std::env::var("DATABASE_URL") {
        Ok(url) => match PgStore::connect(&url).await {
            Ok(store) => Some(store),
            Err(err) => {
                tracing::error!(error = %err, "database connection failed");
                return ExitCode::FAILURE;
            }
        },
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, statutory interest is unavailable");
            None
        }
    };

    let state = AppState {
        rates: Arc::new(RwLock::new(RateTable::new())),
        store,
        rates_refresh,
    };
    match service::reload_rates(&state).await {
        Ok(count) => tracing::info!(count, "rate table loaded"),
        Err(err) => tracing::warn!(error = %err.body.message, "rate table not loaded"),
    }
    if state.store.is_some() {
        tokio::spawn(refresh_rates(state.clone()));
    }

    let app = app::build_router(state);
    let listener = match bind_listener(port).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, port, "bind failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(port, "calc-service listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Picks up rates written by the `cnb.cron_update` job.
async fn refresh_rates(state: AppState) {
    let mut ticker = tokio::time::interval(state.rates_refresh);
    // The first tick fires immediately and the table was just loaded.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match service::reload_rates(&state).await {
            Ok(count) => tracing::debug!(count, "rate table refreshed"),
            Err(err) => tracing::warn!(error = %err.body.message, "rate refresh failed"),
        }
    }
}
