use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    conventions, deadline, debt, debt_csv, debt_xml, healthz, holiday, import_csv, import_xml,
    interest, interval, readyz,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/interval", post(interval))
        .route("/v1/interest", post(interest))
        .route("/v1/deadline", post(deadline))
        .route("/v1/debt", post(debt))
        .route("/v1/debt/xml", post(debt_xml))
        .route("/v1/debt/csv", post(debt_csv))
        .route("/v1/debt/import/xml", post(import_xml))
        .route("/v1/debt/import/csv", post(import_csv))
        .route("/v1/holidays/:date", get(holiday))
        .route("/v1/conventions", get(conventions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
