use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use legal_calc::Debt;

use crate::models::{DeadlineRequest, InterestRequest, IntervalRequest};
use crate::service::{self, ServiceError};
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match service::readiness(&state).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

fn rejected(rejection: JsonRejection) -> axum::response::Response {
    let err = ServiceError::invalid_input(rejection.body_text());
    (err.status, Json(err.body)).into_response()
}

pub async fn interval(payload: Result<Json<IntervalRequest>, JsonRejection>) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match service::interval(payload) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn interest(
    State(state): State<AppState>,
    payload: Result<Json<InterestRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match service::interest(&state, payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn deadline(payload: Result<Json<DeadlineRequest>, JsonRejection>) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match service::deadline(payload) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn debt(
    State(state): State<AppState>,
    payload: Result<Json<Debt>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match service::debt(&state, payload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn debt_xml(payload: Result<Json<Debt>, JsonRejection>) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match service::debt_xml(&payload) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn debt_csv(
    State(state): State<AppState>,
    payload: Result<Json<Debt>, JsonRejection>,
) -> impl IntoResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    match service::debt_csv(&state, &payload).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn import_xml(body: String) -> impl IntoResponse {
    match service::import_xml(&body) {
        Ok(debt) => (StatusCode::OK, Json(debt)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn import_csv(body: String) -> impl IntoResponse {
    match service::import_csv(&body) {
        Ok(transactions) => (StatusCode::OK, Json(transactions)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn holiday(Path(date): Path<String>) -> impl IntoResponse {
    match service::holiday(&date) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

pub async fn conventions() -> impl IntoResponse {
    (StatusCode::OK, Json(service::conventions()))
}
