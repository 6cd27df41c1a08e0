use std::time::Duration;

use axum::{extract::DefaultBodyLimit, http::StatusCode, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    error::AppResult, middleware::cors::build_cors_layer, repository::ledger_store::SharedLedger,
    schemas::parse_uuid, state::AppState,
};

pub mod agreements;
pub mod health;
pub mod invoices;
pub mod organizations;
pub mod recurring;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(organizations::router())
        .merge(agreements::router())
        .merge(invoices::router())
        .merge(recurring::router())
}

/// Versioned API with the request-scoped layers. Rate limiting needs the
/// peer address and is added by the binary.
pub fn app_router(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&state.config))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            Duration::from_secs(state.config.request_timeout_seconds.max(1)),
        ))
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let router = match state.config.api_prefix.as_str() {
        "/" => v1_router(),
        prefix => Router::new().nest(prefix, v1_router()),
    };
    router
        .layer(layers)
        .with_state(state)
}

pub(crate) async fn org_ledger(state: &AppState, org_id: &str) -> AppResult<(Uuid, SharedLedger)> {
    let org_id = parse_uuid(org_id, "org_id")?;
    let ledger = state.store.ledger(org_id).await?;
    Ok((org_id, ledger))
}
