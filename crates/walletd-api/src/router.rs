use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;

use crate::docs::ApiDoc;
use crate::{AppState, handlers};

pub fn api_router() -> Router<AppState> {
    let wallets = Router::new()
        .route("/", post(handlers::create_wallet).get(handlers::list_wallets))
        .route("/{chain_id}/address", get(handlers::get_wallet_address));

    let balances = Router::new()
        .route("/total", get(handlers::get_total_balance))
        .route("/pending", get(handlers::get_pending_deposit_balance))
        .route("/tokens", get(handlers::get_balance_by_token));

    let withdraws = Router::new()
        .route(
            "/",
            post(handlers::request_withdraw).get(handlers::list_withdraws),
        )
        .route("/{withdraw_id}/approve", post(handlers::approve_withdraw))
        .route("/{withdraw_id}/reject", post(handlers::reject_withdraw));

    Router::new()
        .route("/health", get(health))
        .nest("/v1/wallets", wallets)
        .nest("/v1/balances", balances)
        .nest("/v1/withdraws", withdraws)
        .route("/v1/chains", get(handlers::list_chains))
        .route(
            "/v1/chains/{chain_id}/scan-progress",
            get(handlers::get_scan_progress),
        )
        .route("/v1/deposits", get(handlers::list_deposits))
        .route("/v1/deposits/pending", get(handlers::list_pending_deposits))
        .route(
            "/v1/collects",
            post(handlers::trigger_collect).get(handlers::list_collects),
        )
        .route("/v1/rebalances", post(handlers::trigger_rebalance))
        .route("/v1/hot-wallets", post(handlers::create_hot_wallet))
        .route("/v1/transactions/sign", post(handlers::sign_transaction))
        .route("/v1/docs/openapi.json", get(openapi_json))
        .fallback(handler_404)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn openapi_json() -> impl IntoResponse {
    axum::Json(ApiDoc::openapi())
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}
