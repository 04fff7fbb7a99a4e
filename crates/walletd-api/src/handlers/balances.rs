use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::dto::{ApiResponse, BalanceResponse, TokenBalanceResponse};
use crate::errors::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct ChainFilter {
    #[serde(default)]
    pub chain_id: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/v1/balances/total",
    tag = "Balances",
    responses((status = 200, description = "Finalized balance sum"))
)]
pub async fn get_total_balance(
    user: AuthUser,
    Query(filter): Query<ChainFilter>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BalanceResponse>>, ApiError> {
    let total = state
        .balance_service
        .total_balance(&user.user_id, filter.chain_id)
        .await?;
    Ok(Json(ApiResponse::ok(BalanceResponse {
        amount: total.normalized().to_string(),
    })))
}

#[utoipa::path(
    get,
    path = "/v1/balances/pending",
    tag = "Balances",
    responses((status = 200, description = "Deposits not yet finalized"))
)]
pub async fn get_pending_deposit_balance(
    user: AuthUser,
    Query(filter): Query<ChainFilter>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BalanceResponse>>, ApiError> {
    let total = state
        .balance_service
        .pending_deposit_balance(&user.user_id, filter.chain_id)
        .await?;
    Ok(Json(ApiResponse::ok(BalanceResponse {
        amount: total.normalized().to_string(),
    })))
}

#[utoipa::path(
    get,
    path = "/v1/balances/tokens",
    tag = "Balances",
    responses((status = 200, description = "Finalized balances grouped by token"))
)]
pub async fn get_balance_by_token(
    user: AuthUser,
    Query(filter): Query<ChainFilter>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TokenBalanceResponse>>>, ApiError> {
    let balances = state
        .balance_service
        .balance_by_token(&user.user_id, filter.chain_id)
        .await?;
    Ok(Json(ApiResponse::ok(
        balances.into_iter().map(Into::into).collect(),
    )))
}
