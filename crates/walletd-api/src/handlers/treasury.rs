use alloy::primitives::U256;
use axum::Json;
use axum::extract::{Query, State};

use crate::AppState;
use crate::dto::{
    ApiResponse, CreateHotWalletBody, TransactionResponse, TriggerCollectBody,
    TriggerRebalanceBody, TriggeredResponse, WalletResponse,
};
use crate::errors::ApiError;
use crate::handlers::balances::ChainFilter;
use crate::middleware::{AdminUser, AuthUser};
use walletd_treasury::RebalanceRequest;

#[utoipa::path(
    post,
    path = "/v1/collects",
    tag = "Treasury",
    responses((status = 200, description = "Collection sweep triggered"))
)]
pub async fn trigger_collect(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<TriggerCollectBody>,
) -> Result<Json<ApiResponse<TriggeredResponse>>, ApiError> {
    let collect_service = state.collect_service.clone();
    let cancel = state.shutdown.clone();

    match (body.wallet_id, body.chain_id) {
        (Some(wallet_id), _) => {
            tokio::spawn(async move {
                if let Err(err) = collect_service.collect_wallet(wallet_id, &cancel).await {
                    tracing::error!(wallet_id = %wallet_id, error = %err, "manual wallet collect failed");
                }
            });
        }
        (None, Some(chain_id)) => {
            tokio::spawn(async move {
                if let Err(err) = collect_service.collect_for_chain(chain_id, &cancel).await {
                    tracing::error!(chain_id, error = %err, "manual chain collect failed");
                }
            });
        }
        (None, None) => {
            return Err(ApiError::bad_request("chain_id or wallet_id is required"));
        }
    }

    Ok(Json(ApiResponse::ok(TriggeredResponse { triggered: true })))
}

#[utoipa::path(
    get,
    path = "/v1/collects",
    tag = "Treasury",
    responses((status = 200, description = "Collect transactions"))
)]
pub async fn list_collects(
    _user: AuthUser,
    Query(filter): Query<ChainFilter>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, ApiError> {
    let collects = state.collect_service.list_collects(filter.chain_id).await?;
    Ok(Json(ApiResponse::ok(
        collects.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/v1/rebalances",
    tag = "Treasury",
    responses((status = 200, description = "Rebalance triggered"))
)]
pub async fn trigger_rebalance(
    _user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<TriggerRebalanceBody>,
) -> Result<Json<ApiResponse<TriggeredResponse>>, ApiError> {
    let rebalance_service = state.rebalance_service.clone();
    let cancel = state.shutdown.clone();

    match (body.from_address, body.to_address, body.amount_wei) {
        (Some(from_address), Some(to_address), Some(amount_wei)) => {
            let amount = U256::from_str_radix(&amount_wei, 10)
                .map_err(|_| ApiError::bad_request("invalid amount"))?;
            let request = RebalanceRequest {
                chain_id: body.chain_id,
                from_address,
                to_address,
                amount,
            };
            tokio::spawn(async move {
                if let Err(err) = rebalance_service.rebalance(&request, &cancel).await {
                    tracing::error!(error = %err, "manual rebalance failed");
                }
            });
        }
        (None, None, None) => {
            let chain_id = body.chain_id;
            tokio::spawn(async move {
                if let Err(err) = rebalance_service.rebalance_for_chain(chain_id, &cancel).await {
                    tracing::error!(chain_id, error = %err, "chain rebalance failed");
                }
            });
        }
        _ => {
            return Err(ApiError::bad_request(
                "from_address, to_address and amount_wei must be provided together",
            ));
        }
    }

    Ok(Json(ApiResponse::ok(TriggeredResponse { triggered: true })))
}

#[utoipa::path(
    post,
    path = "/v1/hot-wallets",
    tag = "Treasury",
    responses((status = 200, description = "Hot wallet created"))
)]
pub async fn create_hot_wallet(
    admin: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CreateHotWalletBody>,
) -> Result<Json<ApiResponse<WalletResponse>>, ApiError> {
    let wallet = state
        .hot_wallet_service
        .create_hot_wallet(
            &admin.0.user_id,
            body.chain_id,
            body.device_name.as_deref().unwrap_or(""),
        )
        .await?;
    Ok(Json(ApiResponse::ok(wallet.into())))
}
