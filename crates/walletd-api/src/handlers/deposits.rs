use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::dto::{ApiResponse, TransactionResponse};
use crate::errors::ApiError;
use crate::middleware::AuthUser;
use walletd_db::WalletdPool;
use walletd_db::models::Transaction;

#[utoipa::path(
    get,
    path = "/v1/deposits",
    tag = "Deposits",
    responses((status = 200, description = "Deposits into the caller's wallets"))
)]
pub async fn list_deposits(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, ApiError> {
    let deposits =
        deposits_for_user(&state, &user.user_id, &["confirmed", "safe", "finalized", "failed"])
            .await?;
    Ok(Json(ApiResponse::ok(deposits)))
}

#[utoipa::path(
    get,
    path = "/v1/deposits/pending",
    tag = "Deposits",
    responses((status = 200, description = "Deposits still awaiting finality"))
)]
pub async fn list_pending_deposits(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, ApiError> {
    let deposits = deposits_for_user(&state, &user.user_id, &["confirmed", "safe"]).await?;
    Ok(Json(ApiResponse::ok(deposits)))
}

async fn deposits_for_user(
    state: &AppState,
    user_id: &str,
    statuses: &'static [&'static str],
) -> Result<Vec<TransactionResponse>, ApiError> {
    let wallets = state.wallet_service.list_wallets(user_id).await?;
    let addresses: Vec<String> = wallets.into_iter().map(|w| w.address).collect();
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    let deposits = state
        .pool
        .interact_with_context(format!("list deposits for {user_id}"), move |conn| {
            Transaction::find_deposits_for_addresses(&addresses, statuses, conn)
        })
        .await?;

    Ok(deposits.into_iter().map(Into::into).collect())
}
