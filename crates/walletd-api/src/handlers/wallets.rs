use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::dto::{
    ApiResponse, CreateWalletRequest, SignTransactionBody, SignTransactionResponse, WalletResponse,
};
use crate::errors::ApiError;
use crate::middleware::{AdminUser, AuthUser};
use walletd_keys::SignRequest;

#[utoipa::path(
    post,
    path = "/v1/wallets",
    tag = "Wallets",
    responses((status = 200, description = "Wallet created or returned"))
)]
pub async fn create_wallet(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateWalletRequest>,
) -> Result<Json<ApiResponse<WalletResponse>>, ApiError> {
    let wallet = state
        .wallet_service
        .create_wallet(&user.user_id, body.chain_id)
        .await?;
    Ok(Json(ApiResponse::ok(wallet.into())))
}

#[utoipa::path(
    get,
    path = "/v1/wallets",
    tag = "Wallets",
    responses((status = 200, description = "Wallets for the caller"))
)]
pub async fn list_wallets(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WalletResponse>>>, ApiError> {
    let wallets = state.wallet_service.list_wallets(&user.user_id).await?;
    Ok(Json(ApiResponse::ok(
        wallets.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/v1/wallets/{chain_id}/address",
    tag = "Wallets",
    params(("chain_id" = i32, Path, description = "EVM chain id")),
    responses((status = 200, description = "Deposit address on the chain"))
)]
pub async fn get_wallet_address(
    user: AuthUser,
    Path(chain_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let wallet = state.wallet_service.get_wallet(&user.user_id, chain_id).await?;
    Ok(Json(ApiResponse::ok(wallet.address)))
}

/// Signs an arbitrary transaction without broadcasting it. Admin-only test
/// surface for verifying derivation paths against known vectors.
#[utoipa::path(
    post,
    path = "/v1/transactions/sign",
    tag = "Wallets",
    responses((status = 200, description = "Signed transaction"))
)]
pub async fn sign_transaction(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(body): Json<SignTransactionBody>,
) -> Result<Json<ApiResponse<SignTransactionResponse>>, ApiError> {
    let data = match body.data.as_deref() {
        None | Some("") => Vec::new(),
        Some(raw) => hex::decode(raw.trim_start_matches("0x"))
            .map_err(|_| ApiError::bad_request("invalid data format"))?,
    };

    let signed = state.signer.sign_transaction(&SignRequest {
        chain_id: body.chain_id,
        to: body.to,
        value: body.value,
        gas_limit: body.gas_limit,
        max_fee_per_gas: body.max_fee_per_gas,
        max_priority_fee_per_gas: body.max_priority_fee_per_gas,
        nonce: body.nonce,
        data,
        from_address: body.from_address,
        derivation_path: body.derivation_path,
    });

    let signed = signed.map_err(|e| ApiError::from(anyhow::Error::from(e)))?;
    Ok(Json(ApiResponse::ok(SignTransactionResponse {
        raw_transaction: format!("0x{}", hex::encode(signed.raw_transaction)),
        tx_hash: signed.tx_hash,
    })))
}
