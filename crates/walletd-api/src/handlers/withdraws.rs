use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::AppState;
use crate::dto::{ApiResponse, RejectWithdrawBody, RequestWithdrawBody, WithdrawResponse};
use crate::errors::ApiError;
use crate::middleware::{AdminUser, AuthUser};
use walletd_treasury::WithdrawRequest;

#[utoipa::path(
    post,
    path = "/v1/withdraws",
    tag = "Withdraws",
    responses((status = 200, description = "Withdraw requested, funds frozen"))
)]
pub async fn request_withdraw(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<RequestWithdrawBody>,
) -> Result<Json<ApiResponse<WithdrawResponse>>, ApiError> {
    let amount = BigDecimal::from_str(&body.amount)
        .map_err(|_| ApiError::bad_request("invalid amount"))?;

    let withdraw = state
        .withdraw_service
        .request_withdraw(
            &user.user_id,
            &WithdrawRequest {
                to_address: body.to_address,
                token_id: body.token_id,
                amount,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(withdraw.into())))
}

#[utoipa::path(
    get,
    path = "/v1/withdraws",
    tag = "Withdraws",
    responses((status = 200, description = "Withdraws of the caller"))
)]
pub async fn list_withdraws(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WithdrawResponse>>>, ApiError> {
    let withdraws = state.withdraw_service.list_withdraws(&user.user_id).await?;
    Ok(Json(ApiResponse::ok(
        withdraws.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/v1/withdraws/{withdraw_id}/approve",
    tag = "Withdraws",
    params(("withdraw_id" = Uuid, Path, description = "Withdraw identifier")),
    responses((status = 200, description = "Withdraw signed and broadcast"))
)]
pub async fn approve_withdraw(
    _admin: AdminUser,
    Path(withdraw_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<WithdrawResponse>>, ApiError> {
    let withdraw = state.withdraw_service.approve_withdraw(withdraw_id).await?;
    Ok(Json(ApiResponse::ok(withdraw.into())))
}

#[utoipa::path(
    post,
    path = "/v1/withdraws/{withdraw_id}/reject",
    tag = "Withdraws",
    params(("withdraw_id" = Uuid, Path, description = "Withdraw identifier")),
    responses((status = 200, description = "Withdraw rejected, funds released"))
)]
pub async fn reject_withdraw(
    _admin: AdminUser,
    Path(withdraw_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<RejectWithdrawBody>,
) -> Result<Json<ApiResponse<WithdrawResponse>>, ApiError> {
    let withdraw = state
        .withdraw_service
        .reject_withdraw(withdraw_id, body.reason)
        .await?;
    Ok(Json(ApiResponse::ok(withdraw.into())))
}
