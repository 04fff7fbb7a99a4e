use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::dto::{ApiResponse, ChainResponse, ScanProgressResponse};
use crate::errors::ApiError;
use crate::middleware::AuthUser;
use walletd_db::WalletdPool;
use walletd_db::models::Chain;

#[utoipa::path(
    get,
    path = "/v1/chains",
    tag = "Chains",
    responses((status = 200, description = "All configured chains"))
)]
pub async fn list_chains(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ChainResponse>>>, ApiError> {
    let chains = state
        .pool
        .interact_with_context("list chains".to_string(), Chain::find_all)
        .await?;
    Ok(Json(ApiResponse::ok(
        chains.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/v1/chains/{chain_id}/scan-progress",
    tag = "Chains",
    params(("chain_id" = i32, Path, description = "EVM chain id")),
    responses((status = 200, description = "Scanner position against the chain tip"))
)]
pub async fn get_scan_progress(
    _user: AuthUser,
    Path(chain_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ScanProgressResponse>>, ApiError> {
    let progress = state.indexer.scan_progress(chain_id).await?;
    Ok(Json(ApiResponse::ok(ScanProgressResponse {
        chain_id: progress.chain_id,
        latest_block: progress.latest_block,
        scanned_to: progress.scanned_to,
        status: progress.status.to_string(),
    })))
}
