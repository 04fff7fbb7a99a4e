use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::dto::ApiResponse;

/// HTTP-facing error. Service errors carry stable textual tags which this
/// layer classifies into status codes without rewriting the message.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Stable tags may sit below added context; inspect the whole chain.
        for cause in err.chain() {
            let message = cause.to_string();

            if message.ends_with("not found")
                || message.contains("not found or inactive")
                || message.contains("receipt not found")
            {
                return Self::NotFound(message);
            }
            if message.starts_with("withdraw status is")
                || message.contains("already exists")
                || message.contains("no frozen credits")
            {
                return Self::Conflict(message);
            }
            if message.starts_with("invalid")
                || message.starts_with("insufficient")
                || message.contains("only user wallets")
                || message.contains("does not match")
                || message.contains("does not support EIP-1559")
            {
                return Self::BadRequest(message);
            }
        }

        tracing::error!(error = %format!("{err:#}"), "unhandled service error");
        Self::Internal
    }
}

impl From<walletd_db::DatabaseError> for ApiError {
    fn from(err: walletd_db::DatabaseError) -> Self {
        if err.is_not_found() {
            Self::NotFound("the requested resource was not found".to_string())
        } else {
            tracing::error!(error = %err, "database error");
            Self::Internal
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        let body: ApiResponse<()> = ApiResponse::error(message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn classifies_stable_tags() {
        assert!(matches!(ApiError::from(anyhow!("wallet not found")), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from(anyhow!("chain not found or inactive")),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(anyhow!("insufficient balance")),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(anyhow!("invalid amount")),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(anyhow!("withdraw status is failed, expected user_withdraw_request")),
            ApiError::Conflict(_)
        ));
    }

    #[test]
    fn classifies_wrapped_tags() {
        let err = anyhow!("insufficient balance").context("failed to request withdraw");
        assert!(matches!(ApiError::from(err), ApiError::BadRequest(_)));
    }

    #[test]
    fn unknown_errors_stay_opaque() {
        assert!(matches!(ApiError::from(anyhow!("pg exploded")), ApiError::Internal));
    }
}
