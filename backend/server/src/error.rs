use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ledger::LedgerError;
use redis::RedisError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Not signed in")]
    Unauthorized,

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid document: {0}")]
    InvalidDocument(LedgerError),

    #[error("{0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] RedisError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload | AppError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Ledger(ledger_error) => match ledger_error {
                LedgerError::InvalidAmount
                | LedgerError::InvalidSelection { .. }
                | LedgerError::InvalidOutcome { .. }
                | LedgerError::InvalidAnswers { .. } => StatusCode::BAD_REQUEST,
                LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::PredictionNotActive(_)
                | LedgerError::PredictionCancelled(_)
                | LedgerError::AlreadySettled(_)
                | LedgerError::QuizNotActive(_)
                | LedgerError::QuizAlreadySubmitted(_)
                | LedgerError::QuizAlreadyPublished(_) => StatusCode::CONFLICT,
                LedgerError::CorruptDocument { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::from(LedgerError::InvalidAmount).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(LedgerError::InsufficientBalance {
                amount: 10,
                balance: 5
            })
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(LedgerError::AlreadySettled("p".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(LedgerError::not_found("User", "u")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(LedgerError::corrupt("bet", "bad")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_message_is_human_readable() {
        let message = AppError::from(LedgerError::InsufficientBalance {
            amount: 1200,
            balance: 1000,
        })
        .to_string();

        assert_eq!(
            message,
            "Insufficient points: bet of 1200 exceeds balance of 1000"
        );
    }
}
