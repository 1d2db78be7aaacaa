//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidAddress(String),

    #[error("Max requests exceeded. IP banned temporarily.")]
    RateLimited,

    #[error("This address is in cooldown.")]
    Cooldown,

    #[error("This wallet address is already in drip pool.")]
    AlreadyQueued,

    #[error("The session id is invalid.")]
    UnknownSession,

    #[error("The captcha solution is invalid.")]
    WrongSolution,

    #[error("Maximum number of attempts reached for sending a valid captcha.")]
    TooManyAttempts,

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Insufficient funds: batch needs {needed}, wallet holds {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl FaucetError {
    /// Whether the error is caused by the caller rather than by the faucet
    /// or one of its backends.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            FaucetError::InvalidInput(_)
                | FaucetError::InvalidAddress(_)
                | FaucetError::RateLimited
                | FaucetError::Cooldown
                | FaucetError::AlreadyQueued
                | FaucetError::UnknownSession
                | FaucetError::WrongSolution
                | FaucetError::TooManyAttempts
        )
    }
}

impl From<bincode::Error> for FaucetError {
    fn from(err: bincode::Error) -> Self {
        FaucetError::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for FaucetError {
    fn from(err: prometheus::Error) -> Self {
        FaucetError::Metrics(err.to_string())
    }
}

impl From<reqwest::Error> for FaucetError {
    fn from(err: reqwest::Error) -> Self {
        FaucetError::ExternalService(err.to_string())
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
