use crate::response::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    SqlError(#[from] sqlx::Error),
    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] vendors::Error),
    #[error("Registry error: {0}")]
    RegistryError(#[from] instrument::Error),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Illegal job transition: {0}")]
    StateError(String),
    #[error("Request error: {0}")]
    TracingError(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("Io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Io error: {0}")]
    EnvVarError(#[from] std::env::VarError),
    #[error("Serde Json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] instrument::symbols::ParseError),
    #[error("Custom error: {0}")]
    CustomError(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Error::SqlError(ref msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
            Error::FetchFailed(ref msg) => (StatusCode::BAD_GATEWAY, msg.to_string()),
            Error::RegistryError(ref msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
            Error::ConfigurationError(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::StateError(ref msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::TracingError(ref msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            Error::IoError(ref msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
            Error::EnvVarError(ref msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
            Error::SerdeJsonError(ref msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            Error::ParseError(ref msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            Error::CustomError(ref msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        ApiResponse {
            status: "failed".to_string(),
            message,
            code: status.as_u16(),
            data: "".to_string(),
        }
        .into_response()
    }
}

#[macro_export]
macro_rules! error {
    ($variant:ident, $($arg:tt)*) => {
        Error::$variant(format!($($arg)*))
    };
}

pub type Result<T> = std::result::Result<T, Error>;
