use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

use crate::mcp::McpError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{}", ErrorMessages::NoConnections)]
    NoActiveConnections,

    #[error("Invalid tool call format: {0}")]
    InvalidToolCall(String),

    #[error("LLM API call failed: {0}")]
    Llm(String),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error("{}", ErrorMessages::Timeout)]
    Timeout,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    /// HTTP status a failed `/mcpcall` answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoActiveConnections | ApiError::InvalidToolCall(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Fixed messages for the API responses
pub enum ErrorMessages {
    NoConnections,
    Timeout,
}

impl fmt::Display for ErrorMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorMessages::NoConnections => "No active MCP connections",
            ErrorMessages::Timeout => "Request timeout",
        };
        write!(f, "{message}")
    }
}
