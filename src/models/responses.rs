use serde::{Deserialize, Serialize};

/// Successful answer to a query
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    /// Final text produced by the model
    pub response: String,
}

/// Error body, `detail` carries the human readable reason
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Main API response enum
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ApiResponse {
    Success(QueryResponse),
    Error(ErrorResponse),
}

impl From<QueryResponse> for ApiResponse {
    fn from(value: QueryResponse) -> Self {
        Self::Success(value)
    }
}

impl From<ErrorResponse> for ApiResponse {
    fn from(value: ErrorResponse) -> Self {
        Self::Error(value)
    }
}
