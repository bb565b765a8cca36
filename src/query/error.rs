// Copyright 2025 SILO Project Authors. Licensed under Apache-2.0.

use serde_json::json;

/// Errors surfaced to query clients.
///
/// `BadRequest` is always a client fault (malformed JSON, unknown node or
/// column, out-of-range position); `Internal` is always a bug (an invariant
/// of the engine failed). The HTTP boundary formats both exactly once.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl QueryError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        QueryError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QueryError::Internal(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::BadRequest(_) => "BadRequest",
            QueryError::Internal(_) => "InternalError",
        }
    }

    /// The error document the boundary returns to clients.
    pub fn to_response(&self) -> serde_json::Value {
        json!({ "error": self.kind(), "message": self.to_string() })
    }
}

/// `Result` with [`QueryError`], the pervasive result type of the engine.
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_document_carries_kind_and_message() {
        let error = QueryError::bad_request("unknown column \"region\"");
        assert_eq!(
            error.to_response(),
            json!({"error": "BadRequest", "message": "unknown column \"region\""})
        );
        assert_eq!(QueryError::internal("x").kind(), "InternalError");
    }
}
