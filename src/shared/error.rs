use axum::{response::IntoResponse, Json};

/// Workflow error taxonomy. Only `NotFound` and `Validation` are caller
/// errors; collaborator failures are absorbed by the orchestrator's
/// fallback policy and normally never reach the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Prediction error: {0}")]
    Prediction(String),
    #[error("Retrieval error: {0}")]
    Retrieval(String),
    #[error("Generation error: {0}")]
    Generation(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Connection pool error: {0}")]
    Pool(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<diesel::result::Error> for TriageError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for TriageError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

impl IntoResponse for TriageError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Prediction(msg)
            | Self::Retrieval(msg)
            | Self::Generation(msg)
            | Self::Database(msg)
            | Self::Pool(msg)
            | Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
