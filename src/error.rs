//! Error types for the financial planning assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Model Call Errors
    // =============================

    #[error("Model transport error: {0}")]
    ModelTransport(String),

    #[error("Model API error: {0}")]
    ModelApi(String),

    #[error("Empty model response: {0}")]
    EmptyModelResponse(String),

    #[error("Model not configured: {0}")]
    ModelNotConfigured(String),

    // =============================
    // Storage Errors
    // =============================

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
