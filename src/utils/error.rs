//! Error types and handling
//!
//! Common error types used across the pipeline.

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::recorder::RecorderError;
use crate::staging::StagingError;
use crate::upload::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecorderError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Error payload for hosts that report failures as JSON
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Capture(CaptureError::PermissionDenied) => "PERMISSION_DENIED",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Staging(_) => "STAGING_ERROR",
            AppError::Delivery(_) => "DELIVERY_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
