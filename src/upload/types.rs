//! Delivery types
//!
//! This module defines the tiers, outcomes and reports produced by the
//! upload dispatcher, plus the ingestion service's response body.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Escalating delivery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryTier {
    /// Awaited multipart request
    PrimaryRequest,
    /// Fire-and-forget transmission at unload time
    BeaconFallback,
    /// Save to a local file as the last resort
    LocalDownloadFallback,
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryOutcome {
    Success,
    Retryable,
    TerminalFailure,
}

/// Context the delivery runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    /// The user is present; a local save is allowed as last resort
    Interactive,
    /// No one is watching (on-load drain, hidden tab); network only
    Background,
    /// Nothing can be awaited; beacon only
    Unloading,
}

/// What happened during one `deliver` call
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,

    /// Tiers tried, in order
    pub tiers: Vec<DeliveryTier>,

    /// Where the local fallback wrote the recording, if it ran
    pub local_copy: Option<PathBuf>,

    /// Parsed acknowledgment from the ingestion service
    pub response: Option<IngestResponse>,
}

impl DeliveryReport {
    pub(crate) fn new() -> Self {
        Self {
            outcome: DeliveryOutcome::Retryable,
            tiers: Vec::new(),
            local_copy: None,
            response: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DeliveryOutcome::Success
    }
}

/// Totals for one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub pending: usize,
}

/// Ingestion service acknowledgment (informational only)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct IngestResponse {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub filename: Option<String>,
    pub size_mb: Option<f64>,
    pub status: Option<String>,
}

/// Transport-level delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Ingestion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to build request: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            TransportError::Build(error.to_string())
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_response_parses_service_body() {
        let body = r#"{"success": true, "message": "uploaded", "filename": "Trial_1_x.webm", "size_mb": 1.25, "status": "success"}"#;
        let parsed: IngestResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.success, Some(true));
        assert_eq!(parsed.size_mb, Some(1.25));
    }

    #[test]
    fn test_ingest_response_tolerates_missing_fields() {
        let parsed: IngestResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, IngestResponse::default());
    }

    #[test]
    fn test_report_defaults_to_retryable() {
        let report = DeliveryReport::new();
        assert!(!report.is_success());
        assert!(report.tiers.is_empty());
    }
}
