//! Staged recording schema
//!
//! Metadata carried with every staged recording, the on-disk record format,
//! and the naming/normalization rules applied before upload.

use crate::recorder::MediaBlob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used when the host never set a trial or participant
pub const UNKNOWN: &str = "unknown";

/// Identifying metadata for one recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    /// File name the ingestion service stores the recording under
    pub filename: String,

    /// Trial identifier as provided by the host (e.g. `Trial_1`)
    pub trial_type: String,

    /// Participant identifier
    pub participant_id: String,

    /// When the recording was finalized
    pub created_at: DateTime<Utc>,
}

impl RecordingMetadata {
    /// Build metadata for a recording finalized now
    pub fn new(trial_type: Option<&str>, participant_id: Option<&str>, mime_type: &str) -> Self {
        let created_at = Utc::now();
        let trial_type = non_empty_or_unknown(trial_type);
        let participant_id = non_empty_or_unknown(participant_id);
        Self {
            filename: recording_filename(&trial_type, created_at, extension_for_mime(mime_type)),
            trial_type,
            participant_id,
            created_at,
        }
    }

    /// The trial's storage folder on the ingestion side
    pub fn trial_folder(&self) -> String {
        trial_folder(&self.trial_type)
    }
}

/// A finalized recording awaiting confirmed delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecording {
    /// Store-assigned identifier
    pub id: String,
    pub blob: MediaBlob,
    pub metadata: RecordingMetadata,
}

/// Record persisted next to the blob data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StagedRecord {
    pub id: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub metadata: RecordingMetadata,
}

fn non_empty_or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Map a trial identifier to the ingestion folder name
///
/// Unrecognized values pass through lower-cased.
pub fn trial_folder(trial_type: &str) -> String {
    match trial_type {
        "Trial_1" => "main_task_1".to_string(),
        "Trial_2" => "main_task_2".to_string(),
        "Test" => "test_task".to_string(),
        other => other.to_lowercase(),
    }
}

/// File extension for a recording MIME type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or_default().trim();
    match base {
        "video/mp4" => "mp4",
        _ => "webm",
    }
}

/// Compact timestamp safe for file names (`20250114T093015123Z`)
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.', '-'], "")
}

/// `<prefix>_<timestamp>.<ext>`
pub fn recording_filename(prefix: &str, at: DateTime<Utc>, extension: &str) -> String {
    format!("{}_{}.{}", prefix, file_timestamp(at), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trial_folder_mapping() {
        assert_eq!(trial_folder("Trial_1"), "main_task_1");
        assert_eq!(trial_folder("Trial_2"), "main_task_2");
        assert_eq!(trial_folder("Test"), "test_task");
        assert_eq!(trial_folder("Pilot_A"), "pilot_a");
    }

    #[test]
    fn test_recording_filename() {
        let at = Utc.with_ymd_and_hms(2025, 1, 14, 9, 30, 15).unwrap();
        assert_eq!(
            recording_filename("Trial_1", at, "webm"),
            "Trial_1_20250114T093015000Z.webm"
        );
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("video/webm;codecs=vp9"), "webm");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime(""), "webm");
    }

    #[test]
    fn test_metadata_defaults_to_unknown() {
        let meta = RecordingMetadata::new(None, Some("  "), "video/webm");
        assert_eq!(meta.trial_type, UNKNOWN);
        assert_eq!(meta.participant_id, UNKNOWN);
        assert!(meta.filename.starts_with("unknown_"));
        assert!(meta.filename.ends_with(".webm"));
    }

    #[test]
    fn test_metadata_roundtrip_camel_case() {
        let meta = RecordingMetadata::new(Some("Test"), Some("P042"), "video/mp4");
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"participantId\":\"P042\""));
        assert!(json.contains("\"trialType\":\"Test\""));
        assert_eq!(meta.trial_folder(), "test_task");
    }
}
