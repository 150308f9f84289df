//! Local staging of undelivered recordings
//!
//! A finalized recording lives here from the moment it is assembled until the
//! ingestion service acknowledges it. Removal is the only success signal.

pub mod schema;
pub mod store;

pub use schema::{
    extension_for_mime, recording_filename, trial_folder, RecordingMetadata, StagedRecording,
};
pub use store::{FileStagingStore, StagingError, StagingResult, StagingStore};
