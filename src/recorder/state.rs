//! Recording state management
//!
//! Defines the session state machine, the recorder's own state, the events
//! broadcast to observers, and the finalized media object.

use crate::capture::CaptureStream;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current state of the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No recording in progress
    #[default]
    Idle,
    /// Waiting for the platform to grant a screen share
    Acquiring,
    /// Capturing and accumulating chunks
    Recording,
    /// Waiting for the encoder to flush its last fragment
    Stopping,
    /// Committing the assembled recording to staging and delivery
    Finalizing,
}

impl SessionState {
    /// Whether a forced teardown has anything to stop
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Stopping | Self::Finalizing)
    }
}

/// State of the chunked recorder itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    #[default]
    Inactive,
    Recording,
    Stopping,
}

/// Why the host is tearing the session down
///
/// Hosts map whatever concrete lifecycle event fired (visibility change,
/// navigation, unload, window close) onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownReason {
    /// The tab was backgrounded; async work can still complete
    Hidden,
    /// The user is navigating away
    Navigation,
    /// The page or process is going away
    Unload,
}

impl TeardownReason {
    /// Unload-class events cannot await network confirmation
    pub fn is_unload_class(&self) -> bool {
        matches!(self, Self::Navigation | Self::Unload)
    }
}

/// The live capture in progress
#[derive(Debug, Clone)]
pub struct RecordingSession {
    /// Active capture source, replaced wholesale on reacquire
    pub stream: CaptureStream,

    /// When the session entered Recording
    pub started_at: DateTime<Utc>,

    /// Number of successful reacquires in this session
    pub reacquire_count: u32,

    /// Set when the source was lost and could not be reacquired
    pub source_lost: bool,
}

impl RecordingSession {
    pub fn new(stream: CaptureStream) -> Self {
        Self {
            stream,
            started_at: Utc::now(),
            reacquire_count: 0,
            source_lost: false,
        }
    }

    /// Elapsed recording time in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0)
    }
}

/// An assembled media object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl MediaBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Events emitted during a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved to a new state
    StateChanged(SessionState),
    /// Recording started
    Started,
    /// Recording stopped with the given number of bytes captured
    Stopped { bytes: usize },
    /// A lost source was replaced
    Reacquired { attempt: u32 },
    /// The source was lost and could not be replaced
    SourceLost,
    /// A finalized recording was written to staging
    Staged { id: String },
    /// A recording reached the ingestion service (or the beacon queue)
    Delivered { id: Option<String> },
    /// Nothing was captured, so nothing was staged
    Discarded,
    /// Periodic elapsed-time report (milliseconds)
    Progress(i64),
    /// A non-fatal error occurred
    Error(String),
}
