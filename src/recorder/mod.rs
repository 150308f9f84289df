//! Recording system module
//!
//! This module implements the capture-to-staging half of the pipeline:
//! - MediaEncoder trait for the platform encoder
//! - ChunkedRecorder to accumulate timed fragments into one blob
//! - SessionCoordinator, the lifecycle state machine over everything

pub mod chunked;
pub mod coordinator;
pub mod encoder;
pub mod state;

pub use chunked::ChunkedRecorder;
pub use coordinator::{CommitOutcome, SessionCoordinator, TeardownReport};
pub use encoder::{MediaEncoder, RecorderError, RecorderResult};
pub use state::{
    MediaBlob, RecorderState, RecordingSession, SessionEvent, SessionState, TeardownReason,
};
