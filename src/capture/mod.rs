//! Screen capture sources
//!
//! This module wraps the platform's screen-share acquisition behind the
//! `CaptureSource` trait and provides the bounded reacquire loop used when
//! the user revokes sharing mid-recording.

pub mod reacquire;
pub mod stream;
pub mod traits;

pub use reacquire::{reacquire, ReacquireOutcome, ReacquirePolicy, StopHandle};
pub use stream::{CaptureStream, EndedTrigger, TrackSettings};
pub use traits::{CaptureConstraints, CaptureError, CaptureSource};
