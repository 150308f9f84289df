//! In-memory stand-ins for the platform seams, shared by unit tests

use crate::capture::{
    CaptureConstraints, CaptureError, CaptureSource, CaptureStream, EndedTrigger, TrackSettings,
};
use crate::recorder::encoder::ChunkSender;
use crate::recorder::{MediaBlob, MediaEncoder, RecorderResult};
use crate::staging::{RecordingMetadata, StagedRecording, StagingError, StagingResult, StagingStore};
use crate::upload::{IngestResponse, IngestTransport, LocalSaver, TransportError, UploadForm};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Capture ---

/// Capture source that grants 1080p15 streams unless told to fail
#[derive(Default)]
pub struct FakeSource {
    failures: Mutex<VecDeque<CaptureError>>,
    calls: AtomicUsize,
    issued: Mutex<Vec<(CaptureStream, EndedTrigger)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` acquire calls with `error`
    pub fn fail_next(&self, count: usize, error: CaptureError) {
        let mut failures = self.failures.lock();
        failures.clear();
        failures.extend(std::iter::repeat(error).take(count));
    }

    pub fn acquire_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_stream(&self) -> Option<CaptureStream> {
        self.issued.lock().last().map(|(stream, _)| stream.clone())
    }

    /// The platform-side trigger for a stream this source issued
    pub fn trigger_for(&self, stream: &CaptureStream) -> Option<EndedTrigger> {
        self.issued
            .lock()
            .iter()
            .find(|(issued, _)| issued.id() == stream.id())
            .map(|(_, trigger)| trigger.clone())
    }
}

#[async_trait]
impl CaptureSource for FakeSource {
    async fn acquire(&self, _constraints: &CaptureConstraints) -> Result<CaptureStream, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let (stream, trigger) = CaptureStream::new(TrackSettings {
            width: 1920,
            height: 1080,
            frame_rate: 15,
        });
        self.issued.lock().push((stream.clone(), trigger));
        Ok(stream)
    }
}

// --- Encoder ---

#[derive(Default)]
struct EncoderShared {
    sender: Option<ChunkSender>,
    held: Option<ChunkSender>,
    flush: Vec<Vec<u8>>,
    hold_sender: bool,
    replaced: Vec<String>,
}

/// Encoder whose fragments are pushed by the test through a handle
pub struct FakeEncoder {
    supported: Vec<String>,
    shared: Arc<Mutex<EncoderShared>>,
}

/// Test-side control of a `FakeEncoder` after it is boxed away
#[derive(Clone)]
pub struct FakeEncoderHandle {
    shared: Arc<Mutex<EncoderShared>>,
}

impl FakeEncoder {
    pub fn supporting(types: &[&str]) -> Self {
        Self {
            supported: types.iter().map(|t| t.to_string()).collect(),
            shared: Arc::new(Mutex::new(EncoderShared::default())),
        }
    }

    pub fn handle(&self) -> FakeEncoderHandle {
        FakeEncoderHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl FakeEncoderHandle {
    /// Deliver one fragment as if a time slice elapsed
    pub fn emit(&self, data: Vec<u8>) {
        if let Some(tx) = self.shared.lock().sender.as_ref() {
            let _ = tx.send(data);
        }
    }

    /// Fragment delivered in response to the stop request
    pub fn flush_on_stop(&self, data: Vec<u8>) {
        self.shared.lock().flush.push(data);
    }

    /// Keep the chunk channel open after stop, like a wedged encoder
    pub fn hold_sender_on_stop(&self) {
        self.shared.lock().hold_sender = true;
    }

    /// Ids of streams swapped in with `replace_track`
    pub fn replaced_tracks(&self) -> Vec<String> {
        self.shared.lock().replaced.clone()
    }
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    async fn start(
        &mut self,
        _stream: &CaptureStream,
        _mime_type: &str,
        _slice: Duration,
        chunks: ChunkSender,
    ) -> RecorderResult<()> {
        self.shared.lock().sender = Some(chunks);
        Ok(())
    }

    async fn replace_track(&mut self, stream: &CaptureStream) -> RecorderResult<()> {
        self.shared.lock().replaced.push(stream.id().to_string());
        Ok(())
    }

    async fn request_stop(&mut self) -> RecorderResult<()> {
        let mut shared = self.shared.lock();
        let Some(tx) = shared.sender.take() else {
            return Ok(());
        };
        for data in std::mem::take(&mut shared.flush) {
            let _ = tx.send(data);
        }
        if shared.hold_sender {
            shared.held = Some(tx);
        }
        Ok(())
    }
}

// --- Delivery ---

/// What the fake transport received on the primary path
#[derive(Debug, Clone)]
pub struct PostedRecording {
    pub filename: String,
    pub trial_type: String,
    pub participant_id: String,
    pub mime_type: String,
    pub size: usize,
}

/// Transport that succeeds unless configured otherwise
#[derive(Default)]
pub struct FakeTransport {
    fail_status: Mutex<Option<u16>>,
    refuse_beacons: AtomicBool,
    posted: Mutex<Vec<PostedRecording>>,
    post_calls: AtomicUsize,
    beacon_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_posts_with_status(&self, status: u16) {
        *self.fail_status.lock() = Some(status);
    }

    pub fn succeed_posts(&self) {
        *self.fail_status.lock() = None;
    }

    pub fn refuse_beacons(&self) {
        self.refuse_beacons.store(true, Ordering::SeqCst);
    }

    /// Successful primary-path uploads, in order
    pub fn posted(&self) -> Vec<PostedRecording> {
        self.posted.lock().clone()
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn beacon_calls(&self) -> usize {
        self.beacon_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IngestTransport for FakeTransport {
    async fn post_recording(&self, form: &UploadForm<'_>) -> Result<IngestResponse, TransportError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.fail_status.lock() {
            return Err(TransportError::Status {
                status,
                body: "unavailable".to_string(),
            });
        }

        self.posted.lock().push(PostedRecording {
            filename: form.filename.to_string(),
            trial_type: form.trial_type.clone(),
            participant_id: form.participant_id.to_string(),
            mime_type: form.mime_type.to_string(),
            size: form.data.len(),
        });
        Ok(IngestResponse {
            success: Some(true),
            message: Some("saved".to_string()),
            filename: Some(form.filename.to_string()),
            ..Default::default()
        })
    }

    fn send_beacon(&self, _form: &UploadForm<'_>) -> bool {
        self.beacon_calls.fetch_add(1, Ordering::SeqCst);
        !self.refuse_beacons.load(Ordering::SeqCst)
    }
}

/// Store whose every operation fails, like a full or missing disk
pub struct FailingStore;

fn unavailable() -> StagingError {
    StagingError::Io(std::io::Error::other("staging unavailable"))
}

#[async_trait]
impl StagingStore for FailingStore {
    async fn save(&self, _blob: &MediaBlob, _metadata: &RecordingMetadata) -> StagingResult<String> {
        Err(unavailable())
    }

    async fn list_all(&self) -> StagingResult<Vec<StagedRecording>> {
        Err(unavailable())
    }

    async fn get(&self, _id: &str) -> StagingResult<StagedRecording> {
        Err(unavailable())
    }

    async fn delete(&self, _id: &str) -> StagingResult<()> {
        Err(unavailable())
    }
}

/// Local saver that keeps blobs in memory
#[derive(Default)]
pub struct MemorySaver {
    saved: Mutex<Vec<MediaBlob>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> usize {
        self.saved.lock().len()
    }
}

#[async_trait]
impl LocalSaver for MemorySaver {
    async fn save(&self, blob: &MediaBlob) -> std::io::Result<PathBuf> {
        let mut saved = self.saved.lock();
        saved.push(blob.clone());
        Ok(PathBuf::from(format!("downloads/recording_{}.webm", saved.len())))
    }
}
