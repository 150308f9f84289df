//! Session coordinator
//!
//! The lifecycle state machine over capture, recording, staging and
//! delivery. Every transition takes `&mut self`, so transitions never
//! interleave; the one concurrent input is the `StopHandle`, which lets an
//! explicit stop pre-empt a reacquire loop that is sleeping between attempts.
//!
//! ```text
//! Idle → Acquiring → Recording → Stopping → Finalizing → Idle
//!            ↓           ↺ (reacquire)
//!           Idle
//! ```

use super::chunked::ChunkedRecorder;
use super::encoder::{MediaEncoder, RecorderError, RecorderResult};
use super::state::{MediaBlob, RecordingSession, SessionEvent, SessionState, TeardownReason};
use crate::capture::{
    reacquire, CaptureConstraints, CaptureSource, CaptureStream, ReacquireOutcome, ReacquirePolicy,
    StopHandle,
};
use crate::config::{RecorderConfig, SourceLossPolicy};
use crate::staging::{RecordingMetadata, StagedRecording};
use crate::upload::{DeliveryMode, DeliveryReport, DrainSummary, UploadDispatcher};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// What happened to the captured data when a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Nothing was captured; nothing staged, nothing sent
    Discarded,
    /// Written to staging; delivery is left to the following drain
    Staged { id: String },
    /// Delivery was attempted; `staged_id` is `None` when staging failed
    Attempted {
        staged_id: Option<String>,
        report: DeliveryReport,
    },
}

/// Result of a forced teardown
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownReport {
    pub reason: TeardownReason,

    /// Set when a recording was in progress
    pub commit: Option<CommitOutcome>,

    /// Flush of everything left in staging
    pub drained: DrainSummary,
}

/// Finalized data before a delivery decision
enum Finalized {
    Discarded,
    Staged(StagedRecording),
    Unstaged(MediaBlob, RecordingMetadata),
}

/// Orchestrates one recording session at a time
pub struct SessionCoordinator {
    /// Current lifecycle state
    state: Arc<RwLock<SessionState>>,

    source: Arc<dyn CaptureSource>,
    recorder: ChunkedRecorder,
    dispatcher: UploadDispatcher,

    constraints: CaptureConstraints,
    slice_interval: Duration,
    reacquire_policy: ReacquirePolicy,
    source_loss_policy: SourceLossPolicy,
    progress_interval: Duration,

    /// The live capture, if any
    session: Option<RecordingSession>,

    stop_handle: StopHandle,
    trial_type: Option<String>,
    participant_id: Option<String>,
    last_progress: Option<Instant>,

    /// Event broadcaster
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionCoordinator {
    /// Create a coordinator over injected collaborators
    pub fn new(
        config: &RecorderConfig,
        source: Arc<dyn CaptureSource>,
        encoder: Box<dyn MediaEncoder>,
        dispatcher: UploadDispatcher,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(SessionState::Idle)),
            source,
            recorder: ChunkedRecorder::new(
                encoder,
                config.mime_preferences.clone(),
                config.finalize_timeout(),
            ),
            dispatcher,
            constraints: config.constraints.clone(),
            slice_interval: config.slice_interval(),
            reacquire_policy: config.reacquire_policy(),
            source_loss_policy: config.source_loss_policy,
            progress_interval: config.progress_interval(),
            session: None,
            stop_handle: StopHandle::new(),
            trial_type: None,
            participant_id: None,
            last_progress: None,
            event_tx,
        }
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Handle for requesting a stop from another task
    ///
    /// A request pre-empts a reacquire loop in flight, which then stops the
    /// session. Outside that loop it only marks the session: the host still
    /// calls `stop`, and the next `source_ended` stops without reacquiring.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    /// Identify who and what is being recorded
    pub fn set_context(&mut self, trial_type: Option<String>, participant_id: Option<String>) {
        self.trial_type = trial_type;
        self.participant_id = participant_id;
    }

    /// The live session, if recording
    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// The stream currently feeding the encoder
    ///
    /// Hosts await `ended()` on it and then call `source_ended`.
    pub fn current_stream(&self) -> Option<CaptureStream> {
        self.session.as_ref().map(|s| s.stream.clone())
    }

    /// Wait until the user revokes the current share
    ///
    /// Returns `false` straight away when nothing is being captured or the
    /// source is already known lost, so a host loop of
    /// `wait_for_source_end` + `source_ended` ends after one exhausted
    /// reacquire.
    pub async fn wait_for_source_end(&self) -> bool {
        match self.session.as_ref() {
            Some(session) if !session.source_lost => {
                let stream = session.stream.clone();
                stream.ended().await;
                true
            }
            _ => false,
        }
    }

    /// Elapsed recording time in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        self.session.as_ref().map(|s| s.elapsed_ms()).unwrap_or(0)
    }

    pub fn dispatcher(&self) -> &UploadDispatcher {
        &self.dispatcher
    }

    /// Start recording
    pub async fn start(&mut self) -> RecorderResult<()> {
        if self.state() != SessionState::Idle {
            return Err(RecorderError::AlreadyRecording);
        }

        self.stop_handle.clear();
        self.set_state(SessionState::Acquiring);

        let stream = match self.source.acquire(&self.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Could not acquire a capture source: {}", e);
                self.emit(SessionEvent::Error(e.to_string()));
                self.set_state(SessionState::Idle);
                return Err(e.into());
            }
        };

        if let Some(note) = self.constraints.shortfall(&stream.settings()) {
            tracing::debug!("Platform downgraded capture: {}", note);
        }

        if let Err(e) = self.recorder.start(&stream, self.slice_interval).await {
            tracing::error!("Recorder failed to start: {}", e);
            self.source.release(&stream);
            self.emit(SessionEvent::Error(e.to_string()));
            self.set_state(SessionState::Idle);
            return Err(e);
        }

        self.session = Some(RecordingSession::new(stream));
        self.last_progress = Some(Instant::now());
        self.set_state(SessionState::Recording);
        self.emit(SessionEvent::Started);
        tracing::info!("Recording started");
        Ok(())
    }

    /// Stop recording, stage the result and try to deliver it right away
    pub async fn stop(&mut self) -> RecorderResult<CommitOutcome> {
        if self.state() != SessionState::Recording {
            return Err(RecorderError::NotRecording);
        }

        tracing::info!("Stopping recording");
        let outcome = match self.finish().await {
            Finalized::Discarded => CommitOutcome::Discarded,
            Finalized::Staged(staged) => {
                let report = self.dispatcher.deliver(&staged, DeliveryMode::Interactive).await;
                if report.is_success() {
                    self.emit(SessionEvent::Delivered {
                        id: Some(staged.id.clone()),
                    });
                }
                CommitOutcome::Attempted {
                    staged_id: Some(staged.id),
                    report,
                }
            }
            Finalized::Unstaged(blob, metadata) => {
                self.deliver_unstaged(&blob, &metadata, DeliveryMode::Interactive)
                    .await
            }
        };

        self.set_state(SessionState::Idle);
        Ok(outcome)
    }

    /// React to the user revoking the screen share
    ///
    /// Returns the commit outcome when the session ended as a result.
    pub async fn source_ended(&mut self) -> RecorderResult<Option<CommitOutcome>> {
        if self.state() != SessionState::Recording {
            tracing::debug!("Source ended while {:?}; ignoring", self.state());
            return Ok(None);
        }

        if self.source_loss_policy == SourceLossPolicy::Stop {
            tracing::info!("Capture source lost; stopping");
            return self.stop().await.map(Some);
        }

        if self.session.as_ref().is_some_and(|s| s.source_lost) {
            // Already exhausted; stay on the stale stream until stopped.
            tracing::debug!("Source already lost; not reacquiring again");
            return Ok(None);
        }

        self.recorder.pump();
        tracing::info!("Capture source lost; trying to reacquire");

        let outcome = reacquire(
            self.source.as_ref(),
            &self.constraints,
            &self.reacquire_policy,
            &self.stop_handle,
        )
        .await;

        match outcome {
            ReacquireOutcome::Reacquired { stream, attempt } => {
                if let Err(e) = self.recorder.replace_track(&stream).await {
                    tracing::error!("Encoder rejected the reacquired stream: {}", e);
                    self.source.release(&stream);
                    self.mark_source_lost();
                    return Ok(None);
                }

                if let Some(session) = self.session.as_mut() {
                    self.source.release(&session.stream);
                    session.stream = stream;
                    session.reacquire_count += 1;
                    session.source_lost = false;
                }
                self.emit(SessionEvent::Reacquired { attempt });
                tracing::info!("Capture source reacquired on attempt {}", attempt);
                Ok(None)
            }
            ReacquireOutcome::Exhausted { .. } => {
                // Keep recording on the stale stream until an explicit stop.
                self.mark_source_lost();
                Ok(None)
            }
            ReacquireOutcome::Cancelled => self.stop().await.map(Some),
        }
    }

    /// Force the session down because the host context is going away
    pub async fn teardown(&mut self, reason: TeardownReason) -> TeardownReport {
        let mode = if reason.is_unload_class() {
            DeliveryMode::Unloading
        } else {
            DeliveryMode::Background
        };
        tracing::info!("Teardown ({:?}) from {:?}", reason, self.state());

        let commit = if self.state().is_active() {
            let outcome = match self.finish().await {
                Finalized::Discarded => CommitOutcome::Discarded,
                Finalized::Staged(staged) => CommitOutcome::Staged { id: staged.id },
                Finalized::Unstaged(blob, metadata) => {
                    self.deliver_unstaged(&blob, &metadata, mode).await
                }
            };
            Some(outcome)
        } else {
            None
        };

        let drained = match self.dispatcher.drain_all(mode).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Could not read staging during teardown: {}", e);
                self.emit(SessionEvent::Error(e.to_string()));
                DrainSummary::default()
            }
        };
        if drained.delivered > 0 {
            self.emit(SessionEvent::Delivered { id: None });
        }

        self.session = None;
        self.set_state(SessionState::Idle);
        TeardownReport {
            reason,
            commit,
            drained,
        }
    }

    /// Deliver everything left in staging by earlier sessions
    pub async fn recover_pending(&self) -> DrainSummary {
        match self.dispatcher.drain_all(DeliveryMode::Background).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Could not drain staged recordings: {}", e);
                self.emit(SessionEvent::Error(e.to_string()));
                DrainSummary::default()
            }
        }
    }

    /// Collect delivered fragments and, once per interval, report progress
    ///
    /// Hosts call this on a timer while recording.
    pub fn report_progress(&mut self) -> Option<i64> {
        if self.state() != SessionState::Recording {
            return None;
        }
        self.recorder.pump();

        let due = self
            .last_progress
            .map(|at| at.elapsed() >= self.progress_interval)
            .unwrap_or(true);
        if !due {
            return None;
        }
        self.last_progress = Some(Instant::now());

        let elapsed = self.elapsed_ms();
        let secs = elapsed / 1000;
        tracing::info!(
            "Recording {}:{:02} ({} chunks, {} bytes)",
            secs / 60,
            secs % 60,
            self.recorder.chunk_count(),
            self.recorder.buffered_bytes()
        );
        self.emit(SessionEvent::Progress(elapsed));
        Some(elapsed)
    }

    // --- Internal helpers ---

    /// Stop the recorder, release the source, assemble and stage the blob
    async fn finish(&mut self) -> Finalized {
        self.set_state(SessionState::Stopping);

        if let Err(e) = self.recorder.stop().await {
            tracing::warn!("Recorder stop: {}", e);
        }
        if let Some(session) = self.session.take() {
            self.source.release(&session.stream);
            tracing::info!(
                "Recording ended after {}ms with {} reacquire(s)",
                session.elapsed_ms(),
                session.reacquire_count
            );
        }

        self.set_state(SessionState::Finalizing);
        let Some(blob) = self.recorder.finalize() else {
            tracing::warn!("No recording data captured; nothing to stage");
            self.emit(SessionEvent::Discarded);
            return Finalized::Discarded;
        };
        self.emit(SessionEvent::Stopped { bytes: blob.len() });

        let metadata = RecordingMetadata::new(
            self.trial_type.as_deref(),
            self.participant_id.as_deref(),
            &blob.mime_type,
        );

        match self.dispatcher.store().save(&blob, &metadata).await {
            Ok(id) => {
                self.emit(SessionEvent::Staged { id: id.clone() });
                Finalized::Staged(StagedRecording { id, blob, metadata })
            }
            Err(e) => {
                tracing::error!("Staging failed, delivering directly: {}", e);
                self.emit(SessionEvent::Error(e.to_string()));
                Finalized::Unstaged(blob, metadata)
            }
        }
    }

    async fn deliver_unstaged(
        &self,
        blob: &MediaBlob,
        metadata: &RecordingMetadata,
        mode: DeliveryMode,
    ) -> CommitOutcome {
        let report = self.dispatcher.deliver_unstaged(blob, metadata, mode).await;
        if report.is_success() {
            self.emit(SessionEvent::Delivered { id: None });
        }
        CommitOutcome::Attempted {
            staged_id: None,
            report,
        }
    }

    fn mark_source_lost(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.source_lost = true;
        }
        self.emit(SessionEvent::SourceLost);
        tracing::warn!("Continuing on a stale capture source until stopped");
    }

    fn set_state(&self, new_state: SessionState) {
        let changed = {
            let mut state = self.state.write();
            let changed = *state != new_state;
            *state = new_state;
            changed
        };
        if changed {
            tracing::debug!("Session state -> {:?}", new_state);
            self.emit(SessionEvent::StateChanged(new_state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}
