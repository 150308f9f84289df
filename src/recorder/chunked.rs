//! Chunked recorder
//!
//! Drives a capture stream through the platform encoder with a bounded time
//! slice, accumulating fragments in delivery order, and assembles them into
//! one `MediaBlob` once the encoder has flushed.

use super::encoder::{
    select_mime_type, MediaEncoder, RecorderError, RecorderResult, FALLBACK_MIME_TYPE,
};
use super::state::{MediaBlob, RecorderState};
use crate::capture::CaptureStream;
use std::time::Duration;
use tokio::sync::mpsc;

/// Accumulates encoder output for one record/stop cycle at a time
pub struct ChunkedRecorder {
    encoder: Box<dyn MediaEncoder>,
    preferences: Vec<String>,
    finalize_timeout: Duration,
    state: RecorderState,
    mime_type: Option<String>,
    chunks: Vec<Vec<u8>>,
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChunkedRecorder {
    pub fn new(
        encoder: Box<dyn MediaEncoder>,
        preferences: Vec<String>,
        finalize_timeout: Duration,
    ) -> Self {
        Self {
            encoder,
            preferences,
            finalize_timeout,
            state: RecorderState::Inactive,
            mime_type: None,
            chunks: Vec::new(),
            receiver: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// MIME type negotiated at start, if any preference was supported
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Start encoding `stream`, one fragment per `slice`
    pub async fn start(&mut self, stream: &CaptureStream, slice: Duration) -> RecorderResult<()> {
        if self.state != RecorderState::Inactive {
            return Err(RecorderError::AlreadyRecording);
        }

        self.chunks.clear();
        self.mime_type = select_mime_type(self.encoder.as_ref(), &self.preferences);
        match &self.mime_type {
            Some(mime) => tracing::debug!("Negotiated recording format {}", mime),
            None => tracing::warn!("No preferred format supported, using encoder default"),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mime = self.mime_type.clone().unwrap_or_default();
        self.encoder.start(stream, &mime, slice, tx).await?;

        self.receiver = Some(rx);
        self.state = RecorderState::Recording;
        tracing::info!("Recorder started with {}ms slices", slice.as_millis());
        Ok(())
    }

    /// Append one fragment. Empty fragments are dropped.
    pub fn on_chunk(&mut self, data: Vec<u8>) -> bool {
        if data.is_empty() {
            tracing::trace!("Dropping empty fragment");
            return false;
        }
        self.chunks.push(data);
        true
    }

    /// Move every fragment the encoder has already delivered into the sequence
    pub fn pump(&mut self) -> usize {
        let mut received = Vec::new();
        if let Some(rx) = self.receiver.as_mut() {
            while let Ok(chunk) = rx.try_recv() {
                received.push(chunk);
            }
        }
        received
            .into_iter()
            .map(|chunk| self.on_chunk(chunk))
            .filter(|kept| *kept)
            .count()
    }

    /// Hand a reacquired stream to the encoder
    pub async fn replace_track(&mut self, stream: &CaptureStream) -> RecorderResult<()> {
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording);
        }
        self.encoder.replace_track(stream).await
    }

    /// Stop encoding and wait for the last fragment
    ///
    /// Returns once the encoder has closed its chunk channel, or after the
    /// finalize timeout with whatever arrived by then.
    pub async fn stop(&mut self) -> RecorderResult<()> {
        if self.state != RecorderState::Recording {
            return Err(RecorderError::NotRecording);
        }
        self.state = RecorderState::Stopping;

        if let Err(e) = self.encoder.request_stop().await {
            // Keep whatever was already flushed.
            tracing::error!("Encoder failed to stop cleanly: {}", e);
        }

        if let Some(mut rx) = self.receiver.take() {
            let mut received = Vec::new();
            let drained = tokio::time::timeout(self.finalize_timeout, async {
                while let Some(chunk) = rx.recv().await {
                    received.push(chunk);
                }
            })
            .await;

            if drained.is_err() {
                tracing::warn!(
                    "Encoder did not finish flushing within {}ms",
                    self.finalize_timeout.as_millis()
                );
                while let Ok(chunk) = rx.try_recv() {
                    received.push(chunk);
                }
            }

            for chunk in received {
                self.on_chunk(chunk);
            }
        }

        self.state = RecorderState::Inactive;
        tracing::info!(
            "Recorder stopped: {} chunks, {} bytes",
            self.chunks.len(),
            self.buffered_bytes()
        );
        Ok(())
    }

    /// Concatenate all fragments in order
    ///
    /// Returns `None` when nothing was captured or the recorder has not
    /// finished stopping. The chunk sequence is consumed either way.
    pub fn finalize(&mut self) -> Option<MediaBlob> {
        if self.state != RecorderState::Inactive {
            tracing::warn!("finalize called while recorder is {:?}", self.state);
            return None;
        }

        let chunks = std::mem::take(&mut self.chunks);
        if chunks.is_empty() {
            return None;
        }

        let total = chunks.iter().map(Vec::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }

        let mime_type = self
            .mime_type
            .clone()
            .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());
        Some(MediaBlob::new(data, mime_type))
    }
}
