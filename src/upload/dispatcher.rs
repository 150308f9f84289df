//! Upload dispatcher
//!
//! Turns staged recordings into delivery attempts. Tiers escalate from the
//! awaited request to the beacon (unload only) to a local save (user
//! present only). A staged entry is deleted after a successful delivery and
//! at no other time, so anything short of success stays staged for the
//! next drain.

use super::local::LocalSaver;
use super::transport::{IngestTransport, UploadForm};
use super::types::{DeliveryMode, DeliveryOutcome, DeliveryReport, DeliveryTier, DrainSummary};
use crate::recorder::MediaBlob;
use crate::staging::{RecordingMetadata, StagedRecording, StagingResult, StagingStore};
use std::sync::Arc;

/// Delivers staged recordings to the ingestion service
#[derive(Clone)]
pub struct UploadDispatcher {
    store: Arc<dyn StagingStore>,
    transport: Arc<dyn IngestTransport>,
    saver: Option<Arc<dyn LocalSaver>>,
}

impl UploadDispatcher {
    pub fn new(store: Arc<dyn StagingStore>, transport: Arc<dyn IngestTransport>) -> Self {
        Self {
            store,
            transport,
            saver: None,
        }
    }

    /// Enable the local-file fallback
    pub fn with_local_saver(mut self, saver: Arc<dyn LocalSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn store(&self) -> &Arc<dyn StagingStore> {
        &self.store
    }

    /// Attempt delivery of one staged recording
    ///
    /// On success the entry is removed from the store.
    pub async fn deliver(&self, staged: &StagedRecording, mode: DeliveryMode) -> DeliveryReport {
        let form = UploadForm::from_staged(staged);
        let mut report = self.send(&form, mode).await;

        if report.is_success() {
            if let Err(e) = self.store.delete(&staged.id).await {
                // Delivered but still staged: the next drain sends it again,
                // which the service tolerates.
                tracing::error!("Delivered {} but could not unstage it: {}", staged.id, e);
            }
            tracing::info!("Delivered staged recording {}", staged.id);
            return report;
        }

        if mode == DeliveryMode::Interactive {
            report.local_copy = self.save_locally(&staged.blob, &mut report.tiers).await;
        }
        tracing::warn!(
            "Staged recording {} not delivered ({:?}); keeping it for the next drain",
            staged.id,
            report.outcome
        );
        report
    }

    /// Deliver a recording that could not be staged
    ///
    /// Without a staged copy a failed delivery cannot be retried later, so
    /// exhausting every available tier is terminal.
    pub async fn deliver_unstaged(
        &self,
        blob: &MediaBlob,
        metadata: &RecordingMetadata,
        mode: DeliveryMode,
    ) -> DeliveryReport {
        let form = UploadForm::new(blob, metadata);
        let mut report = self.send(&form, mode).await;
        if report.is_success() {
            return report;
        }

        if mode != DeliveryMode::Unloading {
            report.local_copy = self.save_locally(blob, &mut report.tiers).await;
        }

        if report.local_copy.is_none() {
            tracing::error!("Recording {} was lost: no tier succeeded", metadata.filename);
        }
        report.outcome = DeliveryOutcome::TerminalFailure;
        report
    }

    /// Deliver every staged recording, one at a time
    pub async fn drain_all(&self, mode: DeliveryMode) -> StagingResult<DrainSummary> {
        let staged = self.store.list_all().await?;
        let mut summary = DrainSummary::default();

        if staged.is_empty() {
            tracing::debug!("Nothing staged to drain");
            return Ok(summary);
        }

        tracing::info!("Draining {} staged recording(s)", staged.len());
        for recording in &staged {
            summary.attempted += 1;
            let report = self.deliver(recording, mode).await;
            if report.is_success() {
                summary.delivered += 1;
            } else {
                summary.pending += 1;
            }
        }

        tracing::info!(
            "Drain finished: {} delivered, {} still pending",
            summary.delivered,
            summary.pending
        );
        Ok(summary)
    }

    /// Run the network tier appropriate for `mode`
    async fn send(&self, form: &UploadForm<'_>, mode: DeliveryMode) -> DeliveryReport {
        let mut report = DeliveryReport::new();

        match mode {
            DeliveryMode::Interactive | DeliveryMode::Background => {
                report.tiers.push(DeliveryTier::PrimaryRequest);
                match self.transport.post_recording(form).await {
                    Ok(response) => {
                        tracing::info!(
                            "Ingestion accepted {}: {}",
                            form.filename,
                            response.message.as_deref().unwrap_or("no message")
                        );
                        report.outcome = DeliveryOutcome::Success;
                        report.response = Some(response);
                    }
                    Err(e) => {
                        tracing::warn!("Upload of {} failed: {}", form.filename, e);
                        report.outcome = DeliveryOutcome::Retryable;
                    }
                }
            }
            DeliveryMode::Unloading => {
                report.tiers.push(DeliveryTier::BeaconFallback);
                if self.transport.send_beacon(form) {
                    tracing::info!("Beacon accepted {} for sending", form.filename);
                    report.outcome = DeliveryOutcome::Success;
                } else {
                    tracing::warn!("Beacon refused {}", form.filename);
                    report.outcome = DeliveryOutcome::Retryable;
                }
            }
        }

        report
    }

    async fn save_locally(
        &self,
        blob: &MediaBlob,
        tiers: &mut Vec<DeliveryTier>,
    ) -> Option<std::path::PathBuf> {
        let saver = self.saver.as_ref()?;
        tiers.push(DeliveryTier::LocalDownloadFallback);
        match saver.save(blob).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!("Local fallback save failed: {}", e);
                None
            }
        }
    }
}
