//! Ingestion transport
//!
//! The network side of delivery: an awaited multipart POST and a
//! fire-and-forget beacon to the same endpoint.

use super::types::{IngestResponse, TransportError};
use crate::recorder::MediaBlob;
use crate::staging::{RecordingMetadata, StagedRecording};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Multipart field carrying the media bytes
pub const FILE_FIELD: &str = "screen_recording";
/// Multipart/query field carrying the normalized trial folder
pub const TRIAL_FIELD: &str = "trial_type";
/// Multipart/query field carrying the participant id
pub const PARTICIPANT_FIELD: &str = "participant_id";
/// Query field carrying the file name on the beacon path
pub const FILENAME_FIELD: &str = "filename";

/// Default cap on beacon payloads
///
/// Sized for several minutes of screen video. The beacon body is copied into
/// a detached request, so the cap bounds memory held while exiting.
pub const DEFAULT_BEACON_MAX_BYTES: usize = 64 * 1024 * 1024;

/// Everything one upload carries
#[derive(Debug, Clone)]
pub struct UploadForm<'a> {
    pub data: &'a [u8],
    pub mime_type: &'a str,
    pub filename: &'a str,
    /// Trial folder, already normalized
    pub trial_type: String,
    pub participant_id: &'a str,
}

impl<'a> UploadForm<'a> {
    pub fn new(blob: &'a MediaBlob, metadata: &'a RecordingMetadata) -> Self {
        Self {
            data: &blob.data,
            mime_type: &blob.mime_type,
            filename: &metadata.filename,
            trial_type: metadata.trial_folder(),
            participant_id: &metadata.participant_id,
        }
    }

    pub fn from_staged(staged: &'a StagedRecording) -> Self {
        Self::new(&staged.blob, &staged.metadata)
    }

    /// Query string used when the body is raw binary
    pub fn beacon_query(&self) -> String {
        format!(
            "{}={}&{}={}&{}={}",
            PARTICIPANT_FIELD,
            urlencoding::encode(self.participant_id),
            TRIAL_FIELD,
            urlencoding::encode(&self.trial_type),
            FILENAME_FIELD,
            urlencoding::encode(self.filename),
        )
    }
}

/// Network delivery to the ingestion service
#[async_trait]
pub trait IngestTransport: Send + Sync {
    /// Send the recording and wait for the service's answer
    async fn post_recording(&self, form: &UploadForm<'_>) -> Result<IngestResponse, TransportError>;

    /// Queue the recording for best-effort delivery without waiting
    ///
    /// Returns whether the transmission was accepted for sending. Receipt
    /// by the service is never confirmed.
    fn send_beacon(&self, form: &UploadForm<'_>) -> bool;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    beacon_max_bytes: usize,
}

impl HttpTransport {
    /// Create a transport for `url`
    ///
    /// Only the connect phase is bounded; large uploads take as long as
    /// they take.
    pub fn new(url: impl Into<String>, beacon_max_bytes: usize) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            beacon_max_bytes,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn beacon_url(&self, form: &UploadForm<'_>) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, form.beacon_query())
    }
}

#[async_trait]
impl IngestTransport for HttpTransport {
    async fn post_recording(&self, form: &UploadForm<'_>) -> Result<IngestResponse, TransportError> {
        let part = Part::bytes(form.data.to_vec())
            .file_name(form.filename.to_string())
            .mime_str(form.mime_type)?;
        let multipart = Form::new()
            .part(FILE_FIELD, part)
            .text(TRIAL_FIELD, form.trial_type.clone())
            .text(PARTICIPANT_FIELD, form.participant_id.to_string());

        tracing::info!(
            "Uploading {} ({} bytes) to {}",
            form.filename,
            form.data.len(),
            self.url
        );

        let response = self.client.post(&self.url).multipart(multipart).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<IngestResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                tracing::debug!("Ingestion response was not JSON ({}), treating as success", e);
                Ok(IngestResponse::default())
            }
        }
    }

    fn send_beacon(&self, form: &UploadForm<'_>) -> bool {
        if form.data.len() > self.beacon_max_bytes {
            tracing::warn!(
                "Beacon refused: {} bytes exceeds the {} byte limit",
                form.data.len(),
                self.beacon_max_bytes
            );
            return false;
        }

        let request = match self
            .client
            .post(self.beacon_url(form))
            .header(CONTENT_TYPE, form.mime_type)
            .body(form.data.to_vec())
            .build()
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Beacon refused: {}", e);
                return false;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Beacon refused: no runtime to send on");
            return false;
        };

        let client = self.client.clone();
        let filename = form.filename.to_string();
        runtime.spawn(async move {
            match client.execute(request).await {
                Ok(response) => {
                    tracing::debug!("Beacon for {} answered {}", filename, response.status())
                }
                Err(e) => tracing::debug!("Beacon for {} failed: {}", filename, e),
            }
        });

        true
    }
}
