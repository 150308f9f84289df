//! Session Recorder - screen-recording capture and delivery.
//!
//! This is the library crate behind the `session-recorder` binary. It records
//! a screen share in timed chunks, stages each finished recording durably and
//! delivers it to an ingestion service with tiered fallback, so a recording
//! survives source loss, network failure and the page going away.

pub mod capture;
pub mod config;
pub mod recorder;
pub mod staging;
pub mod upload;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::RecorderConfig;
pub use recorder::{CommitOutcome, SessionCoordinator, SessionEvent, SessionState, TeardownReport};
pub use staging::{FileStagingStore, StagingStore};
pub use upload::{DownloadDirSaver, HttpTransport, UploadDispatcher};
pub use utils::error::{AppError, AppResult};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber
///
/// Honors `RUST_LOG`; otherwise logs this crate at debug. A second call is a
/// no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_recorder=debug,reqwest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Build the delivery stack a config describes
pub async fn dispatcher_from_config(config: &RecorderConfig) -> AppResult<UploadDispatcher> {
    let store = FileStagingStore::open(config.staging_dir.clone()).await?;
    let transport = HttpTransport::new(config.ingestion_url.clone(), config.beacon_max_bytes)?;
    let saver = DownloadDirSaver::new(config.download_dir.clone(), config.download_prefix.clone());

    Ok(UploadDispatcher::new(Arc::new(store), Arc::new(transport)).with_local_saver(Arc::new(saver)))
}
