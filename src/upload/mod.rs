//! Recording delivery module
//!
//! This module moves staged recordings to the ingestion service with tiered
//! fallback: awaited multipart request, unload-time beacon, local file.

pub mod dispatcher;
pub mod local;
pub mod transport;
pub mod types;

pub use dispatcher::UploadDispatcher;
pub use local::{DownloadDirSaver, LocalSaver};
pub use transport::{HttpTransport, IngestTransport, UploadForm, DEFAULT_BEACON_MAX_BYTES};
pub use types::{
    DeliveryMode, DeliveryOutcome, DeliveryReport, DeliveryTier, DrainSummary, IngestResponse,
    TransportError,
};
