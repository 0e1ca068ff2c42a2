// ============================================================================
// Ingestion Pipeline
// ============================================================================
//
// stream -> decode/validate -> (dead-letter | store -> cache) -> commit
//
// - handler - per-message business policy, returns an `Outcome`
// - runner  - the fetch/handle/commit loop that acts on that `Outcome`
//
// Delivery is at-least-once: an offset is committed only after its message
// reached a terminal outcome, and the store makes redelivery harmless.
//
// ============================================================================

mod handler;
mod runner;

pub use handler::{OrderHandler, Outcome};
pub use runner::{IngestionPipeline, PipelinePolicy, RunSummary};

use crate::messaging::StreamError;
use crate::models::OrderError;
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    #[error("transient store error: {0}")]
    TransientStore(#[from] StoreError),

    #[error("rejected by store: {0}")]
    RejectedByStore(StoreError),

    #[error("transient fetch error: {0}")]
    TransientFetch(#[from] StreamError),
}

impl IngestError {
    /// Short metric/log label.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedPayload(_) => "malformed",
            IngestError::InvalidOrder(_) => "invalid",
            IngestError::TransientStore(_) => "store",
            IngestError::RejectedByStore(_) => "rejected",
            IngestError::TransientFetch(_) => "fetch",
        }
    }
}
