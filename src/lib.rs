//! Client-side core of the fatura upload workflow: drop PDFs, review the
//! extracted data, submit the batch and resolve duplicate/ownership
//! conflicts with the backend.
//!
//! The crate holds no UI; a host view drives [`ReviewOrchestrator`] and
//! renders its state, and listens for [`ReviewEvent::UploadSucceeded`] to
//! refresh its fatura listing.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::ApiConfig;
pub use error::{CorrelationFailure, ExtractionFailure, ReviewError};
pub use models::{
    ConflictKind, ConflictReport, DocumentStatus, ExtractedFields, FaturaErro, FaturaInfo,
    ForcedReceipt, PendingForcedSubmission, ProcessedFatura, ReviewPhase, SourceFile,
    UploadSummary,
};
pub use services::batch::{DocumentBatch, ReviewDocument};
pub use services::conflicts::PreparedConflict;
pub use services::extraction::{ExtractionGateway, HttpExtractionGateway};
pub use services::preview::PreviewHandle;
pub use services::review::{ReviewEvent, ReviewOrchestrator, SubmitOutcome};
pub use services::submission::{
    BatchOutcome, ForcedOutcome, HttpSubmissionGateway, SubmissionGateway,
};
