use thiserror::Error;

use crate::models::{ConflictReport, ReviewPhase};

/// Failure of one document's extraction round-trip. Recoverable: the
/// document is kept in the batch as `ExtractionFailed` and excluded from
/// submission.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ExtractionFailure {
    pub reason: String,
}

impl ExtractionFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        ExtractionFailure {
            reason: reason.into(),
        }
    }
}

/// A conflict report that could not be replayed: no document in the batch
/// matches its file name, or the metadata needed for a forced submission is
/// missing. Reported, never fatal for the remaining conflicts.
#[derive(Debug, Clone)]
pub struct CorrelationFailure {
    pub report: ConflictReport,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    /// `submit()` found no `Ready` document. No network call was made.
    #[error("nenhum documento válido para enviar")]
    NoEligibleDocuments,

    /// None of the dropped files is an accepted PDF.
    #[error("nenhum arquivo PDF entre os arquivos recebidos")]
    NoAcceptedFiles,

    #[error("já existe um envio em andamento")]
    SubmissionInFlight,

    #[error("operação inválida na fase {0:?}")]
    InvalidPhase(ReviewPhase),

    #[error("nenhum aviso aguardando confirmação")]
    NoActiveConflict,

    /// Batch or forced submission failed for a reason other than conflicts.
    /// Carries the server's reason verbatim when one was supplied.
    #[error("falha no envio: {0}")]
    Submission(String),
}
