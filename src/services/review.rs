use futures::future::join_all;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{CorrelationFailure, ExtractionFailure, ReviewError};
use crate::models::{ConflictReport, ForcedReceipt, ReviewPhase, SourceFile, UploadSummary};
use crate::services::batch::{DocumentBatch, ReviewDocument};
use crate::services::conflicts::{self, PreparedConflict};
use crate::services::extraction::{ExtractionGateway, HttpExtractionGateway};
use crate::services::submission::{
    BatchOutcome, ForcedOutcome, HttpSubmissionGateway, SubmissionGateway,
};

/// Signal emitted to the host view. Upload success is the only one: the host
/// reacts by re-fetching its fatura listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    UploadSucceeded,
}

/// What a submission round left behind.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Every ready document was accepted and the batch was cleared.
    Completed(UploadSummary),
    /// The backend reported conflicts. Resolvable ones are queued for
    /// one-at-a-time confirmation; the rest come back for display only.
    ConflictsPending {
        queued: usize,
        unmatched: Vec<CorrelationFailure>,
        informational: Vec<ConflictReport>,
        summary: UploadSummary,
    },
}

/// Drives a batch of dropped fatura files through extraction, review,
/// submission and conflict resolution.
///
/// The orchestrator exclusively owns the batch and the conflict queue;
/// `&mut self` on every mutating operation means overlapping submissions
/// cannot be expressed, and the `Submitting` phase check keeps the guard
/// explicit anyway.
pub struct ReviewOrchestrator {
    batch: DocumentBatch,
    phase: ReviewPhase,
    conflicts: VecDeque<PreparedConflict>,
    extractor: Arc<dyn ExtractionGateway>,
    submitter: Arc<dyn SubmissionGateway>,
    events: mpsc::Sender<ReviewEvent>,
}

impl ReviewOrchestrator {
    pub fn new(
        extractor: Arc<dyn ExtractionGateway>,
        submitter: Arc<dyn SubmissionGateway>,
        events: mpsc::Sender<ReviewEvent>,
    ) -> Self {
        ReviewOrchestrator {
            batch: DocumentBatch::new(),
            phase: ReviewPhase::Idle,
            conflicts: VecDeque::new(),
            extractor,
            submitter,
            events,
        }
    }

    /// Wires the orchestrator to the real HTTP gateways for one customer.
    pub fn over_http(
        config: ApiConfig,
        customer_id: i64,
        events: mpsc::Sender<ReviewEvent>,
    ) -> anyhow::Result<Self> {
        let extractor = HttpExtractionGateway::new(config.clone())?;
        let submitter = HttpSubmissionGateway::new(config, customer_id)?;
        Ok(ReviewOrchestrator::new(
            Arc::new(extractor),
            Arc::new(submitter),
            events,
        ))
    }

    pub fn phase(&self) -> ReviewPhase {
        self.phase
    }

    pub fn batch(&self) -> &DocumentBatch {
        &self.batch
    }

    pub fn documents(&self) -> &[ReviewDocument] {
        self.batch.documents()
    }

    /// Opens (or extends) a review round with files read from disk. Every
    /// accepted file is extracted concurrently; once all settle the session
    /// is `Reviewing`, whatever the individual results were.
    pub async fn start_review(&mut self, paths: &[PathBuf]) -> Result<(), ReviewError> {
        self.guard_can_add()?;
        let added = self.batch.add_files(paths)?;
        self.extract_documents(added).await;
        Ok(())
    }

    /// Same as [`start_review`](Self::start_review) for hosts that already
    /// hold the dropped payloads in memory.
    pub async fn start_review_sources(
        &mut self,
        sources: Vec<SourceFile>,
    ) -> Result<(), ReviewError> {
        self.guard_can_add()?;
        let added = self.batch.add_sources(sources)?;
        self.extract_documents(added).await;
        Ok(())
    }

    pub fn update_field(&mut self, document_id: &str, field: &str, value: Value) {
        self.batch.update_field(document_id, field, value);
    }

    pub fn set_focus(&mut self, index: usize) {
        self.batch.set_focus(index);
    }

    /// Removes one document. Queued conflicts for it are dropped along with
    /// it; an emptied batch closes the review session.
    pub fn remove_document(&mut self, document_id: &str) {
        if !self.batch.remove(document_id) {
            return;
        }
        self.conflicts
            .retain(|conflict| conflict.document_id != document_id);
        if self.batch.is_empty() {
            debug!("batch emptied by removal, closing review");
            self.conflicts.clear();
            self.phase = ReviewPhase::Idle;
        }
    }

    /// User closed the review view: releases every preview, drops queued
    /// conflicts, no notification.
    pub fn close(&mut self) {
        self.batch.clear();
        self.conflicts.clear();
        self.phase = ReviewPhase::Idle;
    }

    /// Submits the `Ready` subset of the batch. Documents whose extraction
    /// failed are silently excluded, never auto-retried.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, ReviewError> {
        match self.phase {
            ReviewPhase::Reviewing => {}
            ReviewPhase::Submitting => return Err(ReviewError::SubmissionInFlight),
            other => return Err(ReviewError::InvalidPhase(other)),
        }
        let files = self.batch.ready_sources();
        if files.is_empty() {
            return Err(ReviewError::NoEligibleDocuments);
        }

        self.phase = ReviewPhase::Submitting;
        let outcome = self.submitter.submit_batch(&files).await;
        match outcome {
            BatchOutcome::Accepted(summary) => {
                info!(
                    processed = summary.faturas_processadas.len(),
                    errors = summary.faturas_com_erro.len(),
                    "batch accepted"
                );
                self.finish_success();
                Ok(SubmitOutcome::Completed(summary))
            }
            BatchOutcome::ConflictsReported { avisos, summary } => {
                self.phase = ReviewPhase::Reviewing;
                let (resolvable, informational) = conflicts::partition_reports(avisos);
                let (queue, unmatched) = conflicts::correlate(resolvable, &self.batch);
                let queued = queue.len();
                self.conflicts = queue;
                info!(
                    queued,
                    unmatched = unmatched.len(),
                    informational = informational.len(),
                    "batch reported conflicts"
                );
                Ok(SubmitOutcome::ConflictsPending {
                    queued,
                    unmatched,
                    informational,
                    summary,
                })
            }
            BatchOutcome::Failed { reason } => {
                warn!(%reason, "batch submission failed");
                self.phase = ReviewPhase::Reviewing;
                Err(ReviewError::Submission(reason))
            }
        }
    }

    /// The conflict currently presented for confirmation, if any. Conflicts
    /// are presented one at a time in arrival order.
    pub fn active_conflict(&self) -> Option<&PreparedConflict> {
        self.conflicts.front()
    }

    pub fn pending_conflicts(&self) -> usize {
        self.conflicts.len()
    }

    /// Operator confirmed the active conflict: replay its document through
    /// the forced-submit path. On success the document leaves the batch and
    /// the next queued conflict (if any) becomes active; on failure queue and
    /// batch are untouched so the operator can retry or cancel.
    pub async fn confirm_active_conflict(&mut self) -> Result<ForcedReceipt, ReviewError> {
        match self.phase {
            ReviewPhase::Reviewing => {}
            ReviewPhase::Submitting => return Err(ReviewError::SubmissionInFlight),
            other => return Err(ReviewError::InvalidPhase(other)),
        }
        let Some(active) = self.conflicts.front() else {
            return Err(ReviewError::NoActiveConflict);
        };
        let pending = active.pending.clone();
        info!(
            arquivo = %pending.file.name,
            tipo = ?active.report.tipo,
            "conflict confirmed, forcing submission"
        );

        self.phase = ReviewPhase::Submitting;
        let outcome = self.submitter.submit_forced(&pending).await;
        self.phase = ReviewPhase::Reviewing;

        match outcome {
            ForcedOutcome::Accepted(receipt) => {
                if let Some(resolved) = self.conflicts.pop_front() {
                    self.batch.remove(&resolved.document_id);
                    self.conflicts
                        .retain(|conflict| conflict.document_id != resolved.document_id);
                }
                if self.conflicts.is_empty() && self.batch.is_empty() {
                    self.finish_success();
                }
                Ok(receipt)
            }
            ForcedOutcome::Failed { reason } => {
                warn!(%reason, "forced submission failed");
                Err(ReviewError::Submission(reason))
            }
        }
    }

    /// Operator dismissed the active conflict: its forced submission is
    /// discarded, the next queued conflict (if any) becomes active, and the
    /// batch stays untouched for a later manual resubmit.
    pub fn cancel_active_conflict(&mut self) -> Option<PreparedConflict> {
        let discarded = self.conflicts.pop_front();
        if let Some(conflict) = &discarded {
            debug!(
                arquivo = conflict.report.arquivo.as_deref().unwrap_or("?"),
                "conflict dismissed"
            );
        }
        discarded
    }

    fn guard_can_add(&self) -> Result<(), ReviewError> {
        match self.phase {
            ReviewPhase::Idle | ReviewPhase::Reviewing => Ok(()),
            ReviewPhase::Submitting => Err(ReviewError::SubmissionInFlight),
            other => Err(ReviewError::InvalidPhase(other)),
        }
    }

    async fn extract_documents(&mut self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        self.phase = ReviewPhase::Extracting;
        self.batch.mark_extracting(&ids);

        let mut jobs = Vec::new();
        for id in &ids {
            let extractor = Arc::clone(&self.extractor);
            let source = self.batch.get(id).map(|doc| doc.source.clone());
            let id = id.clone();
            jobs.push(async move {
                match source {
                    Some(source) => {
                        let outcome = extractor.extract(&source).await;
                        (id, outcome)
                    }
                    None => (
                        id,
                        Err(ExtractionFailure::new("documento removido antes da extração")),
                    ),
                }
            });
        }

        for (id, outcome) in join_all(jobs).await {
            self.batch.apply_extraction(&id, outcome);
        }
        self.phase = ReviewPhase::Reviewing;
        debug!(
            total = self.batch.len(),
            ready = self.batch.ready_count(),
            "extraction round settled"
        );
    }

    /// Terminal success path: release previews, clear everything, notify the
    /// host exactly once.
    fn finish_success(&mut self) {
        self.batch.clear();
        self.conflicts.clear();
        self.phase = ReviewPhase::Idle;
        info!("fatura upload round completed");
        if self.events.send(ReviewEvent::UploadSucceeded).is_err() {
            debug!("no live listener for the upload notification");
        }
    }
}
