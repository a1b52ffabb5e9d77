use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc, Mutex};

use fatura_review::{
    BatchOutcome, ConflictKind, ConflictReport, DocumentStatus, ExtractedFields,
    ExtractionFailure, ExtractionGateway, ForcedOutcome, ForcedReceipt, PendingForcedSubmission,
    ReviewError, ReviewEvent, ReviewOrchestrator, ReviewPhase, SourceFile, SubmissionGateway,
    SubmitOutcome, UploadSummary,
};

/// Extractor scripted per file name; unscripted names fail extraction.
struct ScriptedExtractor {
    by_name: HashMap<String, Result<ExtractedFields, ExtractionFailure>>,
}

impl ScriptedExtractor {
    fn new() -> Self {
        ScriptedExtractor {
            by_name: HashMap::new(),
        }
    }

    fn ok(mut self, name: &str, fields: ExtractedFields) -> Self {
        self.by_name.insert(name.to_string(), Ok(fields));
        self
    }

    fn fail(mut self, name: &str, reason: &str) -> Self {
        self.by_name
            .insert(name.to_string(), Err(ExtractionFailure::new(reason)));
        self
    }
}

#[async_trait]
impl ExtractionGateway for ScriptedExtractor {
    async fn extract(&self, file: &SourceFile) -> Result<ExtractedFields, ExtractionFailure> {
        self.by_name
            .get(&file.name)
            .cloned()
            .unwrap_or_else(|| Err(ExtractionFailure::new("arquivo não roteirizado")))
    }
}

/// Submitter with queued outcomes and call recording.
#[derive(Default)]
struct ScriptedSubmitter {
    batch_outcomes: Mutex<VecDeque<BatchOutcome>>,
    forced_outcomes: Mutex<VecDeque<ForcedOutcome>>,
    batch_calls: Mutex<Vec<Vec<String>>>,
    forced_calls: Mutex<Vec<PendingForcedSubmission>>,
}

impl ScriptedSubmitter {
    fn push_batch(&self, outcome: BatchOutcome) {
        self.batch_outcomes.lock().unwrap().push_back(outcome);
    }

    fn push_forced(&self, outcome: ForcedOutcome) {
        self.forced_outcomes.lock().unwrap().push_back(outcome);
    }

    fn batch_call_count(&self) -> usize {
        self.batch_calls.lock().unwrap().len()
    }

    fn forced_call_count(&self) -> usize {
        self.forced_calls.lock().unwrap().len()
    }

    fn last_forced_call(&self) -> PendingForcedSubmission {
        self.forced_calls.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl SubmissionGateway for ScriptedSubmitter {
    async fn submit_batch(&self, files: &[SourceFile]) -> BatchOutcome {
        self.batch_calls
            .lock()
            .unwrap()
            .push(files.iter().map(|file| file.name.clone()).collect());
        self.batch_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BatchOutcome::Failed {
                reason: "sem resposta roteirizada".to_string(),
            })
    }

    async fn submit_forced(&self, pending: &PendingForcedSubmission) -> ForcedOutcome {
        self.forced_calls.lock().unwrap().push(pending.clone());
        self.forced_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ForcedOutcome::Failed {
                reason: "sem resposta roteirizada".to_string(),
            })
    }
}

fn fields(uc: &str, mes: &str) -> ExtractedFields {
    let mut map = ExtractedFields::new();
    map.insert("unidade_consumidora".to_string(), json!(uc));
    map.insert("mes_referencia".to_string(), json!(mes));
    map.insert("valor_total".to_string(), json!("189,90"));
    map
}

fn pdf(name: &str) -> SourceFile {
    SourceFile::new(name, format!("%PDF-1.4 {}", name).into_bytes())
}

fn aviso(tipo: ConflictKind, arquivo: &str) -> ConflictReport {
    ConflictReport {
        tipo,
        arquivo: Some(arquivo.to_string()),
        uc_codigo: Some("101234567".to_string()),
        mes_referencia: Some("01/2025".to_string()),
        cliente_nome: None,
        cliente_id: None,
        fatura_existente_id: None,
        mensagem: None,
    }
}

struct Harness {
    orchestrator: ReviewOrchestrator,
    submitter: Arc<ScriptedSubmitter>,
    events: mpsc::Receiver<ReviewEvent>,
}

fn harness(extractor: ScriptedExtractor) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let submitter = Arc::new(ScriptedSubmitter::default());
    let (tx, rx) = mpsc::channel();
    let orchestrator = ReviewOrchestrator::new(Arc::new(extractor), submitter.clone(), tx);
    Harness {
        orchestrator,
        submitter,
        events: rx,
    }
}

#[tokio::test]
async fn partial_extraction_failure_still_reaches_reviewing() {
    let extractor = ScriptedExtractor::new()
        .ok("a.pdf", fields("101", "JAN/2025"))
        .fail("b.pdf", "PDF sem texto")
        .ok("c.pdf", fields("103", "FEV/2025"));
    let mut h = harness(extractor);

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")])
        .await
        .unwrap();

    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
    let statuses: Vec<DocumentStatus> = h
        .orchestrator
        .documents()
        .iter()
        .map(|doc| doc.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            DocumentStatus::Ready,
            DocumentStatus::ExtractionFailed,
            DocumentStatus::Ready
        ]
    );
    let failed = &h.orchestrator.documents()[1];
    assert_eq!(failed.error.as_deref(), Some("PDF sem texto"));
}

#[tokio::test]
async fn submit_without_ready_documents_makes_no_network_call() {
    let extractor = ScriptedExtractor::new().fail("a.pdf", "PDF sem texto");
    let mut h = harness(extractor);

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf")])
        .await
        .unwrap();

    let result = h.orchestrator.submit().await;
    assert!(matches!(result, Err(ReviewError::NoEligibleDocuments)));
    assert_eq!(h.submitter.batch_call_count(), 0);
    assert_eq!(h.orchestrator.documents().len(), 1);
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
}

#[tokio::test]
async fn successful_submission_clears_batch_and_notifies_once() {
    let extractor = ScriptedExtractor::new()
        .ok("a.pdf", fields("101", "JAN/2025"))
        .ok("b.pdf", fields("102", "JAN/2025"));
    let mut h = harness(extractor);
    h.submitter.push_batch(BatchOutcome::Accepted(UploadSummary {
        message: Some("2 fatura(s) processada(s) com sucesso".to_string()),
        ..UploadSummary::default()
    }));

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();
    let outcome = h.orchestrator.submit().await.unwrap();

    assert!(matches!(outcome, SubmitOutcome::Completed(_)));
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Idle);
    assert!(h.orchestrator.documents().is_empty());
    assert_eq!(h.events.try_iter().count(), 1);
    assert_eq!(h.submitter.batch_call_count(), 1);
}

#[tokio::test]
async fn duplicate_conflict_is_resolved_by_forced_submit() {
    // Drop 2 PDFs, both extract; the server flags B as a duplicate; A stays
    // ready and untouched while B is confirmed, forced and removed.
    let extractor = ScriptedExtractor::new()
        .ok("a.pdf", fields("101", "JAN/2025"))
        .ok("b.pdf", fields("202", "JAN/2025"));
    let mut h = harness(extractor);

    let mut duplicate = aviso(ConflictKind::FaturaDuplicada, "b.pdf");
    duplicate.uc_codigo = Some("202".to_string());
    duplicate.mes_referencia = None; // forces the fallback to the edited field
    h.submitter.push_batch(BatchOutcome::ConflictsReported {
        avisos: vec![duplicate],
        summary: UploadSummary::default(),
    });
    h.submitter
        .push_forced(ForcedOutcome::Accepted(ForcedReceipt::default()));

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();

    // user edits B before submitting; the forced payload must carry the edit
    let b_id = h.orchestrator.documents()[1].id.clone();
    h.orchestrator
        .update_field(&b_id, "valor_total", json!("250,00"));

    let outcome = h.orchestrator.submit().await.unwrap();
    match outcome {
        SubmitOutcome::ConflictsPending {
            queued, unmatched, ..
        } => {
            assert_eq!(queued, 1);
            assert!(unmatched.is_empty());
        }
        other => panic!("expected ConflictsPending, got {:?}", other),
    }
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);

    let active = h.orchestrator.active_conflict().unwrap();
    assert_eq!(active.pending.file.name, "b.pdf");

    h.orchestrator.confirm_active_conflict().await.unwrap();

    let forced = h.submitter.last_forced_call();
    assert_eq!(forced.uc_codigo, "202");
    assert_eq!(forced.mes_referencia, "01/2025"); // canonicalized from JAN/2025
    assert_eq!(forced.dados_extraidos["valor_total"], json!("250,00"));

    // A remains, still ready, awaiting manual resubmission
    assert_eq!(h.orchestrator.documents().len(), 1);
    assert_eq!(h.orchestrator.documents()[0].source.name, "a.pdf");
    assert_eq!(h.orchestrator.documents()[0].status, DocumentStatus::Ready);
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
    assert_eq!(h.events.try_iter().count(), 0);
}

#[tokio::test]
async fn uncorrelated_conflicts_do_not_block_the_matched_ones() {
    let extractor = ScriptedExtractor::new()
        .ok("a.pdf", fields("101", "JAN/2025"))
        .ok("b.pdf", fields("102", "FEV/2025"));
    let mut h = harness(extractor);

    h.submitter.push_batch(BatchOutcome::ConflictsReported {
        avisos: vec![
            aviso(ConflictKind::FaturaDuplicada, "a.pdf"),
            aviso(ConflictKind::FaturaDuplicada, "nunca-enviado.pdf"),
            aviso(ConflictKind::UcOutroCliente, "b.pdf"),
        ],
        summary: UploadSummary::default(),
    });
    h.submitter
        .push_forced(ForcedOutcome::Accepted(ForcedReceipt::default()));
    h.submitter
        .push_forced(ForcedOutcome::Accepted(ForcedReceipt::default()));

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();
    let outcome = h.orchestrator.submit().await.unwrap();

    match outcome {
        SubmitOutcome::ConflictsPending {
            queued, unmatched, ..
        } => {
            assert_eq!(queued, 2);
            assert_eq!(unmatched.len(), 1);
            assert_eq!(
                unmatched[0].report.arquivo.as_deref(),
                Some("nunca-enviado.pdf")
            );
        }
        other => panic!("expected ConflictsPending, got {:?}", other),
    }

    // prompts come in arrival order: a.pdf then b.pdf
    assert_eq!(
        h.orchestrator.active_conflict().unwrap().pending.file.name,
        "a.pdf"
    );
    h.orchestrator.confirm_active_conflict().await.unwrap();
    assert_eq!(
        h.orchestrator.active_conflict().unwrap().pending.file.name,
        "b.pdf"
    );
    h.orchestrator.confirm_active_conflict().await.unwrap();

    // batch emptied by the last resolution: back to idle, notified once
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Idle);
    assert_eq!(h.orchestrator.documents().len(), 0);
    assert_eq!(h.submitter.forced_call_count(), 2);
    assert_eq!(h.events.try_iter().count(), 1);
}

#[tokio::test]
async fn forced_failure_keeps_queue_and_batch_for_retry() {
    let extractor = ScriptedExtractor::new().ok("a.pdf", fields("101", "JAN/2025"));
    let mut h = harness(extractor);

    h.submitter.push_batch(BatchOutcome::ConflictsReported {
        avisos: vec![aviso(ConflictKind::FaturaDuplicada, "a.pdf")],
        summary: UploadSummary::default(),
    });
    h.submitter.push_forced(ForcedOutcome::Failed {
        reason: "UC não encontrada".to_string(),
    });
    h.submitter
        .push_forced(ForcedOutcome::Accepted(ForcedReceipt::default()));

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf")])
        .await
        .unwrap();
    h.orchestrator.submit().await.unwrap();

    let result = h.orchestrator.confirm_active_conflict().await;
    match result {
        Err(ReviewError::Submission(reason)) => assert_eq!(reason, "UC não encontrada"),
        other => panic!("expected Submission error, got {:?}", other),
    }
    assert_eq!(h.orchestrator.pending_conflicts(), 1);
    assert_eq!(h.orchestrator.documents().len(), 1);

    // retry succeeds and drains the session
    h.orchestrator.confirm_active_conflict().await.unwrap();
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Idle);
    assert_eq!(h.events.try_iter().count(), 1);
}

#[tokio::test]
async fn cancelling_advances_to_the_next_conflict() {
    let extractor = ScriptedExtractor::new()
        .ok("a.pdf", fields("101", "JAN/2025"))
        .ok("b.pdf", fields("102", "JAN/2025"));
    let mut h = harness(extractor);

    h.submitter.push_batch(BatchOutcome::ConflictsReported {
        avisos: vec![
            aviso(ConflictKind::FaturaDuplicada, "a.pdf"),
            aviso(ConflictKind::FaturaDuplicada, "b.pdf"),
        ],
        summary: UploadSummary::default(),
    });

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();
    h.orchestrator.submit().await.unwrap();

    let dismissed = h.orchestrator.cancel_active_conflict().unwrap();
    assert_eq!(dismissed.pending.file.name, "a.pdf");
    assert_eq!(
        h.orchestrator.active_conflict().unwrap().pending.file.name,
        "b.pdf"
    );

    h.orchestrator.cancel_active_conflict();
    assert!(h.orchestrator.active_conflict().is_none());

    // nothing was forced, nothing left the batch
    assert_eq!(h.submitter.forced_call_count(), 0);
    assert_eq!(h.orchestrator.documents().len(), 2);
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
    assert_eq!(h.events.try_iter().count(), 0);
}

#[tokio::test]
async fn unregistered_uc_warnings_are_informational_only() {
    let extractor = ScriptedExtractor::new().ok("a.pdf", fields("101", "JAN/2025"));
    let mut h = harness(extractor);

    h.submitter.push_batch(BatchOutcome::ConflictsReported {
        avisos: vec![aviso(ConflictKind::UcNaoEncontrada, "a.pdf")],
        summary: UploadSummary::default(),
    });

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf")])
        .await
        .unwrap();
    let outcome = h.orchestrator.submit().await.unwrap();

    match outcome {
        SubmitOutcome::ConflictsPending {
            queued,
            informational,
            ..
        } => {
            assert_eq!(queued, 0);
            assert_eq!(informational.len(), 1);
            assert_eq!(informational[0].tipo, ConflictKind::UcNaoEncontrada);
        }
        other => panic!("expected ConflictsPending, got {:?}", other),
    }
    assert!(h.orchestrator.active_conflict().is_none());
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
}

#[tokio::test]
async fn hard_failure_returns_to_reviewing_for_retry() {
    let extractor = ScriptedExtractor::new().ok("a.pdf", fields("101", "JAN/2025"));
    let mut h = harness(extractor);

    h.submitter.push_batch(BatchOutcome::Failed {
        reason: "Erro interno: banco indisponível".to_string(),
    });
    h.submitter
        .push_batch(BatchOutcome::Accepted(UploadSummary::default()));

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf")])
        .await
        .unwrap();

    let result = h.orchestrator.submit().await;
    assert!(matches!(result, Err(ReviewError::Submission(_))));
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
    assert_eq!(h.orchestrator.documents().len(), 1);
    assert_eq!(h.events.try_iter().count(), 0);

    // edit-and-resubmit path
    let outcome = h.orchestrator.submit().await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Completed(_)));
    assert_eq!(h.events.try_iter().count(), 1);
}

#[tokio::test]
async fn adding_more_files_while_reviewing_appends() {
    let extractor = ScriptedExtractor::new()
        .ok("a.pdf", fields("101", "JAN/2025"))
        .ok("b.pdf", fields("102", "JAN/2025"));
    let mut h = harness(extractor);

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf")])
        .await
        .unwrap();
    assert_eq!(h.orchestrator.documents().len(), 1);

    h.orchestrator
        .start_review_sources(vec![pdf("b.pdf")])
        .await
        .unwrap();
    assert_eq!(h.orchestrator.documents().len(), 2);
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Reviewing);
}

#[tokio::test]
async fn removing_the_last_document_closes_the_review() {
    let extractor = ScriptedExtractor::new().ok("a.pdf", fields("101", "JAN/2025"));
    let mut h = harness(extractor);

    h.orchestrator
        .start_review_sources(vec![pdf("a.pdf")])
        .await
        .unwrap();
    let id = h.orchestrator.documents()[0].id.clone();

    h.orchestrator.remove_document(&id);
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Idle);
    assert!(h.orchestrator.documents().is_empty());

    // removing it again is a no-op
    h.orchestrator.remove_document(&id);
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Idle);
}

#[tokio::test]
async fn operations_outside_their_phase_are_rejected() {
    let extractor = ScriptedExtractor::new();
    let mut h = harness(extractor);

    let result = h.orchestrator.submit().await;
    assert!(matches!(
        result,
        Err(ReviewError::InvalidPhase(ReviewPhase::Idle))
    ));

    let result = h.orchestrator.confirm_active_conflict().await;
    assert!(matches!(
        result,
        Err(ReviewError::InvalidPhase(ReviewPhase::Idle))
    ));
}

#[tokio::test]
async fn dropping_only_non_pdfs_is_rejected() {
    let extractor = ScriptedExtractor::new();
    let mut h = harness(extractor);

    let result = h
        .orchestrator
        .start_review_sources(vec![SourceFile::new("conta.png", b"png".to_vec())])
        .await;
    assert!(matches!(result, Err(ReviewError::NoAcceptedFiles)));
    assert_eq!(h.orchestrator.phase(), ReviewPhase::Idle);
}
