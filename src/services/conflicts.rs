use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::error::CorrelationFailure;
use crate::models::{ConflictReport, PendingForcedSubmission};
use crate::services::batch::DocumentBatch;
use crate::utils::canonical_period;

/// A conflict report correlated to a document in the batch, ready to be
/// presented for confirmation and replayed as a forced submission.
#[derive(Debug, Clone)]
pub struct PreparedConflict {
    pub report: ConflictReport,
    pub document_id: String,
    pub pending: PendingForcedSubmission,
}

/// Splits reports into those the protocol can resolve by forced submission
/// and those that are informational only (unregistered UC, unknown kinds).
pub fn partition_reports(avisos: Vec<ConflictReport>) -> (Vec<ConflictReport>, Vec<ConflictReport>) {
    avisos.into_iter().partition(|aviso| aviso.tipo.is_resolvable())
}

/// Correlates each report to a batch document by exact file-name match and
/// builds its forced-submission payload. Reports that cannot be correlated
/// come back as failures without blocking the rest; queue order follows
/// arrival order.
pub fn correlate(
    reports: Vec<ConflictReport>,
    batch: &DocumentBatch,
) -> (VecDeque<PreparedConflict>, Vec<CorrelationFailure>) {
    let mut queue = VecDeque::new();
    let mut failures = Vec::new();

    for report in reports {
        match prepare(&report, batch) {
            Ok(prepared) => {
                debug!(
                    arquivo = prepared.report.arquivo.as_deref().unwrap_or("?"),
                    uc = %prepared.pending.uc_codigo,
                    "conflict queued for confirmation"
                );
                queue.push_back(prepared);
            }
            Err(reason) => {
                warn!(%reason, "conflict could not be correlated");
                failures.push(CorrelationFailure { report, reason });
            }
        }
    }

    (queue, failures)
}

fn prepare(report: &ConflictReport, batch: &DocumentBatch) -> Result<PreparedConflict, String> {
    let Some(file_name) = report.arquivo.as_deref() else {
        return Err("aviso sem arquivo de referência".to_string());
    };
    let Some(document) = batch.find_by_file_name(file_name) else {
        return Err(format!(
            "nenhum documento no lote corresponde ao arquivo {}",
            file_name
        ));
    };

    let uc_codigo = report
        .uc_codigo
        .clone()
        .or_else(|| document.edited_field_str("unidade_consumidora"))
        .ok_or_else(|| format!("aviso para {} sem código de UC", file_name))?;

    // The report carries the period for duplicates; ownership conflicts fall
    // back to the document's own (possibly edited) field.
    let raw_period = report
        .mes_referencia
        .clone()
        .or_else(|| document.edited_field_str("mes_referencia"))
        .ok_or_else(|| format!("aviso para {} sem mês de referência", file_name))?;
    let mes_referencia = canonical_period(&raw_period)
        .ok_or_else(|| format!("mês de referência inválido: {}", raw_period))?;

    Ok(PreparedConflict {
        report: report.clone(),
        document_id: document.id.clone(),
        pending: PendingForcedSubmission {
            file: document.source.clone(),
            uc_codigo,
            mes_referencia,
            dados_extraidos: document.edited.clone().unwrap_or_default(),
        },
    })
}
