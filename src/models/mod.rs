use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Field-name to value mapping produced by the backend extractor.
///
/// The backend returns a flat JSON object (`unidade_consumidora`,
/// `mes_referencia`, `valor_total`, ...); the exact key set varies per
/// distributor, so documents carry the map as-is instead of a fixed struct.
pub type ExtractedFields = serde_json::Map<String, Value>;

/// Raw uploaded file: name, size and payload. Immutable after creation.
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    pub bytes: Arc<Vec<u8>>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        SourceFile {
            name: name.into(),
            size,
            bytes: Arc::new(bytes),
        }
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Extracting,
    Ready,
    ExtractionFailed,
}

/// Lifecycle phase of the review session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPhase {
    Idle,
    Extracting,
    Reviewing,
    Submitting,
}

/// Conflict categories reported by the backend in `avisos`.
///
/// Only the first two can be resolved with a forced submission. A fatura
/// whose UC is registered under no customer at all (`uc_nao_encontrada`)
/// cannot be forced; the UC has to be registered first. Unknown `tipo`
/// strings map to `Desconhecido` and are treated the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    FaturaDuplicada,
    UcOutroCliente,
    UcNaoEncontrada,
    #[serde(other)]
    Desconhecido,
}

impl ConflictKind {
    pub fn is_resolvable(&self) -> bool {
        matches!(self, ConflictKind::FaturaDuplicada | ConflictKind::UcOutroCliente)
    }
}

/// One backend-reported conflict, wire-faithful to an `avisos` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    pub tipo: ConflictKind,
    /// File name the conflict refers to; correlates back to a document.
    #[serde(default)]
    pub arquivo: Option<String>,
    #[serde(default)]
    pub uc_codigo: Option<String>,
    #[serde(default)]
    pub mes_referencia: Option<String>,
    /// Current owner of the UC, for `uc_outro_cliente`.
    #[serde(default)]
    pub cliente_nome: Option<String>,
    #[serde(default)]
    pub cliente_id: Option<i64>,
    #[serde(default)]
    pub fatura_existente_id: Option<i64>,
    #[serde(default)]
    pub mensagem: Option<String>,
}

/// Everything needed to replay one document as a forced submission after the
/// operator confirmed a conflict.
#[derive(Debug, Clone)]
pub struct PendingForcedSubmission {
    pub file: SourceFile,
    pub uc_codigo: String,
    /// Canonical `MM/YYYY`.
    pub mes_referencia: String,
    /// Snapshot of the document's edited field data.
    pub dados_extraidos: ExtractedFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSummary {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub faturas_processadas: Vec<ProcessedFatura>,
    #[serde(default)]
    pub faturas_com_erro: Vec<FaturaErro>,
    #[serde(default)]
    pub total_enviadas: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFatura {
    #[serde(default)]
    pub id: Option<i64>,
    pub arquivo: String,
    #[serde(default)]
    pub uc: Option<String>,
    // mes_referencia and valor come back in more than one shape depending on
    // the endpoint (ISO date vs. MM/YYYY, string vs. number), so stay loose.
    #[serde(default)]
    pub mes_referencia: Option<Value>,
    #[serde(default)]
    pub valor: Option<Value>,
    #[serde(default)]
    pub dados_extraidos: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaturaErro {
    pub arquivo: String,
    pub erro: String,
}

/// Confirmation returned by the force-upload endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForcedReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub fatura: Option<FaturaInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaturaInfo {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub uc: Option<String>,
    #[serde(default)]
    pub mes_referencia: Option<String>,
    #[serde(default)]
    pub valor: Option<String>,
    #[serde(default)]
    pub vencimento: Option<String>,
}
