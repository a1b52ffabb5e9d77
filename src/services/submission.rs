use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::models::{
    ConflictKind, ConflictReport, FaturaErro, ForcedReceipt, PendingForcedSubmission,
    ProcessedFatura, SourceFile, UploadSummary,
};

/// Result of a batch submission. Conflicts are a recoverable control-flow
/// branch, distinct from failure: the conflict path continues through the
/// resolution protocol, a `Failed` outcome only allows retrying.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Fully accepted; may still carry per-item errors in the summary.
    Accepted(UploadSummary),
    ConflictsReported {
        avisos: Vec<ConflictReport>,
        summary: UploadSummary,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub enum ForcedOutcome {
    Accepted(ForcedReceipt),
    Failed { reason: String },
}

#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Sends every ready document's raw file in one request.
    async fn submit_batch(&self, files: &[SourceFile]) -> BatchOutcome;

    /// Replays exactly one file with its correlated metadata after the
    /// operator confirmed a conflict.
    async fn submit_forced(&self, pending: &PendingForcedSubmission) -> ForcedOutcome;
}

/// Gateway over the per-customer fatura upload endpoints.
pub struct HttpSubmissionGateway {
    client: reqwest::Client,
    config: ApiConfig,
    customer_id: i64,
}

impl HttpSubmissionGateway {
    pub fn new(config: ApiConfig, customer_id: i64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(HttpSubmissionGateway {
            client,
            config,
            customer_id,
        })
    }

    fn customer_endpoint(&self, suffix: &str) -> String {
        self.config
            .endpoint(&format!("/customers/{}/faturas/{}", self.customer_id, suffix))
    }
}

#[async_trait]
impl SubmissionGateway for HttpSubmissionGateway {
    async fn submit_batch(&self, files: &[SourceFile]) -> BatchOutcome {
        let mut form = Form::new();
        for file in files {
            let part = match Part::bytes(file.bytes.as_ref().clone())
                .file_name(file.name.clone())
                .mime_str("application/pdf")
            {
                Ok(part) => part,
                Err(err) => {
                    return BatchOutcome::Failed {
                        reason: format!("arquivo inválido {}: {}", file.name, err),
                    }
                }
            };
            form = form.part("faturas", part);
        }

        let mut request = self
            .client
            .post(self.customer_endpoint("upload-with-extraction/"))
            .multipart(form);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        info!(count = files.len(), customer = self.customer_id, "uploading fatura batch");
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "batch upload request failed");
                return BatchOutcome::Failed {
                    reason: format!("falha de rede no envio: {}", err),
                };
            }
        };

        let status = response.status();
        let body: UploadResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                return BatchOutcome::Failed {
                    reason: format!("erro {}: resposta inválida do servidor ({})", status.as_u16(), err),
                }
            }
        };

        let first_file = files.first().map(|file| file.name.as_str());
        classify_batch_response(status, body, first_file)
    }

    async fn submit_forced(&self, pending: &PendingForcedSubmission) -> ForcedOutcome {
        let part = match Part::bytes(pending.file.bytes.as_ref().clone())
            .file_name(pending.file.name.clone())
            .mime_str("application/pdf")
        {
            Ok(part) => part,
            Err(err) => {
                return ForcedOutcome::Failed {
                    reason: format!("arquivo inválido {}: {}", pending.file.name, err),
                }
            }
        };
        let dados_extraidos = match serde_json::to_string(&pending.dados_extraidos) {
            Ok(serialized) => serialized,
            Err(err) => {
                return ForcedOutcome::Failed {
                    reason: format!("dados extraídos não serializáveis: {}", err),
                }
            }
        };
        let form = Form::new()
            .part("arquivo", part)
            .text("uc_codigo", pending.uc_codigo.clone())
            .text("mes_referencia", pending.mes_referencia.clone())
            .text("dados_extraidos", dados_extraidos);

        let mut request = self
            .client
            .post(self.customer_endpoint("force-upload/"))
            .multipart(form);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        info!(
            name = %pending.file.name,
            uc = %pending.uc_codigo,
            mes = %pending.mes_referencia,
            "forcing fatura upload"
        );
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "forced upload request failed");
                return ForcedOutcome::Failed {
                    reason: format!("falha de rede no envio: {}", err),
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            // The fatura exists server-side at this point; a body that does
            // not parse must not be reported back as a failed upload.
            let receipt = response.json().await.unwrap_or_else(|err| {
                warn!(%err, "forced upload succeeded but receipt did not parse");
                ForcedReceipt::default()
            });
            return ForcedOutcome::Accepted(receipt);
        }

        let reason = match response.json::<ErrorBody>().await {
            Ok(body) => body
                .error
                .unwrap_or_else(|| format!("erro {} no envio forçado", status.as_u16())),
            Err(_) => format!("erro {} no envio forçado", status.as_u16()),
        };
        ForcedOutcome::Failed { reason }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    faturas_processadas: Vec<ProcessedFatura>,
    #[serde(default)]
    faturas_com_erro: Vec<FaturaErro>,
    #[serde(default)]
    avisos: Vec<ConflictReport>,
    #[serde(default)]
    total_enviadas: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Collapses the backend's two conflict shapes into one outcome: a body with
/// `avisos` wins over the HTTP status (the server has signaled conflicts both
/// as 409 and as 201-with-avisos), and a bare 409 is normalized into a
/// synthetic duplicate report against the first submitted file.
fn classify_batch_response(
    status: StatusCode,
    body: UploadResponse,
    first_file: Option<&str>,
) -> BatchOutcome {
    let UploadResponse {
        message,
        faturas_processadas,
        faturas_com_erro,
        mut avisos,
        total_enviadas,
        error,
    } = body;
    let summary = UploadSummary {
        message,
        faturas_processadas,
        faturas_com_erro,
        total_enviadas,
    };

    if avisos.is_empty() && status == StatusCode::CONFLICT {
        avisos.push(ConflictReport {
            tipo: ConflictKind::FaturaDuplicada,
            arquivo: first_file.map(str::to_string),
            uc_codigo: None,
            mes_referencia: None,
            cliente_nome: None,
            cliente_id: None,
            fatura_existente_id: None,
            mensagem: error.clone().or(Some("Conflito detectado.".to_string())),
        });
    }

    if !avisos.is_empty() {
        return BatchOutcome::ConflictsReported { avisos, summary };
    }
    if status.is_success() {
        return BatchOutcome::Accepted(summary);
    }
    BatchOutcome::Failed {
        reason: error.unwrap_or_else(|| format!("erro {} no envio das faturas", status.as_u16())),
    }
}
