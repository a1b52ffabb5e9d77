use anyhow::Result;
use async_trait::async_trait;
use jsonschema::JSONSchema;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ExtractionFailure;
use crate::models::{ExtractedFields, SourceFile};

/// Submits one file for data extraction.
///
/// Implementations never panic and never let a transport error escape: the
/// caller always receives a tagged result, so extracting a batch of N files
/// cannot be aborted by one failure.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    async fn extract(&self, file: &SourceFile) -> Result<ExtractedFields, ExtractionFailure>;
}

/// Gateway over `POST /faturas/extract_data/`.
pub struct HttpExtractionGateway {
    client: reqwest::Client,
    config: ApiConfig,
    schema: JSONSchema,
}

impl HttpExtractionGateway {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(HttpExtractionGateway {
            client,
            config,
            schema: extraction_schema(),
        })
    }
}

#[async_trait]
impl ExtractionGateway for HttpExtractionGateway {
    async fn extract(&self, file: &SourceFile) -> Result<ExtractedFields, ExtractionFailure> {
        let part = Part::bytes(file.bytes.as_ref().clone())
            .file_name(file.name.clone())
            .mime_str("application/pdf")
            .map_err(|e| ExtractionFailure::new(e.to_string()))?;
        let form = Form::new().part("fatura", part);

        let mut request = self
            .client
            .post(self.config.endpoint("/faturas/extract_data/"))
            .multipart(form);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(name = %file.name, size = file.size, "extracting fatura data");
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(name = %file.name, %err, "extraction request failed");
                return Err(ExtractionFailure::new(format!(
                    "falha de rede na extração: {}",
                    err
                )));
            }
        };

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                return Err(ExtractionFailure::new(format!(
                    "resposta inválida do servidor: {}",
                    err
                )))
            }
        };

        if !status.is_success() {
            return Err(ExtractionFailure::new(error_reason(&body, status)));
        }
        if !self.schema.is_valid(&body) {
            warn!(name = %file.name, "extraction response failed schema validation");
            return Err(ExtractionFailure::new(
                "dados extraídos fora do formato esperado",
            ));
        }

        match body {
            Value::Object(fields) => Ok(fields),
            _ => Err(ExtractionFailure::new(
                "dados extraídos fora do formato esperado",
            )),
        }
    }
}

fn error_reason(body: &Value, status: StatusCode) -> String {
    body.get("error")
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("erro {} na extração", status.as_u16()))
}

fn extraction_schema() -> JSONSchema {
    let schema = json!({
        "type": "object",
        "required": ["unidade_consumidora", "mes_referencia"],
        "properties": {
            "unidade_consumidora": {"type": ["string", "null"]},
            "mes_referencia": {"type": ["string", "null"]},
            "valor_total": {"type": ["string", "number", "null"]},
            "data_vencimento": {"type": ["string", "null"]},
            "consumo_kwh": {"type": ["string", "number", "null"]},
            "saldo_kwh": {"type": ["string", "number", "null"]},
            "energia_injetada": {"type": ["string", "number", "null"]},
            "consumo_scee": {"type": ["string", "number", "null"]},
            "nome_cliente": {"type": ["string", "null"]},
            "cpf_cnpj": {"type": ["string", "null"]},
            "cnpj": {"type": ["string", "null"]}
        }
    });

    JSONSchema::compile(&schema).expect("Invalid JSON schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_accepts_backend_payload() {
        let schema = extraction_schema();
        let payload = json!({
            "unidade_consumidora": "101234567",
            "mes_referencia": "JAN/2025",
            "valor_total": "189,90",
            "data_vencimento": "10/02/2025",
            "consumo_kwh": 350,
            "nome_cliente": "João Lima",
            "dados_completos": {"extra": true}
        });
        assert!(schema.is_valid(&payload));
    }

    #[test]
    fn schema_rejects_missing_uc_and_non_objects() {
        let schema = extraction_schema();
        assert!(!schema.is_valid(&json!({"mes_referencia": "JAN/2025"})));
        assert!(!schema.is_valid(&json!("texto solto")));
    }

    #[test]
    fn error_reason_prefers_server_message() {
        let body = json!({"error": "Apenas arquivos PDF são aceitos"});
        assert_eq!(
            error_reason(&body, StatusCode::BAD_REQUEST),
            "Apenas arquivos PDF são aceitos"
        );
        assert_eq!(
            error_reason(&json!({}), StatusCode::INTERNAL_SERVER_ERROR),
            "erro 500 na extração"
        );
    }
}
