use serde::{Deserialize, Serialize};

/// Matches the web client's transport defaults (30 s request timeout).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings shared by the HTTP gateways.
///
/// Token storage and refresh live with the host's session layer; the
/// gateways only attach whatever bearer token the host put here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ApiConfig {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ApiConfig::new("https://app.example.com/api/");
        assert_eq!(
            config.endpoint("/faturas/extract_data/"),
            "https://app.example.com/api/faturas/extract_data/"
        );
    }

    #[test]
    fn timeout_defaults_when_absent_from_json() {
        let config: ApiConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost:8000/api", "auth_token": null}"#)
                .unwrap();
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
