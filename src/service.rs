use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::error::HarvestError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Failures of the generative completion service itself
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Reply has no candidate text")]
    EmptyReply,
    #[error("Timeout: request took longer than {0} seconds")]
    Timeout(u64),
}

/// One "generate structured completion" call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub response_schema: Value,
    pub temperature: f32,
}

/// External collaborator that turns a prompt + schema into JSON-shaped text
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, ServiceError>;

    /// Model identifier requests should be addressed to
    fn model(&self) -> &str {
        DEFAULT_MODEL
    }

    /// Upper bound on a single `generate` call
    fn timeout(&self) -> Duration {
        Duration::from_secs(DEFAULT_TIMEOUT_SECS)
    }
}

/// Connection settings for the Gemini API
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ServiceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Validate that the credential is usable
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.api_key.trim().is_empty() {
            return Err(HarvestError::Config(
                "GEMINI_API_KEY is not set (use --api-key or the environment)".to_string(),
            ));
        }
        if let Err(e) = url::Url::parse(&self.base_url) {
            return Err(HarvestError::Config(format!(
                "Invalid base URL {}: {}",
                self.base_url, e
            )));
        }
        Ok(())
    }
}

/// Gemini `generateContent` over REST
pub struct GeminiService {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl GeminiService {
    pub fn new(config: ServiceConfig) -> Result<Self, HarvestError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HarvestError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }
}

/// Request body in the shape `generateContent` expects
pub fn request_body(request: &CompletionRequest) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": request.prompt }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.response_schema,
            "temperature": request.temperature,
        }
    })
}

/// Pull `candidates[0].content.parts[0].text` out of a reply
pub fn candidate_text(reply: &Value) -> Option<&str> {
    reply
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

#[async_trait]
impl CompletionService for GeminiService {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let url = self.endpoint(&request.model);
        log::debug!("POST {} (temperature {})", url, request.temperature);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.config.timeout.as_secs())
                } else {
                    ServiceError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Non-success status code: {}", status.as_u16());
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: Value = response.json().await?;
        candidate_text(&reply)
            .map(str::to_string)
            .ok_or(ServiceError::EmptyReply)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CompletionRequest {
        CompletionRequest {
            model: DEFAULT_MODEL.to_string(),
            prompt: "extract".to_string(),
            response_schema: json!({ "type": "ARRAY" }),
            temperature: 0.1,
        }
    }

    #[test]
    fn body_carries_schema_and_temperature() {
        let body = request_body(&sample_request());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "extract");
        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "ARRAY");
        assert!((config["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn candidate_text_is_extracted() {
        let reply = json!({
            "candidates": [{ "content": { "parts": [{ "text": "[]" }] } }]
        });
        assert_eq!(candidate_text(&reply), Some("[]"));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn blank_key_is_rejected() {
        let config = ServiceConfig::new("  ");
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
        assert!(GeminiService::new(config).is_err());
    }

    #[test]
    fn endpoint_includes_model() {
        let mut config = ServiceConfig::new("key");
        config.base_url = "http://localhost:8080/".to_string();
        let service = GeminiService::new(config).unwrap();
        assert_eq!(
            service.endpoint("gemini-2.5-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn service_reports_configured_model_and_timeout() {
        let mut config = ServiceConfig::new("key");
        config.model = "gemini-custom".to_string();
        config.timeout = Duration::from_secs(5);
        let service = GeminiService::new(config).unwrap();
        assert_eq!(service.model(), "gemini-custom");
        assert_eq!(service.timeout(), Duration::from_secs(5));
    }
}
