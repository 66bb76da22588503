//! Vision model backend served by a GPU model server over HTTP
//!
//! Endpoints (basic auth):
//! - `POST /model/load`, `POST /model/unload`: GPU memory lifecycle
//! - `POST /generate`: one figure analysis
//! - `GET /health`: reachability
//!
//! Any failure whose detail mentions an out-of-memory condition is reported
//! as GPU resource exhaustion so the orchestrator can run recovery.

use reqwest::{RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::core::{parse_model_reply, Findings, Record};
use crate::error::ModelError;
use crate::traits::{InferenceError, VisionBackend};

const OOM_INDICATORS: [&str; 4] = [
    "cuda out of memory",
    "out of memory",
    "failed to allocate",
    "model loading failed",
];

const SYSTEM_PROMPT: &str = r#"Extract biomedical information from this pathway image in 5 categories:

1. genes: Official human gene symbols only (HGNC format: PAH, TH, TPH1). Exclude metabolites, amino acids, proteins.
2. drugs: Pharmaceutical compounds, therapeutic agents only.
3. keywords: Disease names, metabolites, amino acids, techniques, biomarkers.
4. process: Main biological process (e.g. "phenylalanine metabolism").
5. insights: Clinical relevance visible in the image.

Rules: Extract only visible terms. Use "not mentioned" if empty. No guessing.

Return JSON:
{
  "genes": "gene symbols or 'not mentioned'",
  "drugs": "drug names or 'not mentioned'",
  "keywords": "medical terms or 'not mentioned'",
  "process": "biological process or 'not mentioned'",
  "insights": "clinical insights or 'not mentioned'"
}"#;

/// True when `detail` describes GPU memory exhaustion
pub fn is_resource_exhaustion(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    OOM_INDICATORS
        .iter()
        .any(|indicator| lowered.contains(indicator))
}

pub struct HttpVisionBackend {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    max_tokens: u32,
}

impl HttpVisionBackend {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(30))
                .user_agent("figure-orchestrator/0.1")
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            max_tokens: 4096,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.username, Some(&self.password))
    }

    fn user_prompt(caption: Option<&str>) -> String {
        let context = match caption.map(str::trim).filter(|c| !c.is_empty()) {
            Some(caption) => format!("Caption: {caption}"),
            None => "No caption context".to_string(),
        };
        format!(
            "Extract comprehensive biomedical information from this pathway image.\n\n{context}\n\nReturn analysis in the exact JSON format specified."
        )
    }

    /// Pull an error description out of a failed response
    async fn failure_detail(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or(body);
        format!("HTTP {status}: {}", detail.chars().take(300).collect::<String>())
    }

    async fn lifecycle_call(&self, path: &str) -> Result<(), ModelError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .send()
            .await
            .map_err(|e| ModelError::Backend {
                reason: format!("{path}: {e}"),
            })?;

        if response.status().is_success() {
            return Ok(());
        }
        let detail = Self::failure_detail(response).await;
        if is_resource_exhaustion(&detail) {
            Err(ModelError::ResourceExhausted { detail })
        } else {
            Err(ModelError::Backend {
                reason: format!("{path}: {detail}"),
            })
        }
    }
}

fn error_message(value: &Value) -> Option<String> {
    ["error", "detail", "message"]
        .iter()
        .find_map(|field| value.get(*field))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn inference_failure(detail: String) -> InferenceError {
    if is_resource_exhaustion(&detail) {
        InferenceError::ResourceExhausted { detail }
    } else {
        InferenceError::Failed { reason: detail }
    }
}

#[async_trait::async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn allocate(&self) -> Result<(), ModelError> {
        self.lifecycle_call("/model/load").await
    }

    async fn release(&self) -> Result<(), ModelError> {
        self.lifecycle_call("/model/unload").await
    }

    async fn analyze(&self, record: &Record) -> Result<Findings, InferenceError> {
        let payload = json!({
            "system": SYSTEM_PROMPT,
            "user": Self::user_prompt(record.caption.as_deref()),
            "img_url": record.source,
            "caption": record.caption,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .request(reqwest::Method::POST, "/generate")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else {
                    InferenceError::Failed {
                        reason: format!("model server unreachable: {e}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(inference_failure(Self::failure_detail(response).await));
        }

        let reply: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout
            } else {
                InferenceError::Failed {
                    reason: format!("invalid model server response: {e}"),
                }
            }
        })?;

        if reply.get("status").and_then(Value::as_str) == Some("error") {
            let detail = error_message(&reply).unwrap_or_else(|| "model server reported an error".to_string());
            return Err(inference_failure(detail));
        }

        let findings = parse_model_reply(&reply).map_err(|reason| InferenceError::Failed { reason })?;
        debug!(
            component = "vision_server",
            record = %record.id,
            genes = findings.genes.len(),
            "Model reply parsed"
        );
        Ok(findings)
    }

    async fn probe(&self) -> Result<(), String> {
        let response = self
            .request(reqwest::Method::GET, "/health")
            .send()
            .await
            .map_err(|e| format!("model server unreachable: {e}"))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("model server health returned {}", response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_exhaustion_indicators() {
        assert!(is_resource_exhaustion("RuntimeError: CUDA out of memory. Tried to allocate 2 GiB"));
        assert!(is_resource_exhaustion("Failed to allocate tensor"));
        assert!(is_resource_exhaustion("Model loading failed"));
        assert!(!is_resource_exhaustion("invalid image url"));
    }

    #[test]
    fn test_user_prompt_handles_missing_caption() {
        assert!(HttpVisionBackend::user_prompt(None).contains("No caption context"));
        assert!(HttpVisionBackend::user_prompt(Some("TGF-b pathway")).contains("Caption: TGF-b pathway"));
    }
}
