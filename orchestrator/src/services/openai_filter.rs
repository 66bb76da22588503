//! Stage 1 relevance classifier backed by the OpenAI chat completions API
//!
//! Classification is caption-only: the model is asked whether the figure
//! caption describes a disease pathway or mechanism and must answer with a
//! JSON object carrying `is_disease_pathway`.
//!
//! Error mapping:
//! - transport timeout: [`FilterError::Timeout`] (skip the record)
//! - 401/403, any other non-success status, connection failures and
//!   unparseable replies: [`FilterError::Critical`] (halt the run)

use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::core::{extract_json_object, Record};
use crate::traits::{FilterError, Relevance, RelevanceFilter};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = r#"You are given captions of figures from biomedical/clinical publications. Classify each caption into one of the following categories:

* Pathway figures: captions describing molecular mechanisms, biological signaling pathways, disease mechanisms, or interactions between genes, proteins, metabolites, or drugs.
* Others: captions that do not describe pathways (imaging data, clinical results, charts, survival curves, histology, structural models, experimental results, graphs, plots, bar graphs, box plots, panels).

If the caption mainly reports data, measurements, expression levels, statistical tests, or results shown as graphs or panels, classify as Others even when specific proteins or signaling molecules are mentioned. Only classify as Pathway figures when the caption explicitly describes a mechanism, pathway diagram, molecular interactions, or proposed disease model.

Return only JSON:
{
  "is_disease_pathway": true/false,
  "confidence": "high/medium/low",
  "reasoning": "Brief explanation based on caption analysis"
}"#;

pub struct OpenAiRelevanceFilter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiRelevanceFilter {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn user_prompt(caption: Option<&str>) -> String {
        let caption = caption
            .map(str::trim)
            .filter(|c| {
                !c.is_empty()
                    && !matches!(
                        c.to_lowercase().as_str(),
                        "no caption provided" | "no caption" | "n/a"
                    )
            })
            .unwrap_or("No caption available");

        format!(
            "Analyze this biomedical caption for disease pathways/mechanisms.\n\n\
             Caption: {caption}\n\n\
             INCLUDE: captions describing mechanisms, signaling, interactions, processes.\n\
             EXCLUDE: clinical scans, histology, data charts, survival curves, experimental results, graphs, plots, panels."
        )
    }

    /// Read the keep/discard decision out of the assistant message
    pub fn parse_decision(content: &str) -> Result<Relevance, FilterError> {
        let value = extract_json_object(content).ok_or_else(|| FilterError::Critical {
            reason: "no JSON object in classifier reply".to_string(),
        })?;

        let is_pathway = match value.get("is_disease_pathway") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => matches!(text.to_lowercase().as_str(), "true" | "yes" | "1"),
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => {
                return Err(FilterError::Critical {
                    reason: "classifier reply lacks is_disease_pathway".to_string(),
                })
            }
        };

        Ok(if is_pathway {
            Relevance::Keep
        } else {
            Relevance::Discard
        })
    }
}

#[async_trait::async_trait]
impl RelevanceFilter for OpenAiRelevanceFilter {
    async fn classify(&self, record: &Record) -> Result<Relevance, FilterError> {
        let request_body = json!({
            "model": self.model,
            "temperature": 0,
            "max_tokens": 300,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(record.caption.as_deref()) }
            ]
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FilterError::Timeout
                } else {
                    FilterError::Critical {
                        reason: format!("classifier unreachable: {e}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(match response.status().as_u16() {
                401 | 403 => FilterError::Critical {
                    reason: format!("classifier rejected credentials ({})", response.status()),
                },
                _ => FilterError::Critical {
                    reason: format!("classifier returned {}", response.status()),
                },
            });
        }

        let response_json: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FilterError::Timeout
            } else {
                FilterError::Critical {
                    reason: format!("failed to parse classifier response: {e}"),
                }
            }
        })?;

        let content = response_json
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| FilterError::Critical {
                reason: "no content in classifier response".to_string(),
            })?;

        let decision = Self::parse_decision(content)?;
        debug!(
            component = "relevance_filter",
            record = %record.id,
            decision = ?decision,
            "Classifier decision"
        );
        Ok(decision)
    }
}
