//! Gene registry backed by NCBI E-utilities
//!
//! A lookup is two calls: `esearch.fcgi` over the gene database restricted
//! to live human genes, then `esummary.fcgi` for the first hit. The official
//! symbol is the summary's `name` field.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::traits::{GeneRegistry, RegistryError};

const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

pub struct NcbiGeneRegistry {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Pause before each E-utilities call to stay under the NCBI rate limit
    request_spacing: Duration,
}

impl NcbiGeneRegistry {
    pub fn new(api_key: Option<String>, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(request_timeout).build()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            request_spacing: Duration::from_millis(400),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_spacing(mut self, spacing: Duration) -> Self {
        self.request_spacing = spacing;
        self
    }

    pub fn search_term(candidate: &str) -> String {
        format!(
            "(\"{candidate}\"[Gene Full Name] OR \"{candidate}\"[Protein Full Name] OR \"{candidate}\"[Preferred Symbol]) AND (\"homo sapiens\"[Organism]) AND alive[prop]"
        )
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, RegistryError> {
        if !self.request_spacing.is_zero() {
            tokio::time::sleep(self.request_spacing).await;
        }

        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("retmode", "json"));
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.as_str()));
        }

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(RegistryError::Unavailable {
                reason: format!("{endpoint} returned {}", response.status()),
            });
        }
        response.json().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> RegistryError {
    if e.is_timeout() {
        RegistryError::Timeout
    } else {
        RegistryError::Unavailable {
            reason: e.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl GeneRegistry for NcbiGeneRegistry {
    async fn lookup(&self, candidate: &str) -> Result<Option<String>, RegistryError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Ok(None);
        }

        let term = Self::search_term(candidate);
        let search = self
            .get_json("esearch.fcgi", &[("db", "gene"), ("term", &term), ("retmax", "5")])
            .await?;

        let Some(gene_id) = search
            .pointer("/esearchresult/idlist/0")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            debug!(component = "ncbi_registry", candidate, "No registry hit");
            return Ok(None);
        };

        let summary = self
            .get_json("esummary.fcgi", &[("db", "gene"), ("id", &gene_id)])
            .await?;

        let symbol = summary
            .get("result")
            .and_then(|result| result.get(&gene_id))
            .and_then(|gene| gene.get("name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        debug!(component = "ncbi_registry", candidate, symbol = ?symbol, "Registry lookup");
        Ok(symbol)
    }
}
