//! Environment-backed credential source
//!
//! Credentials are loaded from:
//! 1. `.env` file in the current directory or parent directories (if present)
//! 2. System environment variables
//!
//! Environment variables take precedence over .env file values.
//!
//! ## Required Keys
//! - `OPENAI_API_KEY`: relevance classifier
//! - `MODEL_SERVER_USERNAME`, `MODEL_SERVER_PASSWORD`: vision model server basic auth
//!
//! ## Optional Keys
//! - `NCBI_API_KEY`: raises the NCBI E-utilities rate limit

use std::collections::HashMap;
use tracing::info;

use crate::traits::{CredentialSource, Credentials, MissingCredential, ResourceProbe};

/// Credential source reading the process environment, or a fixed map in tests
pub struct EnvCredentialSource {
    overrides: Option<HashMap<String, String>>,
}

impl EnvCredentialSource {
    const REQUIRED_KEYS: &'static [&'static str] = &[
        "OPENAI_API_KEY",
        "MODEL_SERVER_USERNAME",
        "MODEL_SERVER_PASSWORD",
    ];

    const NCBI_KEY: &'static str = "NCBI_API_KEY";

    pub fn new() -> Self {
        Self { overrides: None }
    }

    /// Resolve against `vars` instead of the environment
    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self {
            overrides: Some(vars),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        let value = match &self.overrides {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

impl Default for EnvCredentialSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CredentialSource for EnvCredentialSource {
    async fn credentials(&self) -> Result<Credentials, MissingCredential> {
        if self.overrides.is_none() {
            // Missing .env is fine
            let _ = dotenv::dotenv();
        }

        let missing: Vec<&str> = Self::REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|name| self.var(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(MissingCredential {
                key_name: missing.join(", "),
                message: format!(
                    "Missing required credentials: {}. These must be set as environment variables.",
                    missing.join(", ")
                ),
            });
        }

        let credentials = Credentials {
            openai_api_key: self.var("OPENAI_API_KEY").unwrap_or_default(),
            model_server_username: self.var("MODEL_SERVER_USERNAME").unwrap_or_default(),
            model_server_password: self.var("MODEL_SERVER_PASSWORD").unwrap_or_default(),
            ncbi_api_key: self.var(Self::NCBI_KEY),
        };
        info!(
            component = "credentials",
            ncbi_key = credentials.ncbi_api_key.is_some(),
            "🔑 Credentials validated"
        );
        Ok(credentials)
    }
}

/// Health probe asserting every required credential is present
pub struct CredentialProbe<C: CredentialSource> {
    source: C,
}

impl<C: CredentialSource> CredentialProbe<C> {
    pub fn new(source: C) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl<C: CredentialSource> ResourceProbe for CredentialProbe<C> {
    fn name(&self) -> String {
        "credentials".to_string()
    }

    async fn probe(&self) -> Result<(), String> {
        self.source
            .credentials()
            .await
            .map(|_| ())
            .map_err(|missing| missing.message)
    }
}
