use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::traits::{GeneRegistry, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Official symbols confirmed by the registry, sorted and de-duplicated.
    /// Empty is a valid result.
    Validated(Vec<String>),
    Timeout,
}

/// Stage 3: registry validation of candidate genes.
///
/// Lookups run one at a time with a fixed delay between them, all inside a
/// single overall timeout. A candidate the registry does not know, or whose
/// lookup fails outright, is dropped. A lookup timeout means the registry is
/// not answering and the whole validation times out.
pub struct GeneValidator<G: GeneRegistry> {
    registry: Arc<G>,
    timeout: Duration,
    lookup_delay: Duration,
}

impl<G: GeneRegistry> GeneValidator<G> {
    pub fn new(registry: Arc<G>, timeout: Duration, lookup_delay: Duration) -> Self {
        Self {
            registry,
            timeout,
            lookup_delay,
        }
    }

    pub async fn validate(&self, candidates: &[String]) -> ValidationOutcome {
        match tokio::time::timeout(self.timeout, self.validate_all(candidates)).await {
            Ok(Some(valid)) => ValidationOutcome::Validated(valid),
            Ok(None) | Err(_) => ValidationOutcome::Timeout,
        }
    }

    async fn validate_all(&self, candidates: &[String]) -> Option<Vec<String>> {
        let mut valid = BTreeSet::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if index > 0 && !self.lookup_delay.is_zero() {
                tokio::time::sleep(self.lookup_delay).await;
            }

            match self.registry.lookup(candidate).await {
                Ok(Some(symbol)) => {
                    debug!(component = "gene_validator", candidate = %candidate, symbol = %symbol, "✓ Valid gene");
                    valid.insert(symbol);
                }
                Ok(None) => {
                    debug!(component = "gene_validator", candidate = %candidate, "✗ Not a registered human gene");
                }
                Err(RegistryError::Timeout) => return None,
                Err(RegistryError::Unavailable { reason }) => {
                    debug!(component = "gene_validator", candidate = %candidate, reason = %reason, "Lookup failed, dropping candidate");
                }
            }
        }
        Some(valid.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockGeneRegistry;

    fn genes(list: &[&str]) -> Vec<String> {
        list.iter().map(|g| g.to_string()).collect()
    }

    #[tokio::test]
    async fn test_drops_unknown_and_sorts() {
        let mut registry = MockGeneRegistry::new();
        registry.expect_lookup().returning(|candidate| match candidate {
            "tp53" | "TP53" => Ok(Some("TP53".to_string())),
            "BRCA1" => Ok(Some("BRCA1".to_string())),
            _ => Ok(None),
        });
        let validator = GeneValidator::new(Arc::new(registry), Duration::from_secs(5), Duration::ZERO);

        let outcome = validator.validate(&genes(&["TP53", "FAKE1", "BRCA1", "tp53"])).await;
        assert_eq!(outcome, ValidationOutcome::Validated(genes(&["BRCA1", "TP53"])));
    }

    #[tokio::test]
    async fn test_failed_lookup_drops_only_that_gene() {
        let mut registry = MockGeneRegistry::new();
        registry.expect_lookup().returning(|candidate| match candidate {
            "IL6" => Ok(Some("IL6".to_string())),
            _ => Err(RegistryError::Unavailable {
                reason: "HTTP 502".to_string(),
            }),
        });
        let validator = GeneValidator::new(Arc::new(registry), Duration::from_secs(5), Duration::ZERO);

        let outcome = validator.validate(&genes(&["TNF", "IL6"])).await;
        assert_eq!(outcome, ValidationOutcome::Validated(genes(&["IL6"])));
    }

    #[tokio::test]
    async fn test_registry_timeout() {
        let mut registry = MockGeneRegistry::new();
        registry
            .expect_lookup()
            .returning(|_| Err(RegistryError::Timeout));
        let validator = GeneValidator::new(Arc::new(registry), Duration::from_secs(5), Duration::ZERO);

        assert_eq!(
            validator.validate(&genes(&["TNF"])).await,
            ValidationOutcome::Timeout
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout_covers_delays() {
        let mut registry = MockGeneRegistry::new();
        registry
            .expect_lookup()
            .returning(|c| Ok(Some(c.to_string())));
        let validator = GeneValidator::new(
            Arc::new(registry),
            Duration::from_secs(2),
            Duration::from_millis(1500),
        );

        let outcome = validator.validate(&genes(&["A1", "B2", "C3"])).await;
        assert_eq!(outcome, ValidationOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_empty_candidates() {
        let registry = MockGeneRegistry::new();
        let validator = GeneValidator::new(Arc::new(registry), Duration::from_secs(5), Duration::ZERO);
        assert_eq!(validator.validate(&[]).await, ValidationOutcome::Validated(vec![]));
    }
}
