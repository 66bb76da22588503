use std::sync::Arc;
use std::time::Duration;

use crate::core::Record;
use crate::traits::{FilterError, Relevance, RelevanceFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Keep,
    Discard,
    Timeout,
    Critical { reason: String },
}

/// Stage 1: relevance classification bounded by T1
pub struct RelevanceStage<R: RelevanceFilter> {
    filter: Arc<R>,
    timeout: Duration,
}

impl<R: RelevanceFilter> RelevanceStage<R> {
    pub fn new(filter: Arc<R>, timeout: Duration) -> Self {
        Self { filter, timeout }
    }

    pub async fn classify(&self, record: &Record) -> FilterOutcome {
        match tokio::time::timeout(self.timeout, self.filter.classify(record)).await {
            Err(_) => FilterOutcome::Timeout,
            Ok(Ok(Relevance::Keep)) => FilterOutcome::Keep,
            Ok(Ok(Relevance::Discard)) => FilterOutcome::Discard,
            Ok(Err(FilterError::Timeout)) => FilterOutcome::Timeout,
            Ok(Err(FilterError::Critical { reason })) => FilterOutcome::Critical { reason },
        }
    }
}
