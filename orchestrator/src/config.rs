//! Pipeline configuration
//!
//! Every timeout, pacing bound and recovery knob is configuration with a
//! documented default. Values are layered as: defaults, then `.env`, then the
//! process environment, then CLI overrides applied by the binary.
//!
//! | Field | Env var | Default |
//! |---|---|---|
//! | `filter_timeout` | `FILTER_TIMEOUT_SECS` | 30 s |
//! | `analysis_timeout` | `ANALYSIS_TIMEOUT_SECS` | 300 s |
//! | `registry_timeout` | `REGISTRY_TIMEOUT_SECS` | 120 s |
//! | `gene_lookup_delay` | `GENE_LOOKUP_DELAY_MS` | 1500 ms |
//! | `pacing.min` / `pacing.max` | `PACING_MIN_MS` / `PACING_MAX_MS` | 2000 / 5000 ms |
//! | `recovery.max_attempts` | `RECOVERY_MAX_ATTEMPTS` | 1 |
//! | `recovery.backoff` | `RECOVERY_BACKOFF_MS` | 5000 ms |
//! | `live_ttl` | `PROGRESS_LIVE_TTL_HOURS` | 72 h |
//! | `durable_retention` | `PROGRESS_RETENTION_DAYS` | 10 days |
//! | `gate_wait_warning` | `GATE_WAIT_WARN_SECS` | 30 s |

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Randomised delay between successive records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingPolicy {
    #[serde(with = "duration_ms")]
    pub min: Duration,
    #[serde(with = "duration_ms")]
    pub max: Duration,
}

impl PacingPolicy {
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Draw the next inter-record delay uniformly from `[min, max]`
    pub fn next_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Bounded unload/backoff/reload policy for GPU recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub backoff: Duration,
}

impl RecoveryPolicy {
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Relevance filter timeout (T1)
    #[serde(with = "duration_ms")]
    pub filter_timeout: Duration,
    /// Deep analysis timeout (T2)
    #[serde(with = "duration_ms")]
    pub analysis_timeout: Duration,
    /// Budget for validating one record's whole gene list
    #[serde(with = "duration_ms")]
    pub registry_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub gene_lookup_delay: Duration,
    pub pacing: PacingPolicy,
    pub recovery: RecoveryPolicy,
    #[serde(with = "duration_ms")]
    pub live_ttl: Duration,
    #[serde(with = "duration_ms")]
    pub durable_retention: Duration,
    #[serde(with = "duration_ms")]
    pub gate_wait_warning: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter_timeout: Duration::from_secs(30),
            analysis_timeout: Duration::from_secs(300),
            registry_timeout: Duration::from_secs(120),
            gene_lookup_delay: Duration::from_millis(1500),
            pacing: PacingPolicy {
                min: Duration::from_secs(2),
                max: Duration::from_secs(5),
            },
            recovery: RecoveryPolicy::default(),
            live_ttl: Duration::from_secs(72 * 3600),
            durable_retention: Duration::from_secs(10 * 24 * 3600),
            gate_wait_warning: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Zero pacing and zero backoff, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            gene_lookup_delay: Duration::ZERO,
            pacing: PacingPolicy::none(),
            recovery: RecoveryPolicy::immediate(1),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `.env` and the process environment
    pub fn from_env() -> OrchestratorResult<Self> {
        // Missing .env is fine
        let _ = dotenv::dotenv();

        let mut config = Self::default();
        if let Some(secs) = env_number::<u64>("FILTER_TIMEOUT_SECS")? {
            config.filter_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number::<u64>("ANALYSIS_TIMEOUT_SECS")? {
            config.analysis_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number::<u64>("REGISTRY_TIMEOUT_SECS")? {
            config.registry_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_number::<u64>("GENE_LOOKUP_DELAY_MS")? {
            config.gene_lookup_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("PACING_MIN_MS")? {
            config.pacing.min = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number::<u64>("PACING_MAX_MS")? {
            config.pacing.max = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_number::<u32>("RECOVERY_MAX_ATTEMPTS")? {
            config.recovery.max_attempts = attempts;
        }
        if let Some(ms) = env_number::<u64>("RECOVERY_BACKOFF_MS")? {
            config.recovery.backoff = Duration::from_millis(ms);
        }
        if let Some(hours) = env_number::<u64>("PROGRESS_LIVE_TTL_HOURS")? {
            config.live_ttl = scaled("PROGRESS_LIVE_TTL_HOURS", hours, 3600)?;
        }
        if let Some(days) = env_number::<u64>("PROGRESS_RETENTION_DAYS")? {
            config.durable_retention = scaled("PROGRESS_RETENTION_DAYS", days, 24 * 3600)?;
        }
        if let Some(secs) = env_number::<u64>("GATE_WAIT_WARN_SECS")? {
            config.gate_wait_warning = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        let non_zero = [
            ("filter_timeout", self.filter_timeout),
            ("analysis_timeout", self.analysis_timeout),
            ("registry_timeout", self.registry_timeout),
            ("live_ttl", self.live_ttl),
            ("durable_retention", self.durable_retention),
        ];
        for (field, value) in non_zero {
            if value.is_zero() {
                return Err(OrchestratorError::config(field, "must be greater than zero"));
            }
        }
        if self.pacing.min > self.pacing.max {
            return Err(OrchestratorError::config(
                "pacing",
                format!(
                    "min {:?} exceeds max {:?}",
                    self.pacing.min, self.pacing.max
                ),
            ));
        }
        if self.recovery.max_attempts == 0 {
            return Err(OrchestratorError::config(
                "recovery.max_attempts",
                "at least one reload attempt is required",
            ));
        }
        if chrono::Duration::from_std(self.durable_retention)
            .ok()
            .and_then(|window| chrono::Utc::now().checked_sub_signed(window))
            .is_none()
        {
            return Err(OrchestratorError::config(
                "durable_retention",
                "retention window is out of range",
            ));
        }
        if self.durable_retention < self.live_ttl {
            return Err(OrchestratorError::config(
                "durable_retention",
                "durable retention must outlive the live TTL",
            ));
        }
        Ok(())
    }
}

/// `value` units of `unit_secs` seconds each, rejecting overflow
fn scaled(name: &str, value: u64, unit_secs: u64) -> OrchestratorResult<Duration> {
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| OrchestratorError::config(name, format!("{value} is too large")))
}

fn env_number<T: FromStr>(name: &str) -> OrchestratorResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| OrchestratorError::config(name, format!("'{raw}' is not a valid number"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recovery.max_attempts, 1);
        assert_eq!(config.recovery.backoff, Duration::from_secs(5));
        assert_eq!(config.live_ttl, Duration::from_secs(72 * 3600));
    }

    #[test]
    fn test_immediate_has_no_waits() {
        let config = PipelineConfig::immediate();
        assert!(config.validate().is_ok());
        assert_eq!(config.pacing.next_delay(), Duration::ZERO);
        assert_eq!(config.recovery.backoff, Duration::ZERO);
    }

    #[test]
    fn test_pacing_stays_within_bounds() {
        let pacing = PacingPolicy {
            min: Duration::from_millis(20),
            max: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let delay = pacing.next_delay();
            assert!(delay >= pacing.min && delay <= pacing.max);
        }
    }

    #[test]
    fn test_validation_rejects_inverted_pacing() {
        let mut config = PipelineConfig::default();
        config.pacing.min = Duration::from_secs(9);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ConfigurationError { ref field, .. } if field == "pacing"
        ));
    }

    #[test]
    fn test_validation_rejects_zero_recovery_attempts() {
        let mut config = PipelineConfig::default();
        config.recovery.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scaled_rejects_overflow() {
        assert_eq!(
            scaled("PROGRESS_LIVE_TTL_HOURS", 72, 3600).unwrap(),
            Duration::from_secs(72 * 3600)
        );
        let err = scaled("PROGRESS_RETENTION_DAYS", u64::MAX / 1000, 24 * 3600).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ConfigurationError { ref field, .. } if field == "PROGRESS_RETENTION_DAYS"
        ));
    }

    #[test]
    fn test_validation_rejects_unrepresentable_retention() {
        let config = PipelineConfig {
            durable_retention: Duration::from_secs(u64::MAX / 2),
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ConfigurationError { ref field, .. } if field == "durable_retention"
        ));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = PipelineConfig::default();
        config.analysis_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serializes_durations_as_millis() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["filter_timeout"], 30_000);
        assert_eq!(json["pacing"]["max"], 5_000);
    }
}
