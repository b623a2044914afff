//! Configuration for the preemption subsystem.
//!
//! The only tunable is the negotiation timeout: the longest the Mitigation
//! Negotiator waits for the cluster manager to accept or reject a proposal
//! before assuming rejection.
//!
//! ```toml
//! negotiation_timeout_ms = 10000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PreemptionError, PreemptionResult};

/// Environment variable overriding [`PreemptionConfig::negotiation_timeout_ms`].
pub const NEGOTIATION_TIMEOUT_ENV: &str = "PREEMPTION_NEGOTIATION_TIMEOUT_MS";

/// Subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PreemptionConfig {
    /// Maximum wall-clock time to await an accept/reject verdict (milliseconds).
    pub negotiation_timeout_ms: u64,
}

impl Default for PreemptionConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout_ms: 10_000,
        }
    }
}

impl PreemptionConfig {
    /// Config with the given timeout, rounded up to whole milliseconds.
    ///
    /// A non-zero timeout never becomes zero; durations beyond `u64::MAX`
    /// milliseconds saturate. `Duration::ZERO` stays zero and fails
    /// [`validate`](Self::validate).
    pub fn with_negotiation_timeout(timeout: Duration) -> Self {
        let mut millis = timeout.as_millis();
        if timeout.subsec_nanos() % 1_000_000 != 0 {
            millis += 1;
        }
        Self {
            negotiation_timeout_ms: u64::try_from(millis).unwrap_or(u64::MAX),
        }
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_millis(self.negotiation_timeout_ms)
    }

    /// Reject configurations that would make every negotiation time out at once.
    pub fn validate(&self) -> PreemptionResult<()> {
        if self.negotiation_timeout_ms == 0 {
            return Err(PreemptionError::InvalidConfig(
                "negotiation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> PreemptionResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file.
    pub fn from_path(path: &Path) -> PreemptionResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> PreemptionResult<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> PreemptionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(NEGOTIATION_TIMEOUT_ENV) {
            self.negotiation_timeout_ms = raw.trim().parse().map_err(|_| {
                PreemptionError::InvalidConfig(format!(
                    "{NEGOTIATION_TIMEOUT_ENV} is not a valid millisecond count: {raw}"
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = PreemptionConfig::default();
        assert_eq!(cfg.negotiation_timeout(), Duration::from_secs(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sub_millisecond_timeout_rounds_up() {
        let cfg = PreemptionConfig::with_negotiation_timeout(Duration::from_micros(300));
        assert_eq!(cfg.negotiation_timeout_ms, 1);
        assert!(cfg.validate().is_ok());

        let cfg = PreemptionConfig::with_negotiation_timeout(Duration::from_micros(2_500));
        assert_eq!(cfg.negotiation_timeout_ms, 3);

        let cfg = PreemptionConfig::with_negotiation_timeout(Duration::from_secs(2));
        assert_eq!(cfg.negotiation_timeout_ms, 2_000);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let cfg = PreemptionConfig::with_negotiation_timeout(Duration::MAX);
        assert_eq!(cfg.negotiation_timeout_ms, u64::MAX);
    }

    #[test]
    fn test_zero_duration_stays_invalid() {
        let cfg = PreemptionConfig::with_negotiation_timeout(Duration::ZERO);
        assert!(matches!(cfg.validate(), Err(PreemptionError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let result = PreemptionConfig::from_toml_str("negotiation_timeout_ms = 0");
        assert!(matches!(result, Err(PreemptionError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let cfg = PreemptionConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PreemptionConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = PreemptionConfig::from_toml_str("retry_count = 3");
        assert!(matches!(result, Err(PreemptionError::Toml(_))));
    }

    #[test]
    fn test_from_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "negotiation_timeout_ms = 250").unwrap();
        let cfg = PreemptionConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.negotiation_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_path_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PreemptionConfig::from_path(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(PreemptionError::Io(_))));
    }

    #[test]
    fn test_overrides_replace_timeout() {
        let cfg = PreemptionConfig::default()
            .with_overrides_from(|key| {
                (key == NEGOTIATION_TIMEOUT_ENV).then(|| "1500".to_string())
            })
            .unwrap();
        assert_eq!(cfg.negotiation_timeout_ms, 1500);
    }

    #[test]
    fn test_overrides_reject_garbage() {
        let result =
            PreemptionConfig::default().with_overrides_from(|_| Some("soon".to_string()));
        assert!(matches!(result, Err(PreemptionError::InvalidConfig(_))));
    }
}
