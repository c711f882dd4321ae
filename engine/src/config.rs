use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, time::Duration};

use sieve_ledger::{DEFAULT_RPC_URL, LedgerConfig, RetryConfig};
use sieve_stats::AnalysisConfig;
use thiserror::Error;

/// Environment variable that overrides `[ledger] rpc_url`.
pub const RPC_URL_ENV: &str = "SIEVE_RPC_URL";

/// Upper bound on concurrently outstanding ledger calls.
pub const MAX_IN_FLIGHT_LIMIT: usize = 4;

/// Whole-file configuration. Every section and field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SieveConfig {
    pub scan: ScanConfig,
    pub ledger: LedgerSection,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Batch scan settings (`[scan]`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Persist a checkpoint after this many processed candidates.
    pub checkpoint_interval: usize,
    /// Above this many valid identities, output is split into shards.
    pub shard_threshold: usize,
    /// Records per shard file.
    pub shard_size: usize,
    /// Threads in the decode pool.
    pub decode_workers: usize,
    /// Ledger calls allowed in flight at once (1..=4).
    pub max_in_flight: usize,
    /// Presence of this file requests a clean stop.
    pub stop_file: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 100,
            shard_threshold: 1000,
            shard_size: 1000,
            decode_workers: 4,
            max_in_flight: 1,
            stop_file: None,
        }
    }
}

/// Remote ledger settings (`[ledger]`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    /// Base URL. `${VAR}` references are expanded.
    pub rpc_url: String,
    pub timeout_secs: u64,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            timeout_secs: 12,
            rate_limit_ms: 200,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl LedgerSection {
    #[must_use]
    pub fn to_ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            rpc_url: expand_env_vars(&self.rpc_url),
            request_timeout: Duration::from_secs(self.timeout_secs),
            rate_limit: Duration::from_millis(self.rate_limit_ms),
            retry: RetryConfig {
                max_retries: self.max_retries,
                initial_delay: Duration::from_millis(self.initial_backoff_ms),
                max_delay: Duration::from_millis(self.max_backoff_ms),
                ..RetryConfig::default()
            },
        }
    }
}

/// Expand `${VAR}` references; unset variables expand to the empty string.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }
    out.push_str(rest);
    out
}

impl SieveConfig {
    /// Load from `path`, or defaults when no path is given. Applies the
    /// environment override and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(url) = env::var(RPC_URL_ENV)
            && !url.trim().is_empty()
        {
            tracing::debug!(env = RPC_URL_ENV, "RPC URL overridden from environment");
            config.ledger.rpc_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        if self.scan.checkpoint_interval == 0 {
            return invalid("scan.checkpoint_interval", "must be at least 1");
        }
        if self.scan.shard_size == 0 {
            return invalid("scan.shard_size", "must be at least 1");
        }
        if self.scan.decode_workers == 0 {
            return invalid("scan.decode_workers", "must be at least 1");
        }
        if !(1..=MAX_IN_FLIGHT_LIMIT).contains(&self.scan.max_in_flight) {
            return invalid("scan.max_in_flight", "must be between 1 and 4");
        }
        if self.ledger.timeout_secs == 0 {
            return invalid("ledger.timeout_secs", "must be at least 1");
        }
        if self.ledger.rate_limit_ms == 0 {
            return invalid("ledger.rate_limit_ms", "must be at least 1");
        }
        if self.ledger.max_backoff_ms < self.ledger.initial_backoff_ms {
            return invalid(
                "ledger.max_backoff_ms",
                "must not be smaller than initial_backoff_ms",
            );
        }
        if expand_env_vars(&self.ledger.rpc_url).trim().is_empty() {
            return invalid("ledger.rpc_url", "must not be empty");
        }
        self.analysis.validate().map_err(|e| ConfigError::Invalid {
            field: "analysis",
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_yields_defaults() {
        let config: SieveConfig = toml::from_str("").unwrap();
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.ledger, LedgerSection::default());
        assert!((config.analysis.alpha - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.analysis.positions.len(), 60);
        config.validate().unwrap();
    }

    #[test]
    fn sections_override_individual_fields() {
        let config: SieveConfig = toml::from_str(
            r#"
            [scan]
            checkpoint_interval = 25
            max_in_flight = 2

            [ledger]
            rate_limit_ms = 350

            [analysis]
            alpha = 0.01
            correction = "fdr"
            pre_specified = [4, 27, 30]
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.checkpoint_interval, 25);
        assert_eq!(config.scan.max_in_flight, 2);
        assert_eq!(config.scan.shard_size, 1000);
        assert_eq!(config.ledger.rate_limit_ms, 350);
        assert_eq!(config.ledger.timeout_secs, 12);
        assert_eq!(config.analysis.pre_specified, vec![4, 27, 30]);
        assert_eq!(config.analysis.correction, sieve_stats::Correction::Fdr);

        let ledger = config.ledger.to_ledger_config();
        assert_eq!(ledger.rate_limit, Duration::from_millis(350));
        assert_eq!(ledger.retry.max_retries, 3);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = SieveConfig::default();
        config.scan.max_in_flight = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "scan.max_in_flight",
                ..
            })
        ));

        let mut config = SieveConfig::default();
        config.scan.checkpoint_interval = 0;
        assert!(config.validate().is_err());

        let mut config = SieveConfig::default();
        config.analysis.alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sieve.toml");
        std::fs::write(&path, "[scan]\ncheckpoint_intervall = 5\n").unwrap();
        let err = SieveConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = SieveConfig::load(Some(Path::new("/nonexistent/sieve.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn expand_env_vars_handles_missing_and_unterminated() {
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(
            expand_env_vars("a${SIEVE_TEST_SURELY_UNSET_VAR}b"),
            "ab"
        );
        assert_eq!(expand_env_vars("x${open"), "x${open");
    }
}
