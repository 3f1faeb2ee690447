//! Configuration for git-theta.
//!
//! All tunables arrive through `GIT_THETA_*` environment variables, parsed
//! once at process entry into an immutable [`Config`] that is threaded
//! through the pipelines. Each variable is parsed as the type of its
//! default; an unparsable value is a fatal error before any I/O happens.

use std::{env, str::FromStr};

use theta_metadata::UpdateType;
use thiserror::Error;

/// Convenience result wrapper.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment value failed to parse as the expected type.
    #[error("invalid value {value:?} for {variable}: expected {expected}")]
    InvalidValue {
        variable: &'static str,
        value: String,
        expected: &'static str,
    },
}

const CHECKPOINT_TYPE: &str = "GIT_THETA_CHECKPOINT_TYPE";
const UPDATE_TYPE: &str = "GIT_THETA_UPDATE_TYPE";
const PARAMETER_ATOL: &str = "GIT_THETA_PARAMETER_ATOL";
const PARAMETER_RTOL: &str = "GIT_THETA_PARAMETER_RTOL";
const LSH_SIGNATURE_SIZE: &str = "GIT_THETA_LSH_SIGNATURE_SIZE";
const LSH_THRESHOLD: &str = "GIT_THETA_LSH_THRESHOLD";
const LSH_POOL_SIZE: &str = "GIT_THETA_LSH_POOL_SIZE";
const MAX_CONCURRENCY: &str = "GIT_THETA_MAX_CONCURRENCY";
const MANUAL_MERGE: &str = "GIT_THETA_MANUAL_MERGE";

/// Immutable settings record.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Checkpoint handler to decode/encode with.
    pub checkpoint_type: String,
    /// Update kind preferred for changed parameters.
    pub update_type: UpdateType,
    /// Absolute tolerance for "close" tensors.
    pub parameter_atol: f64,
    /// Relative tolerance for "close" tensors.
    pub parameter_rtol: f64,
    /// Bits in an LSH signature.
    pub lsh_signature_size: usize,
    /// L2 distance under which a previous value justifies a delta.
    pub lsh_threshold: f64,
    /// Bound on the similarity pool.
    pub lsh_pool_size: usize,
    /// Parallelism cap; -1 means auto.
    pub max_concurrency: i64,
    /// Whether merge writes side files instead of prompting.
    pub manual_merge: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_type: "pytorch".to_owned(),
            update_type: UpdateType::Dense,
            parameter_atol: 1e-8,
            parameter_rtol: 1e-5,
            lsh_signature_size: 16,
            lsh_threshold: 1e-6,
            lsh_pool_size: 10_000,
            max_concurrency: -1,
            manual_merge: false,
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            checkpoint_type: env::var(CHECKPOINT_TYPE).unwrap_or(defaults.checkpoint_type),
            update_type: parse_var(UPDATE_TYPE, defaults.update_type, "an update type")?,
            parameter_atol: parse_var(PARAMETER_ATOL, defaults.parameter_atol, "a float")?,
            parameter_rtol: parse_var(PARAMETER_RTOL, defaults.parameter_rtol, "a float")?,
            lsh_signature_size: parse_var(
                LSH_SIGNATURE_SIZE,
                defaults.lsh_signature_size,
                "an unsigned integer",
            )?,
            lsh_threshold: parse_var(LSH_THRESHOLD, defaults.lsh_threshold, "a float")?,
            lsh_pool_size: parse_var(
                LSH_POOL_SIZE,
                defaults.lsh_pool_size,
                "an unsigned integer",
            )?,
            max_concurrency: parse_var(MAX_CONCURRENCY, defaults.max_concurrency, "an integer")?,
            manual_merge: parse_bool(MANUAL_MERGE, defaults.manual_merge)?,
        })
    }

    /// Worker-pool width: the configured cap, or available parallelism when
    /// the cap is -1.
    pub fn resolved_concurrency(&self) -> usize {
        if self.max_concurrency > 0 {
            self.max_concurrency as usize
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

fn parse_var<T: FromStr>(
    variable: &'static str,
    default: T,
    expected: &'static str,
) -> ConfigResult<T> {
    match env::var(variable) {
        Ok(raw) if !raw.is_empty() => raw.parse().map_err(|_| ConfigError::InvalidValue {
            variable,
            value: raw,
            expected,
        }),
        _ => Ok(default),
    }
}

fn parse_bool(variable: &'static str, default: bool) -> ConfigResult<bool> {
    match env::var(variable) {
        Ok(raw) if !raw.is_empty() => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                variable,
                value: raw,
                expected: "a boolean",
            }),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation is process global, so every case runs in one test.
    #[test]
    fn test_env_parsing() {
        let defaults = Config::from_env().unwrap();
        assert_eq!(defaults, Config::default());
        assert_eq!(defaults.checkpoint_type, "pytorch");
        assert_eq!(defaults.update_type, UpdateType::Dense);

        env::set_var(UPDATE_TYPE, "sparse");
        env::set_var(PARAMETER_ATOL, "1e-3");
        env::set_var(MAX_CONCURRENCY, "4");
        env::set_var(MANUAL_MERGE, "true");
        let config = Config::from_env().unwrap();
        assert_eq!(config.update_type, UpdateType::Sparse);
        assert_eq!(config.parameter_atol, 1e-3);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.resolved_concurrency(), 4);
        assert!(config.manual_merge);

        env::set_var(LSH_POOL_SIZE, "not-a-number");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue {
                variable: LSH_POOL_SIZE,
                ..
            })
        ));

        for variable in [
            UPDATE_TYPE,
            PARAMETER_ATOL,
            MAX_CONCURRENCY,
            MANUAL_MERGE,
            LSH_POOL_SIZE,
        ] {
            env::remove_var(variable);
        }
        assert!(Config::from_env().unwrap().resolved_concurrency() >= 1);
    }
}
