//! Environment-driven configuration.
//!
//! | Variable                        | Default        |
//! |---------------------------------|----------------|
//! | `FACTORYERP_BIND`               | `0.0.0.0:8080` |
//! | `FACTORYERP_QC_POLICY`          | `reject`       |
//! | `FACTORYERP_POSTING_TIMEOUT_MS` | `5000`         |
//!
//! Logging variables (`RUST_LOG`, `FACTORYERP_LOG_FORMAT`) are read by the
//! observability crate.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use factoryerp_purchasing::QcInputPolicy;

pub const BIND_VAR: &str = "FACTORYERP_BIND";
pub const QC_POLICY_VAR: &str = "FACTORYERP_QC_POLICY";
pub const POSTING_TIMEOUT_VAR: &str = "FACTORYERP_POSTING_TIMEOUT_MS";

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_POSTING_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Settings for the receiving pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivingConfig {
    pub qc_policy: QcInputPolicy,
    /// Upper bound for a single stock credit during completion.
    pub posting_timeout: Duration,
}

impl Default for ReceivingConfig {
    fn default() -> Self {
        Self {
            qc_policy: QcInputPolicy::default(),
            posting_timeout: Duration::from_millis(DEFAULT_POSTING_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub receiving: ReceivingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or blank values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = get(BIND_VAR)
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError {
                var: BIND_VAR,
                reason: e.to_string(),
            })?;

        let qc_policy = match get(QC_POLICY_VAR) {
            Some(raw) => raw.parse::<QcInputPolicy>().map_err(|e| ConfigError {
                var: QC_POLICY_VAR,
                reason: e.to_string(),
            })?,
            None => QcInputPolicy::default(),
        };

        let timeout_ms = match get(POSTING_TIMEOUT_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError {
                    var: POSTING_TIMEOUT_VAR,
                    reason: format!("expected a positive number of milliseconds, got '{raw}'"),
                })?,
            None => DEFAULT_POSTING_TIMEOUT_MS,
        };

        Ok(Self {
            bind,
            receiving: ReceivingConfig {
                qc_policy,
                posting_timeout: Duration::from_millis(timeout_ms),
            },
        })
    }
}
