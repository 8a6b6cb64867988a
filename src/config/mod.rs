//! Broker configuration from the environment.
//!
//! | variable                | required | meaning                                  |
//! |-------------------------|----------|------------------------------------------|
//! | `ATLAS_ENDPOINT`        | yes      | cluster connection string                |
//! | `ATLAS_GROUPID`         | yes      | Atlas project (group) id                 |
//! | `ATLAS_API_USER`        | yes      | admin API user                           |
//! | `ATLAS_API_KEY`         | yes      | admin API key                            |
//! | `ATLAS_API_BASE`        | yes      | admin API base URL                       |
//! | `BROKER_STATE_DB`       | no       | state database path (`.broker/state.db`) |
//! | `ATLAS_REQUEST_TIMEOUT` | no       | per-call timeout (`30s`)                 |
//! | `ATLAS_RETRY_ATTEMPTS`  | no       | admin API attempts per call (`3`)        |

mod duration;
mod env_loader;

pub use duration::{parse_duration_string, parse_timeout};
pub use env_loader::{load_env_file, validate_env_name};

use crate::admin::{parse_endpoint, ApiTarget};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_ENDPOINT: &str = "ATLAS_ENDPOINT";
pub const ENV_GROUP_ID: &str = "ATLAS_GROUPID";
pub const ENV_API_USER: &str = "ATLAS_API_USER";
pub const ENV_API_KEY: &str = "ATLAS_API_KEY";
pub const ENV_API_BASE: &str = "ATLAS_API_BASE";
pub const ENV_STATE_DB: &str = "BROKER_STATE_DB";
pub const ENV_REQUEST_TIMEOUT: &str = "ATLAS_REQUEST_TIMEOUT";
pub const ENV_RETRY_ATTEMPTS: &str = "ATLAS_RETRY_ATTEMPTS";

pub const DEFAULT_STATE_DB: &str = ".broker/state.db";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Validated broker settings.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub group_id: String,
    pub api_user: String,
    pub api_key: String,
    pub api_base: String,
    pub state_db: PathBuf,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
}

impl BrokerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from the process environment, falling back to a .env file for
    /// variables the environment does not set.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let file = load_env_file(path)?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Load from an explicit map. Used by tests and embedding callers.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = [
            ENV_ENDPOINT,
            ENV_GROUP_ID,
            ENV_API_USER,
            ENV_API_KEY,
            ENV_API_BASE,
        ]
        .into_iter()
        .filter(|key| get(*key).is_none())
        .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required variable(s): {}",
                missing.join(", ")
            )));
        }

        let required = |key: &str| get(key).unwrap_or_default();

        let request_timeout = match get(ENV_REQUEST_TIMEOUT) {
            Some(value) => parse_timeout(ENV_REQUEST_TIMEOUT, &value)?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let retry_attempts = match get(ENV_RETRY_ATTEMPTS) {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(Error::Config(format!(
                        "{}='{}' must be a positive integer",
                        ENV_RETRY_ATTEMPTS, value
                    )))
                }
            },
            None => DEFAULT_RETRY_ATTEMPTS,
        };

        let config = Self {
            endpoint: required(ENV_ENDPOINT),
            group_id: required(ENV_GROUP_ID),
            api_user: required(ENV_API_USER),
            api_key: required(ENV_API_KEY),
            api_base: required(ENV_API_BASE),
            state_db: get(ENV_STATE_DB)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DB)),
            request_timeout,
            retry_attempts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the endpoint is a usable connection string and the API
    /// base an http(s) URL.
    pub fn validate(&self) -> Result<()> {
        parse_endpoint(&self.endpoint)
            .map_err(|e| Error::Config(format!("{}: {}", ENV_ENDPOINT, e)))?;

        let api_base = url::Url::parse(&self.api_base)
            .map_err(|e| Error::Config(format!("{}='{}': {}", ENV_API_BASE, self.api_base, e)))?;
        match api_base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Config(format!(
                    "{} must use http or https, got '{}'",
                    ENV_API_BASE, other
                )))
            }
        }
        if api_base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "{}='{}' cannot be used as a base URL",
                ENV_API_BASE, self.api_base
            )));
        }

        Ok(())
    }

    /// Project the admin API calls are made against.
    pub fn api_target(&self) -> ApiTarget {
        ApiTarget::new(self.api_base.clone(), self.group_id.clone())
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("endpoint", &crate::admin::redact(&self.endpoint))
            .field("group_id", &self.group_id)
            .field("api_user", &self.api_user)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("state_db", &self.state_db)
            .field("request_timeout", &self.request_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_vars() -> HashMap<String, String> {
        [
            (ENV_ENDPOINT, "mongodb://cluster0-shard-00-00.example.net:27017/?ssl=true&replicaSet=rs0"),
            (ENV_GROUP_ID, "5f1a"),
            (ENV_API_USER, "ops"),
            (ENV_API_KEY, "super-secret-key"),
            (ENV_API_BASE, "https://cloud.mongodb.com/api/atlas/v1.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults_apply() {
        let config = BrokerConfig::from_map(&base_vars()).unwrap();
        assert_eq!(config.state_db, PathBuf::from(DEFAULT_STATE_DB));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(config.api_target().group_id, "5f1a");
    }

    #[test]
    fn test_missing_variables_are_listed() {
        let mut vars = base_vars();
        vars.remove(ENV_GROUP_ID);
        vars.insert(ENV_API_KEY.to_string(), "   ".to_string());

        let err = BrokerConfig::from_map(&vars).unwrap_err().to_string();
        assert!(err.contains(ENV_GROUP_ID), "{}", err);
        assert!(err.contains(ENV_API_KEY), "{}", err);
        assert!(!err.contains(ENV_API_USER), "{}", err);
    }

    #[test]
    fn test_optional_overrides() {
        let mut vars = base_vars();
        vars.insert(ENV_STATE_DB.to_string(), "/var/lib/broker.db".to_string());
        vars.insert(ENV_REQUEST_TIMEOUT.to_string(), "5s".to_string());
        vars.insert(ENV_RETRY_ATTEMPTS.to_string(), "1".to_string());

        let config = BrokerConfig::from_map(&vars).unwrap();
        assert_eq!(config.state_db, PathBuf::from("/var/lib/broker.db"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_attempts, 1);
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut vars = base_vars();
        vars.insert(ENV_RETRY_ATTEMPTS.to_string(), "0".to_string());
        assert!(BrokerConfig::from_map(&vars).is_err());
    }

    #[test]
    fn test_api_base_must_be_http() {
        let mut vars = base_vars();
        vars.insert(ENV_API_BASE.to_string(), "ftp://cloud.mongodb.com".to_string());
        let err = BrokerConfig::from_map(&vars).unwrap_err().to_string();
        assert!(err.contains("http or https"), "{}", err);
    }

    #[test]
    fn test_endpoint_must_parse() {
        let mut vars = base_vars();
        vars.insert(ENV_ENDPOINT.to_string(), "postgres://db:5432".to_string());
        let err = BrokerConfig::from_map(&vars).unwrap_err().to_string();
        assert!(err.contains(ENV_ENDPOINT), "{}", err);
    }

    #[test]
    fn test_endpoint_with_bad_port_rejected() {
        for endpoint in ["mongodb://h:notaport/", "mongodb://h:99999/"] {
            let mut vars = base_vars();
            vars.insert(ENV_ENDPOINT.to_string(), endpoint.to_string());
            assert!(
                BrokerConfig::from_map(&vars).is_err(),
                "{} should not validate",
                endpoint
            );
        }
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = BrokerConfig::from_map(&base_vars()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_env_file_supplies_values() {
        let temp_dir = TempDir::new().unwrap();
        let env_path = temp_dir.path().join(".env");
        let contents: String = base_vars()
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"\n", k, v))
            .collect();
        fs::write(&env_path, contents).unwrap();

        // Process variables take precedence, so only assert on a value that
        // test runners never set.
        let config = BrokerConfig::from_env_file(&env_path).unwrap();
        assert!(!config.endpoint.is_empty());
        assert!(!config.group_id.is_empty());
    }
}
