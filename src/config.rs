// src/config.rs

use std::time::Duration;
use thiserror::Error;

use crate::logging::{get_data_dir, PROJECT_NAME};

const DEFAULT_WORKERS: usize = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DATABASE_FILE: &str = "scans.db";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key} must not be empty")]
    Empty { key: String },
}

/// Program names (or absolute paths) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub subfinder: String,
    pub katana: String,
    pub naabu: String,
    pub nuclei: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            subfinder: "subfinder".to_string(),
            katana: "katana".to_string(),
            naabu: "naabu".to_string(),
            nuclei: "nuclei".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Nothing is kept across restarts.
    Memory,
    Sqlite { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub store: StoreBackend,
    pub stage_timeout: Option<Duration>,
    /// Template filters used when the operator doesn't name any.
    pub default_templates: Vec<String>,
    pub tools: ToolPaths,
}

impl Settings {
    /// Reads `RECONCHAIN_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = env_key(name);
            lookup(&key).map(|v| (key, v.trim().to_string()))
        };

        let workers = match var("WORKERS") {
            Some((key, value)) => positive(&key, &value)?,
            None => DEFAULT_WORKERS,
        };

        let queue_capacity = match var("QUEUE_CAPACITY") {
            Some((key, value)) => positive(&key, &value)?,
            None => DEFAULT_QUEUE_CAPACITY,
        };

        let store = match var("DATABASE_URL") {
            Some((_, value)) if value.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Some((key, value)) if value.is_empty() => return Err(ConfigError::Empty { key }),
            Some((_, url)) => StoreBackend::Sqlite { url },
            None => StoreBackend::Sqlite {
                url: format!("sqlite://{}", get_data_dir().join(DATABASE_FILE).display()),
            },
        };

        // Zero disables the timeout, same as leaving it unset.
        let stage_timeout = match var("STAGE_TIMEOUT_SECS") {
            Some((_, value)) if value == "0" => None,
            Some((key, value)) => Some(Duration::from_secs(positive(&key, &value)? as u64)),
            None => None,
        };

        let default_templates = var("TEMPLATES")
            .map(|(_, value)| split_list(&value))
            .unwrap_or_default();

        let defaults = ToolPaths::default();
        let tool = |name: &str, fallback: String| -> Result<String, ConfigError> {
            match var(name) {
                Some((key, value)) if value.is_empty() => Err(ConfigError::Empty { key }),
                Some((_, value)) => Ok(value),
                None => Ok(fallback),
            }
        };
        let tools = ToolPaths {
            subfinder: tool("SUBFINDER_BIN", defaults.subfinder)?,
            katana: tool("KATANA_BIN", defaults.katana)?,
            naabu: tool("NAABU_BIN", defaults.naabu)?,
            nuclei: tool("NUCLEI_BIN", defaults.nuclei)?,
        };

        Ok(Self {
            workers,
            queue_capacity,
            store,
            stage_timeout,
            default_templates,
            tools,
        })
    }
}

/// `WORKERS` -> `RECONCHAIN_WORKERS`.
pub fn env_key(name: &str) -> String {
    format!("{}_{}", PROJECT_NAME.as_str(), name)
}

/// Splits a comma or whitespace separated list, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber { key: key.to_string(), value: value.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (env_key(k), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn keys_use_the_crate_prefix() {
        assert_eq!(env_key("WORKERS"), "RECONCHAIN_WORKERS");
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.workers, DEFAULT_WORKERS);
        assert_eq!(s.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(s.stage_timeout, None);
        assert!(s.default_templates.is_empty());
        assert_eq!(s.tools, ToolPaths::default());
        assert!(matches!(s.store, StoreBackend::Sqlite { ref url } if url.ends_with(DATABASE_FILE)));
    }

    #[test]
    fn overrides_are_applied() {
        let s = settings(&[
            ("WORKERS", "4"),
            ("DATABASE_URL", "memory"),
            ("STAGE_TIMEOUT_SECS", "900"),
            ("TEMPLATES", "cves, exposures misconfiguration"),
            ("NUCLEI_BIN", "/opt/pd/nuclei"),
        ])
        .unwrap();
        assert_eq!(s.workers, 4);
        assert_eq!(s.store, StoreBackend::Memory);
        assert_eq!(s.stage_timeout, Some(Duration::from_secs(900)));
        assert_eq!(s.default_templates, vec!["cves", "exposures", "misconfiguration"]);
        assert_eq!(s.tools.nuclei, "/opt/pd/nuclei");
        assert_eq!(s.tools.naabu, "naabu");
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        assert_eq!(settings(&[("STAGE_TIMEOUT_SECS", "0")]).unwrap().stage_timeout, None);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = settings(&[("WORKERS", "many")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber { key: "RECONCHAIN_WORKERS".into(), value: "many".into() }
        );
        assert!(settings(&[("WORKERS", "0")]).is_err());
        assert!(settings(&[("STAGE_TIMEOUT_SECS", "-5")]).is_err());
    }

    #[test]
    fn empty_tool_path_is_rejected() {
        let err = settings(&[("KATANA_BIN", " ")]).unwrap_err();
        assert_eq!(err, ConfigError::Empty { key: "RECONCHAIN_KATANA_BIN".into() });
    }
}
