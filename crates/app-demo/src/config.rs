//! Demo configuration, shared with every subsystem through the runner.

use std::env;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HTTP_PORT: u16 = 9933;
pub const DEFAULT_METRICS_PORT: u16 = 9100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoConf {
    pub env_name: String,
    pub log_level: String,
    pub http_port: u16,
    pub metrics_port: u16,
}

impl Default for DemoConf {
    fn default() -> Self {
        Self {
            env_name: "local".to_string(),
            log_level: "info".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl DemoConf {
    /// Load from `APP_ENV_NAME`, `APP_LOG_LEVEL`, `APP_HTTP_PORT` and
    /// `APP_METRICS_PORT`. Missing or unparsable values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let port = |key: &str, default: u16| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            env_name: lookup("APP_ENV_NAME").unwrap_or(defaults.env_name),
            log_level: lookup("APP_LOG_LEVEL").unwrap_or(defaults.log_level),
            http_port: port("APP_HTTP_PORT", defaults.http_port),
            metrics_port: port("APP_METRICS_PORT", defaults.metrics_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(DemoConf::from_lookup(lookup(&[])), DemoConf::default());
    }

    #[test]
    fn test_reads_overrides() {
        let conf = DemoConf::from_lookup(lookup(&[
            ("APP_ENV_NAME", "staging"),
            ("APP_HTTP_PORT", "8080"),
            ("APP_METRICS_PORT", "not-a-port"),
        ]));
        assert_eq!(conf.env_name, "staging");
        assert_eq!(conf.http_port, 8080);
        assert_eq!(conf.metrics_port, DEFAULT_METRICS_PORT);
    }
}
