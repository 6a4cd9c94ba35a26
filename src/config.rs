//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which remote store the gateway talks to.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Nothing leaves the process.
    Memory,
    /// libSQL database file.
    LibSql { path: PathBuf },
    /// Hosted PostgREST-style API.
    Rest { url: String, api_key: SecretString },
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    pub backend: BackendConfig,
    /// Directory holding one local-state blob per session scope.
    pub state_dir: PathBuf,
    pub http_port: u16,
    /// Extra attempts for transient store failures (0 = no retry).
    pub write_retries: u32,
    pub retry_delay: Duration,
    /// When set, logs are also written to a daily-rolling file here.
    pub log_dir: Option<PathBuf>,
    /// In-memory sessions untouched this long are dropped (they reload from
    /// local state).
    pub session_idle: Duration,
    pub max_sessions: usize,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::LibSql {
                path: PathBuf::from("./data/intake.db"),
            },
            state_dir: PathBuf::from("./data/sessions"),
            http_port: 8080,
            write_retries: 0,
            retry_delay: Duration::from_millis(250),
            log_dir: None,
            session_idle: Duration::from_secs(30 * 60),
            max_sessions: 10_000,
        }
    }
}

impl FunnelConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let rest_url = get("INTAKE_REST_URL");
        let default_kind = if rest_url.is_some() { "rest" } else { "libsql" };
        let backend_kind = get("INTAKE_BACKEND").unwrap_or_else(|| default_kind.to_string());

        let backend = match backend_kind.as_str() {
            "memory" => BackendConfig::Memory,
            "libsql" => BackendConfig::LibSql {
                path: get("INTAKE_DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/intake.db")),
            },
            "rest" => {
                let url = rest_url.ok_or_else(|| ConfigError::MissingRequired {
                    key: "INTAKE_REST_URL".to_string(),
                    hint: "Set it to the hosted project URL, e.g. https://<project>.supabase.co".to_string(),
                })?;
                let key = get("INTAKE_REST_KEY").ok_or_else(|| ConfigError::MissingRequired {
                    key: "INTAKE_REST_KEY".to_string(),
                    hint: "Set it to the project's anon API key".to_string(),
                })?;
                BackendConfig::Rest {
                    url,
                    api_key: SecretString::from(key),
                }
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_BACKEND".to_string(),
                    message: format!("expected memory, libsql or rest, got {other:?}"),
                });
            }
        };

        Ok(Self {
            backend,
            state_dir: get("INTAKE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            http_port: parse_or(&get, "INTAKE_HTTP_PORT", defaults.http_port)?,
            write_retries: parse_or(&get, "INTAKE_WRITE_RETRIES", defaults.write_retries)?,
            retry_delay: Duration::from_millis(parse_or(
                &get,
                "INTAKE_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )?),
            log_dir: get("INTAKE_LOG_DIR").map(PathBuf::from),
            session_idle: Duration::from_secs(parse_or(
                &get,
                "INTAKE_SESSION_IDLE_SECS",
                defaults.session_idle.as_secs(),
            )?),
            max_sessions: parse_or(&get, "INTAKE_MAX_SESSIONS", defaults.max_sessions)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<FunnelConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FunnelConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_libsql() {
        let cfg = config(&[]).unwrap();
        assert!(matches!(cfg.backend, BackendConfig::LibSql { ref path } if path.ends_with("intake.db")));
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.write_retries, 0);
        assert!(cfg.log_dir.is_none());
    }

    #[test]
    fn rest_url_selects_rest_backend() {
        let cfg = config(&[
            ("INTAKE_REST_URL", "https://p.example.co"),
            ("INTAKE_REST_KEY", "anon"),
        ])
        .unwrap();
        assert!(matches!(cfg.backend, BackendConfig::Rest { ref url, .. } if url == "https://p.example.co"));
    }

    #[test]
    fn rest_requires_key() {
        let err = config(&[("INTAKE_REST_URL", "https://p.example.co")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key, .. } if key == "INTAKE_REST_KEY"));
    }

    #[test]
    fn explicit_memory_backend_wins() {
        let cfg = config(&[
            ("INTAKE_BACKEND", "memory"),
            ("INTAKE_REST_URL", "https://p.example.co"),
        ])
        .unwrap();
        assert!(matches!(cfg.backend, BackendConfig::Memory));
    }

    #[test]
    fn numeric_overrides_and_errors() {
        let cfg = config(&[
            ("INTAKE_HTTP_PORT", "9090"),
            ("INTAKE_WRITE_RETRIES", "3"),
            ("INTAKE_RETRY_DELAY_MS", "10"),
            ("INTAKE_SESSION_IDLE_SECS", "60"),
            ("INTAKE_MAX_SESSIONS", "50"),
        ])
        .unwrap();
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.session_idle, Duration::from_secs(60));
        assert_eq!(cfg.max_sessions, 50);
        assert_eq!(cfg.write_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_millis(10));

        let err = config(&[("INTAKE_HTTP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "INTAKE_HTTP_PORT"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(config(&[("INTAKE_BACKEND", "mongo")]).is_err());
    }
}
