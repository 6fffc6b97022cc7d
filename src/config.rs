// SPDX-License-Identifier: Apache-2.0
use actix_web::cookie::Key;
use serde::Deserialize;
use std::path::PathBuf;
use std::{env, fs, io};
use thiserror::Error;
use tracing::warn;

// Environment variable names
pub const CONFIG_PATH_ENV: &str = "SNIPPETBOX_CONFIG";
pub const ADDR_ENV: &str = "SNIPPETBOX_ADDR";
pub const STATIC_DIR_ENV: &str = "SNIPPETBOX_STATIC_DIR";
pub const SECURE_COOKIES_ENV: &str = "SNIPPETBOX_SECURE_COOKIES";
pub const LOG_FORMAT_ENV: &str = "SNIPPETBOX_LOG_FORMAT";
pub const WORKERS_ENV: &str = "SNIPPETBOX_WORKERS";
pub const SESSION_KEY_ENV: &str = "SNIPPETBOX_SESSION_KEY";

const DEFAULT_CONFIG_PATH: &str = "config/snippetbox.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the HTTP listener binds to.
    pub addr: String,
    /// Directory served under `/static/`.
    pub static_dir: PathBuf,
    /// Mark the session cookie `Secure`; enable when served over TLS.
    pub secure_cookies: bool,
    pub log_format: LogFormat,
    /// Worker threads; `None` uses one per physical core.
    pub workers: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:4000".to_owned(),
            static_dir: PathBuf::from("./ui/static"),
            secure_cookies: false,
            log_format: LogFormat::Json,
            workers: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file if present, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = match fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = var(ADDR_ENV) {
            self.addr = addr;
        }
        if let Some(dir) = var(STATIC_DIR_ENV) {
            self.static_dir = PathBuf::from(dir);
        }
        if let Some(v) = var(SECURE_COOKIES_ENV) {
            self.secure_cookies = parse_bool(&v).ok_or(ConfigError::InvalidEnv {
                name: SECURE_COOKIES_ENV,
                value: v,
            })?;
        }
        if let Some(v) = var(LOG_FORMAT_ENV) {
            self.log_format = match v.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: LOG_FORMAT_ENV,
                        value: v,
                    });
                }
            };
        }
        if let Some(v) = var(WORKERS_ENV) {
            let workers = v.parse().map_err(|_| ConfigError::InvalidEnv {
                name: WORKERS_ENV,
                value: v.clone(),
            })?;
            self.workers = Some(workers);
        }
        Ok(())
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Cookie signing key from the environment, or a random one for this process.
pub fn session_key() -> Key {
    match env::var(SESSION_KEY_ENV) {
        Ok(key) => match Key::try_from(key.as_bytes()) {
            Ok(key) => key,
            Err(_) => {
                warn!("{} must be at least 64 bytes; using a random key", SESSION_KEY_ENV);
                Key::generate()
            }
        },
        Err(_) => {
            warn!("No session key set in environment. Sessions will not survive a restart.");
            Key::generate()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_overrides_defaults() {
        let config = AppConfig::from_toml(
            r#"
            addr = "0.0.0.0:8080"
            secure_cookies = true
            log_format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.addr, "0.0.0.0:8080");
        assert!(config.secure_cookies);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.static_dir, PathBuf::from("./ui/static"));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ADDR_ENV, "127.0.0.1:9000"),
            (SECURE_COOKIES_ENV, "yes"),
            (WORKERS_ENV, "2"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.addr, "127.0.0.1:9000");
        assert!(config.secure_cookies);
        assert_eq!(config.workers, Some(2));
    }

    #[test]
    fn rejects_malformed_environment() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|name| (name == LOG_FORMAT_ENV).then(|| "xml".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: LOG_FORMAT_ENV, .. }));
    }
}
