use crate::sessions::IdStrategy;
use crate::ws_adapter::RetryPolicy;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub id_strategy: IdStrategy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default)]
    pub connect_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path_prefix: default_path_prefix(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TransportConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.connect_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&content).context("failed to parse config toml")?;

        if cfg.server.base_url.trim().is_empty() {
            bail!("server.base_url must not be empty");
        }
        Ok(cfg)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

fn default_base_url() -> String {
    "ws://127.0.0.1:8000".to_string()
}

fn default_path_prefix() -> String {
    "ws/health-consultation".to_string()
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hcterm.toml");
        fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_dir, path) = write_config("");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server.base_url, "ws://127.0.0.1:8000");
        assert_eq!(cfg.server.path_prefix, "ws/health-consultation");
        assert_eq!(cfg.session.id_strategy, IdStrategy::Timestamp);
        assert_eq!(cfg.transport.retry_policy(), RetryPolicy::none());
        assert_eq!(cfg.log.level, "warn");
    }

    #[test]
    fn reads_all_sections() {
        let (_dir, path) = write_config(
            r#"
[server]
base_url = "wss://consult.example.com"
path_prefix = "v2/consult"

[session]
id_strategy = "random"

[transport]
connect_retries = 3
retry_backoff_ms = 250

[log]
level = "hcterm=debug"
"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server.base_url, "wss://consult.example.com");
        assert_eq!(cfg.server.path_prefix, "v2/consult");
        assert_eq!(cfg.session.id_strategy, IdStrategy::Random);
        assert_eq!(cfg.transport.retry_policy().retries, 3);
        assert_eq!(
            cfg.transport.retry_policy().backoff,
            Duration::from_millis(250)
        );
        assert_eq!(cfg.log.level, "hcterm=debug");
    }

    #[test]
    fn rejects_blank_base_url_and_bad_strategy() {
        let (_dir, path) = write_config("[server]\nbase_url = \"  \"\n");
        assert!(Config::load(&path).is_err());

        let (_dir, path) = write_config("[session]\nid_strategy = \"sequential\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
