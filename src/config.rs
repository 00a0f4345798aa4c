use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use anyhow::{Result, anyhow};

/// Where the backend lives when nothing is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Backend base URL. The environment wins over the config file.
    pub fn api_url(&self) -> String {
        resolve_api_url(std::env::var("BADLAB_API_URL").ok(), self.api_url.clone())
    }

    /// Ingestion API key, if any. The environment wins over the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("BADLAB_API_KEY").ok().or_else(|| self.api_key.clone())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("badlab").join("config.json"))
    }
}

fn resolve_api_url(env: Option<String>, file: Option<String>) -> String {
    let url = env
        .or(file)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_api_url_env_wins() {
        let url = resolve_api_url(
            Some("http://env:9000".to_string()),
            Some("http://file:9001".to_string()),
        );
        assert_eq!(url, "http://env:9000");
    }

    #[test]
    fn test_resolve_api_url_falls_back_to_default() {
        assert_eq!(resolve_api_url(None, None), DEFAULT_API_URL);
    }

    #[test]
    fn test_resolve_api_url_strips_trailing_slash() {
        let url = resolve_api_url(None, Some("http://lab:8000/".to_string()));
        assert_eq!(url, "http://lab:8000");
    }

    #[test]
    fn test_config_parses_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"api_url": "http://lab:8000", "api_key": "blue-sky"}}"#).unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        let config: Config = serde_json::from_str(&content).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://lab:8000"));
        assert_eq!(config.api_key.as_deref(), Some("blue-sky"));
    }

    #[test]
    fn test_empty_config_has_no_key() {
        let config = Config::new();
        assert!(config.api_key.is_none());
        assert!(config.api_url.is_none());
    }
}
