//! Configuration file handling for sse-cli

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Initial reconnection interval in milliseconds
    pub reconnect_ms: Option<u64>,
    /// Headers sent with every stream request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("sse-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        output: Option<&str>,
        no_color: bool,
        reconnect_ms: Option<u64>,
        headers: &[(String, String)],
    ) -> MergedConfig {
        let mut merged_headers = self.headers.clone();
        for (name, value) in headers {
            merged_headers.insert(name.clone(), value.clone());
        }

        MergedConfig {
            output: output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "text".to_string()),
            no_color: no_color || self.no_color.unwrap_or(false),
            reconnect_ms: reconnect_ms
                .or(self.reconnect_ms)
                .unwrap_or(sse_client::DEFAULT_RECONNECT_INTERVAL_MS),
            headers: merged_headers,
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub output: String,
    pub no_color: bool,
    pub reconnect_ms: u64,
    pub headers: BTreeMap<String, String>,
}

/// Parse a `Name: value` header argument
pub fn parse_header(arg: &str) -> Result<(String, String), String> {
    let (name, value) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {:?}", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {:?}", arg));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_args_win_over_file() {
        let mut config = Config {
            output: Some("json".into()),
            no_color: Some(true),
            reconnect_ms: Some(2000),
            ..Default::default()
        };
        config.headers.insert("X-Token".into(), "file".into());
        config.headers.insert("X-Other".into(), "kept".into());

        let merged = config.merge_with_args(
            Some("text"),
            false,
            Some(100),
            &[("X-Token".into(), "cli".into())],
        );

        assert_eq!(merged.output, "text");
        assert!(merged.no_color);
        assert_eq!(merged.reconnect_ms, 100);
        assert_eq!(merged.headers.get("X-Token").unwrap(), "cli");
        assert_eq!(merged.headers.get("X-Other").unwrap(), "kept");
    }

    #[test]
    fn test_defaults_without_file_or_args() {
        let merged = Config::default().merge_with_args(None, false, None, &[]);
        assert_eq!(merged.output, "text");
        assert!(!merged.no_color);
        assert_eq!(merged.reconnect_ms, 500);
        assert!(merged.headers.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output = \"json\"\nreconnect_ms = 750\n\n[headers]\nAuthorization = \"Bearer x\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.output.as_deref(), Some("json"));
        assert_eq!(config.reconnect_ms, Some(750));
        assert_eq!(config.headers.get("Authorization").unwrap(), "Bearer x");
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer a:b").unwrap(),
            ("Authorization".to_string(), "Bearer a:b".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
