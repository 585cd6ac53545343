use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for bbpulse.
///
/// Holds the startup parameters of a gather cycle so they don't have to be
/// passed on every invocation. Command line flags override these values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub bitbucket: BitbucketConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BitbucketConfig {
    /// Team or user account name
    pub owner: Option<String>,

    /// `team`, `user` or `repos`
    #[serde(default = "default_gather_type")]
    pub gather_type: String,

    /// OAuth consumer key (the consumer must be marked private)
    pub oauth_key: Option<String>,

    /// OAuth consumer secret
    pub oauth_secret: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Maximum concurrent per-entity fetches, unbounded when unset
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Summary,
    /// One JSON object per pull request
    Json,
    /// Influx line protocol
    Line,
}

impl Default for BitbucketConfig {
    fn default() -> Self {
        Self {
            owner: None,
            gather_type: default_gather_type(),
            oauth_key: None,
            oauth_secret: None,
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            http_timeout: default_http_timeout(),
            max_concurrency: None,
        }
    }
}

fn default_gather_type() -> String {
    "team".to_string()
}

fn default_api_base_url() -> String {
    "https://api.bitbucket.org/2.0".to_string()
}

fn default_token_url() -> String {
    "https://bitbucket.org/site/oauth2/access_token".to_string()
}

fn default_http_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./bbpulse.toml, ./bbpulse.json, ./bbpulse.yaml, ./bbpulse.yml
    /// 3. `<config dir>/bbpulse/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        match Self::candidates().into_iter().find(|path| path.exists()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = ["bbpulse.toml", "bbpulse.json", "bbpulse.yaml", "bbpulse.yml"]
            .iter()
            .map(PathBuf::from)
            .collect();

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("bbpulse").join("config.toml"));
        }

        candidates
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
