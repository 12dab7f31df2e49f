use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            region: default_region(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

fn default_endpoint() -> String {
    "https://developer.api.autodesk.com/dataexchange/2023-05/graphql".to_string()
}
fn default_region() -> String {
    "US".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    "APS_ACCESS_TOKEN".to_string()
}

impl AuthConfig {
    /// Reads the bearer token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("{} environment variable not set", self.token_env))?;
        if token.trim().is_empty() {
            anyhow::bail!("{} environment variable is empty", self.token_env);
        }
        Ok(token)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AutomationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model-derivative API, used to fetch manifests for version detection.
    #[serde(default = "default_derivative_base_url")]
    pub derivative_base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Consecutive status-fetch failures tolerated before the poll aborts.
    #[serde(default = "default_max_status_errors")]
    pub max_status_errors: u32,
    #[serde(default = "default_version")]
    pub default_version: String,
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Upper bound for downloading a finished job's output. Unset means the
    /// download may take as long as the transfer needs.
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    /// Activity signatures keyed by Revit version (e.g. `"2024"`).
    #[serde(default)]
    pub activities: BTreeMap<String, ActivityConfig>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            derivative_base_url: default_derivative_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            max_status_errors: default_max_status_errors(),
            default_version: default_version(),
            supported_versions: default_supported_versions(),
            output_dir: default_output_dir(),
            download_timeout_secs: None,
            activities: BTreeMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://developer.api.autodesk.com/da/us-east/v3".to_string()
}
fn default_derivative_base_url() -> String {
    "https://developer.api.autodesk.com/modelderivative/v2".to_string()
}
fn default_poll_interval_secs() -> u64 {
    10
}
fn default_max_wait_secs() -> u64 {
    600
}
fn default_max_status_errors() -> u32 {
    3
}
fn default_version() -> String {
    "2024".to_string()
}
fn default_supported_versions() -> Vec<String> {
    ["2023", "2024", "2025", "2026"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

impl AutomationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }
}

/// Signature and fully-qualified alias of one version's activity.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ActivityConfig {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub activity_alias: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads the config file if it exists, otherwise falls back to
/// [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate query
    if config.query.page_size == 0 {
        anyhow::bail!("query.page_size must be > 0");
    }
    if config.query.timeout_secs == 0 {
        anyhow::bail!("query.timeout_secs must be > 0");
    }

    // Validate automation
    let automation = &config.automation;
    if automation.poll_interval_secs == 0 {
        anyhow::bail!("automation.poll_interval_secs must be > 0");
    }
    if automation.max_wait_secs < automation.poll_interval_secs {
        anyhow::bail!("automation.max_wait_secs must be >= automation.poll_interval_secs");
    }
    if automation.download_timeout_secs == Some(0) {
        anyhow::bail!("automation.download_timeout_secs must be > 0 when set");
    }
    if !automation
        .supported_versions
        .contains(&automation.default_version)
    {
        anyhow::bail!(
            "automation.default_version '{}' is not in supported_versions ({})",
            automation.default_version,
            automation.supported_versions.join(", ")
        );
    }

    Ok(())
}
