use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::mcp::TransportOptions;

const DEFAULT_PORT: u16 = 8001;
const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 300;
const DEFAULT_GLOBAL_RATE_LIMIT: u64 = 100;
const DEFAULT_PER_IP_BURST: u32 = 10;

/// Process-level configuration read from the environment (and `.env`)
#[derive(Deserialize, Debug, Clone)]
pub struct EnvConfig {
    /// Port to run the server on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the YAML settings file
    #[serde(default = "default_config_path")]
    pub config_path: String,
    /// Upper bound for answering one query, MCP connection time excluded
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Directory for the rolling audit log, stdout only when unset
    pub log_dir: Option<String>,
    /// Overrides `openai.api_key` from the settings file
    pub openai_api_key: Option<String>,
    /// Requests per second accepted across all clients
    #[serde(default = "default_global_rate_limit")]
    pub global_rate_limit: u64,
    /// Burst size of the per-IP limiter on `/mcpcall`
    #[serde(default = "default_per_ip_burst")]
    pub per_ip_burst: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_config_path() -> String {
    DEFAULT_CONFIG_PATH.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

fn default_global_rate_limit() -> u64 {
    DEFAULT_GLOBAL_RATE_LIMIT
}

fn default_per_ip_burst() -> u32 {
    DEFAULT_PER_IP_BURST
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenv::dotenv().ok();
        envy::from_env::<EnvConfig>()
    }
}

/// Chat-completions endpoint settings (`openai` section)
#[derive(Deserialize, Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    /// Seconds
    pub timeout: f64,
}

/// Tool loop and MCP connection tuning (`gateway` section), all optional
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GatewaySettings {
    pub max_tool_rounds: usize,
    pub connect_timeout: f64,
    pub request_timeout: f64,
    pub sse_read_timeout: f64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 16,
            connect_timeout: 5.0,
            request_timeout: 60.0,
            sse_read_timeout: 300.0,
        }
    }
}

impl GatewaySettings {
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_secs_f64(self.connect_timeout),
            request_timeout: Duration::from_secs_f64(self.request_timeout),
            sse_read_timeout: Duration::from_secs_f64(self.sse_read_timeout),
        }
    }
}

/// Contents of the YAML settings file
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub openai: LlmSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
}

impl Settings {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub env: EnvConfig,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env = EnvConfig::from_env()?;
        let mut settings = Settings::from_file(&env.config_path)?;

        if let Some(api_key) = env.openai_api_key.as_ref().filter(|k| !k.is_empty()) {
            settings.openai.api_key = api_key.clone();
        }

        Ok(Self { env, settings })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.env.request_timeout_seconds)
    }
}
