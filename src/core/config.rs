//! Startup configuration.
//!
//! Everything is read once from environment variables into [`ServerConfig`]
//! before the registry is built. Nothing consults the environment at request
//! time. Parsing goes through a key lookup closure so it can be exercised
//! without touching the process environment.
//!
//! Environment variables:
//! - `SERVER_NAME`: name of the server (default: "mcp-analysis-server")
//! - `SERVER_VERSION`: version string (default: crate version)
//! - `MCP_TRANSPORT_MODE`: "stdio", "http", or "both" (default: "both")
//! - `HOST`: bind address for HTTP mode (default: "0.0.0.0")
//! - `PORT`: port number for HTTP mode (default: 3000)
//! - `WORKER_THREADS`: HTTP worker count (default: CPU count, max 16)
//! - `MCP_TOOLS`: tool switches, e.g. `review_code=false,check_markdown=true`
//! - `LLM_API_URL`: chat-completion endpoint (default: OpenAI)
//! - `LLM_API_KEY` / `OPENAI_API_KEY`: credentials for the endpoint
//! - `LLM_MODEL`: model name (default: "gpt-4o-mini")
//! - `LLM_TIMEOUT_SECS`: bound on each external call (default: 20)

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::core::fallback::DEFAULT_TIMEOUT;

const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Which transports the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
    Both,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            "both" => Ok(Self::Both),
            _ => Err("must be 'stdio', 'http', or 'both'".to_string()),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: num_cpus::get().clamp(1, 16),
        }
    }
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-tool enablement switches. Tools not mentioned are enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolsConfig {
    switches: BTreeMap<String, bool>,
}

impl ToolsConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.switches.get(name).copied().unwrap_or(true)
    }

    pub fn set(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.switches.insert(name.into(), enabled);
        self
    }

    /// Names that carry an explicit switch.
    pub fn configured_names(&self) -> impl Iterator<Item = &str> {
        self.switches.keys().map(String::as_str)
    }

    /// Parse `name=bool` pairs separated by commas.
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, enabled) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                key: "MCP_TOOLS",
                value: entry.to_string(),
                reason: "expected name=true|false".to_string(),
            })?;
            let enabled = parse_bool(enabled.trim()).ok_or_else(|| ConfigError::InvalidValue {
                key: "MCP_TOOLS",
                value: entry.to_string(),
                reason: "expected name=true|false".to_string(),
            })?;
            config = config.set(name.trim(), enabled);
        }
        Ok(config)
    }
}

/// External LLM endpoint used by AI-backed tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_LLM_URL.to_string()),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LlmConfig {
    /// Both an endpoint and credentials are present.
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.endpoint) && present(&self.api_key)
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub transport: Transport,
    pub http: HttpConfig,
    pub tools: ToolsConfig,
    pub llm: LlmConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "mcp-analysis-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transport: Transport::Both,
            http: HttpConfig::default(),
            tools: ToolsConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        // Empty values behave like unset ones
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("SERVER_NAME") {
            config.name = name;
        }
        if let Some(version) = get("SERVER_VERSION") {
            config.version = version;
        }
        if let Some(raw) = get("MCP_TRANSPORT_MODE") {
            config.transport = raw.parse().map_err(|reason| ConfigError::InvalidValue {
                key: "MCP_TRANSPORT_MODE",
                value: raw.clone(),
                reason,
            })?;
        }

        if let Some(host) = get("HOST") {
            config.http.host = host;
        }
        if let Some(raw) = get("PORT") {
            config.http.port = parse_number("PORT", &raw)?;
        }
        if let Some(raw) = get("WORKER_THREADS") {
            let workers: usize = parse_number("WORKER_THREADS", &raw)?;
            config.http.workers = workers.max(1);
        }

        if let Some(raw) = get("MCP_TOOLS") {
            config.tools = ToolsConfig::parse(&raw)?;
        }

        if let Some(url) = get("LLM_API_URL") {
            config.llm.endpoint = Some(url);
        }
        config.llm.api_key = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY"));
        if let Some(model) = get("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(raw) = get("LLM_TIMEOUT_SECS") {
            let secs: u64 = parse_number("LLM_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "LLM_TIMEOUT_SECS",
                    value: raw,
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.llm.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.name, "mcp-analysis-server");
        assert_eq!(config.transport, Transport::Both);
        assert_eq!(config.http.port, 3000);
        assert!(config.http.workers >= 1 && config.http.workers <= 16);
        assert!(config.tools.is_enabled("anything"));
        assert!(!config.llm.is_configured());
        assert_eq!(config.llm.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SERVER_NAME", "analysis"),
            ("MCP_TRANSPORT_MODE", "HTTP"),
            ("PORT", "8080"),
            ("WORKER_THREADS", "0"),
            ("MCP_TOOLS", "review_code=false, check_markdown=on"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.name, "analysis");
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.http.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.http.workers, 1);
        assert!(!config.tools.is_enabled("review_code"));
        assert!(config.tools.is_enabled("check_markdown"));
        assert!(config.llm.is_configured());
        assert_eq!(config.llm.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_llm_key_precedence() {
        let config = load(&[("LLM_API_KEY", "primary"), ("OPENAI_API_KEY", "secondary")]).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_empty_endpoint_is_not_configured() {
        let llm = LlmConfig {
            endpoint: Some("  ".into()),
            api_key: Some("key".into()),
            ..LlmConfig::default()
        };
        assert!(!llm.is_configured());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("MCP_TRANSPORT_MODE", "carrier-pigeon")]),
            Err(ConfigError::InvalidValue { key: "MCP_TRANSPORT_MODE", .. })
        ));
        assert!(matches!(
            load(&[("PORT", "99999")]),
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
        assert!(matches!(
            load(&[("MCP_TOOLS", "review_code")]),
            Err(ConfigError::InvalidValue { key: "MCP_TOOLS", .. })
        ));
        assert!(matches!(
            load(&[("LLM_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidValue { key: "LLM_TIMEOUT_SECS", .. })
        ));
    }
}
