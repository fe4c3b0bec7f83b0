use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| GatewayError::Config(format!("invalid listen address: {err}")))
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_gateway_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeClientConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for BridgeClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            list_timeout_secs: default_list_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

fn default_bridge_url() -> String {
    "http://localhost:8765".into()
}

fn default_list_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_model_retries")]
    pub model_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            tool_timeout_secs: default_tool_timeout(),
            model_retries: default_model_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_max_rounds() -> usize {
    10
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_model_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_server")]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub bridge: BridgeClientConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_gateway_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_gateway_port(),
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: default_gateway_server(),
            model: ModelConfig::default(),
            bridge: BridgeClientConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| GatewayError::Config(format!("Failed to parse configuration: {err}")))
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    /// Layer environment-style overrides on top of the current values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.model.model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(secs) = lookup("AGENT_MODEL_TIMEOUT_SECS") {
            self.model.timeout_secs = parse_var("AGENT_MODEL_TIMEOUT_SECS", &secs)?;
        }
        if let Some(url) = lookup("MCP_BRIDGE_URL") {
            self.bridge.base_url = url;
        }
        if let Some(host) = lookup("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GATEWAY_PORT") {
            self.server.port = parse_var("GATEWAY_PORT", &port)?;
        }
        if let Some(rounds) = lookup("AGENT_MAX_ROUNDS") {
            self.agent.max_rounds = parse_var::<usize>("AGENT_MAX_ROUNDS", &rounds)?.max(1);
        }
        if let Some(secs) = lookup("AGENT_TOOL_TIMEOUT_SECS") {
            self.agent.tool_timeout_secs = parse_var("AGENT_TOOL_TIMEOUT_SECS", &secs)?;
        }
        Ok(())
    }
}

/// Bridge settings come from the environment only.
#[derive(Debug, Clone, PartialEq)]
pub struct FsBridgeConfig {
    pub server: ServerConfig,
    pub root: String,
}

fn default_bridge_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: 8765,
    }
}

fn default_root() -> String {
    "/data".into()
}

impl Default for FsBridgeConfig {
    fn default() -> Self {
        Self {
            server: default_bridge_server(),
            root: default_root(),
        }
    }
}

impl FsBridgeConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup("MCP_ROOT") {
            self.root = root;
        }
        if let Some(host) = lookup("BRIDGE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("BRIDGE_PORT") {
            self.server.port = parse_var("BRIDGE_PORT", &port)?;
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| GatewayError::Config(format!("invalid value for {key} (`{raw}`): {err}")))
}
