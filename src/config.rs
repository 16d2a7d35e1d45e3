//! Configuration management

use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LLM_BASE_URL: &str = "https://newapi.deepwisdom.ai/v1";
const DEFAULT_LLM_MODEL: &str = "deepseek-chat";

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the OpenAI-compatible endpoint (generation fails without it)
    pub llm_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    pub llm_base_url: String,

    /// Model identifier sent with every request
    pub llm_model: String,

    /// Max tokens per completion
    pub max_tokens: usize,

    /// Upper bound on a single LLM exchange, in seconds
    pub llm_timeout_secs: u64,

    /// Directory holding `*.yaml` / `*.yml` skill templates
    pub templates_dir: PathBuf,

    /// HTTP server settings
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let llm_api_key = std::env::var("LLM_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let llm_base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());

        let llm_model = std::env::var("LLM_MODEL")
            .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());

        let max_tokens = std::env::var("SKILLFORGE_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4096);

        let llm_timeout_secs = std::env::var("SKILLFORGE_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let templates_dir = std::env::var("SKILLFORGE_TEMPLATES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("templates"));

        Ok(Self {
            llm_api_key,
            llm_base_url,
            llm_model,
            max_tokens,
            llm_timeout_secs,
            templates_dir,
            server: ServerConfig::from_env(),
        })
    }

    /// Timeout applied to each LLM exchange
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: 4096,
            llm_timeout_secs: 120,
            templates_dir: PathBuf::from("templates"),
            server: ServerConfig::default(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1)
    pub bind_addr: IpAddr,
    /// Port number (default: 8000)
    pub port: u16,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
    /// Enable request logging
    pub log_requests: bool,
    /// Generate requests per minute per client
    pub generate_rpm: u32,
    /// Scan requests per minute per client
    pub scan_rpm: u32,
    /// Rate limit window in seconds
    pub rate_window_secs: u64,
    /// How often idle rate-limit entries are swept, in seconds
    pub rate_sweep_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            log_requests: true,
            generate_rpm: 10,
            scan_rpm: 20,
            rate_window_secs: 60,
            rate_sweep_secs: 300,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SKILLFORGE_BIND_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.bind_addr = parsed;
            }
        }

        if let Ok(port) = std::env::var("SKILLFORGE_PORT") {
            if let Ok(parsed) = port.parse() {
                config.port = parsed;
            }
        }

        if let Ok(origins) = std::env::var("SKILLFORGE_CORS_ORIGINS") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.cors_origins = parsed;
            }
        }

        if let Ok(secs) = std::env::var("SKILLFORGE_RATE_SWEEP_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                config.rate_sweep_secs = parsed.max(1);
            }
        }

        if let Ok(val) = std::env::var("SKILLFORGE_LOG_REQUESTS") {
            config.log_requests = val == "true" || val == "1";
        }

        config
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_is_localhost() {
        let config = ServerConfig::default();
        assert!(config.bind_addr.is_loopback());
        assert_eq!(config.port, 8000);
        assert_eq!(config.generate_rpm, 10);
        assert_eq!(config.scan_rpm, 20);
        assert_eq!(config.rate_window_secs, 60);
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::default();
        let addr = config.socket_addr();
        assert_eq!(addr.port(), 8000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_base_url() {
        let config = ServerConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_generation_timeout() {
        let config = Config {
            llm_timeout_secs: 7,
            ..Default::default()
        };
        assert_eq!(config.generation_timeout(), Duration::from_secs(7));
    }
}
