// Configuration module
// Defines configuration types, layered loading, and shared application state

use serde::Deserialize;
use std::net::SocketAddr;

use crate::upstream::GeminiClient;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub http: HttpConfig,
    pub static_files: StaticFilesConfig,
    pub upstream: UpstreamConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    /// Optional cap on concurrent connections; also bounds in-flight proxy calls
    #[serde(default)]
    pub max_connections: Option<u64>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub max_body_size: u64,
}

/// Static file serving configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StaticFilesConfig {
    /// Root directory for static resources
    pub root: String,
    /// Resource served for the `/` path
    pub index_file: String,
}

/// Upstream generation service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Gemini API key. Falls back to the `GEMINI_API_KEY` environment variable.
    /// Requests are refused with 500 when no key is configured.
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model used when the request body omits one
    pub default_model: String,
    /// Deadline in seconds for the outbound generateContent call
    pub request_timeout: u64,
}

impl Config {
    /// Load configuration from the default `config.toml`
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("IMGEN").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("static_files.root", "public")?
            .set_default("static_files.index_file", "index.html")?
            .set_default(
                "upstream.base_url",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("upstream.default_model", "gemini-3-pro-image-preview")?
            .set_default("upstream.request_timeout", 60)?
            .build()?;

        let mut cfg: Self = settings.try_deserialize()?;

        // Conventional variables honored by the original deployment
        if cfg.upstream.api_key.is_none() {
            cfg.upstream.api_key = std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                cfg.server.port = port;
            }
        }

        Ok(cfg)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

/// Application state shared across requests
pub struct AppState {
    pub config: Config,
    pub gemini: GeminiClient,
    pub access_log: bool,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let gemini = GeminiClient::new(&config.upstream)?;
        let access_log = config.logging.access_log;
        Ok(Self {
            config,
            gemini,
            access_log,
        })
    }
}
