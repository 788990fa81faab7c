use serde::Deserialize;
use std::{collections::HashMap, env};

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    pub search: SearchConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            quota: QuotaConfig::from_env()?,
            search: SearchConfig::from_env()?,
            model: ModelConfig::from_env()?,
            chat: ChatConfig::from_env()?,
        })
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    5
}

impl DatabaseConfig {
    /// Create a connection URL for this database configuration
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("DATABASE_HOST").map_err(|_| "DATABASE_HOST not set")?,
            port: env::var("DATABASE_PORT")
                .map_err(|_| "DATABASE_PORT not set")?
                .parse()
                .map_err(|_| "DATABASE_PORT must be a valid port number")?,
            database: env::var("DATABASE_NAME").map_err(|_| "DATABASE_NAME not set")?,
            username: env::var("DATABASE_USERNAME").map_err(|_| "DATABASE_USERNAME not set")?,
            password: env::var("DATABASE_PASSWORD").map_err(|_| "DATABASE_PASSWORD not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| "DATABASE_MAX_CONNECTIONS must be a valid number")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| "SERVER_PORT must be a valid port number")?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_INFERENCE") {
            modules.insert("inference_providers".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }

    /// Build an `EnvFilter`-compatible directive string
    pub fn filter_directives(&self) -> String {
        let mut filter = self.level.clone();
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        for (module, level) in modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

pub const DEFAULT_DAILY_REQUEST_LIMIT: u32 = 20;

/// Daily request quota applied to non-admin users
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Requests beyond this count per user per UTC day are denied
    pub limit: u32,
}

impl QuotaConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            limit: env::var("QUOTA_DAILY_LIMIT")
                .unwrap_or_else(|_| DEFAULT_DAILY_REQUEST_LIMIT.to_string())
                .parse()
                .map_err(|_| "QUOTA_DAILY_LIMIT must be a non-negative integer")?,
        })
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_DAILY_REQUEST_LIMIT,
        }
    }
}

pub const DEFAULT_BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub api_key: String,
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

fn default_search_url() -> String {
    DEFAULT_BRAVE_SEARCH_URL.to_string()
}

fn default_search_timeout() -> u64 {
    10
}

impl SearchConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            api_key: env::var("BRAVE_SEARCH_API_KEY").map_err(|_| "BRAVE_SEARCH_API_KEY not set")?,
            base_url: env::var("BRAVE_SEARCH_URL").unwrap_or_else(|_| default_search_url()),
            timeout_seconds: env::var("SEARCH_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_search_timeout),
        })
    }
}

/// OpenAI-compatible inference endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub name: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: i64,
}

fn default_model_timeout() -> i64 {
    30
}

impl ModelConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            base_url: env::var("MODEL_BASE_URL").map_err(|_| "MODEL_BASE_URL not set")?,
            api_key: env::var("MODEL_API_KEY").ok(),
            name: env::var("MODEL_NAME").map_err(|_| "MODEL_NAME not set")?,
            timeout_seconds: env::var("MODEL_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_model_timeout),
        })
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. When a question needs current or \
factual information you are unsure about, call the searchWeb tool and ground your answer in the \
results. Keep answers concise.";

/// Step loop settings for the chat orchestrator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_steps: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub step_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub system_prompt: String,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            max_steps: parse_or("CHAT_MAX_STEPS", defaults.max_steps)?,
            max_retries: parse_or("CHAT_MAX_RETRIES", defaults.max_retries)?,
            retry_backoff_ms: parse_or("CHAT_RETRY_BACKOFF_MS", defaults.retry_backoff_ms)?,
            step_timeout_seconds: parse_or(
                "CHAT_STEP_TIMEOUT_SECONDS",
                defaults.step_timeout_seconds,
            )?,
            request_timeout_seconds: parse_or(
                "CHAT_REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            )?,
            system_prompt: env::var("CHAT_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_retries: 3,
            retry_backoff_ms: 250,
            step_timeout_seconds: 30,
            request_timeout_seconds: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}
