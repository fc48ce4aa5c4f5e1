use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistConfig {
    /// Hosts (`host` or `host:port`) templates may be fetched from
    #[serde(default = "default_whitelist_hosts")]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Outbound request timeout in seconds. Unset means no timeout.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Largest accepted POST template body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_whitelist_hosts() -> Vec<String> {
    vec![
        "raw.githubusercontent.com".to_string(),
        "gist.githubusercontent.com".to_string(),
    ]
}

fn default_user_agent() -> String {
    format!("subtmpl-service/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024 // 16 MiB
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("whitelist.hosts", default_whitelist_hosts())?
            .set_default("upstream.user_agent", default_user_agent())?
            .set_default("server.max_body_bytes", default_max_body_bytes() as u64)?
            .set_default("log.level", default_log_level())?
            .set_default("log.format", "text")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SUBTMPL__WHITELIST__HOSTS, SUBTMPL__UPSTREAM__TIMEOUT_SECONDS, etc.
            .add_source(
                Environment::with_prefix("SUBTMPL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("whitelist.hosts"),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            hosts: default_whitelist_hosts(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_seconds: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
