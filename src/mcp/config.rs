/// Server Configuration
///
/// All settings come from environment variables (optionally seeded from a
/// `.env` file at start-up). Parsing goes through `ServerConfig::from_lookup`
/// so it can be exercised without touching the process environment.
///
/// Environment Variables:
/// - SERVER_NAME: Name of the server (default: "mcp-tool-router")
/// - SERVER_VERSION: Version string (default: crate version)
/// - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "http")
/// - HOST: Bind address for HTTP mode (default: "0.0.0.0")
/// - PORT: Port number for HTTP mode (default: 3000)
/// - WORKER_THREADS: HTTP worker count (default: CPU count, capped at 16)
/// - MCP_STRICT_ARGUMENTS: reject undeclared tool arguments (default: false)
/// - LOG_FORMAT: "pretty" or "json" (default: "pretty")
/// - CLIENT_ID / CLIENT_SECRET / TENANT_ID: Power BI app registration

use std::num::NonZeroUsize;
use std::str::FromStr;
use thiserror::Error;

use crate::mcp::schema::ArgumentPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which transports to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stdio,
    Http,
    Both,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportMode::Stdio),
            "http" => Ok(TransportMode::Http),
            "both" => Ok(TransportMode::Both),
            _ => Err("must be 'stdio', 'http', or 'both'".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err("must be 'pretty' or 'json'".to_string()),
        }
    }
}

/// Azure app registration used by the Power BI tools.
#[derive(Clone, Default)]
pub struct PowerBiCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
}

impl PowerBiCredentials {
    pub fn is_complete(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.tenant_id.is_some()
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for PowerBiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerBiCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub argument_policy: ArgumentPolicy,
    pub log_format: LogFormat,
    pub powerbi: PowerBiCredentials,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let strict = match get("MCP_STRICT_ARGUMENTS") {
            Some(v) => parse_bool("MCP_STRICT_ARGUMENTS", &v)?,
            None => false,
        };

        Ok(Self {
            name: get("SERVER_NAME").unwrap_or_else(|| "mcp-tool-router".to_string()),
            version: get("SERVER_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            transport: parse_or("MCP_TRANSPORT_MODE", get("MCP_TRANSPORT_MODE"), TransportMode::Http)?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 3000)?,
            // Defaults to CPU count but capped at 16 to avoid excessive context switching
            workers: parse_or::<NonZeroUsize>("WORKER_THREADS", get("WORKER_THREADS"), default_workers())?
                .get(),
            argument_policy: if strict {
                ArgumentPolicy::Strict
            } else {
                ArgumentPolicy::Permissive
            },
            log_format: parse_or("LOG_FORMAT", get("LOG_FORMAT"), LogFormat::Pretty)?,
            powerbi: PowerBiCredentials {
                client_id: get("CLIENT_ID"),
                client_secret: get("CLIENT_SECRET"),
                tenant_id: get("TENANT_ID"),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => {
            let parsed: Result<T, T::Err> = value.trim().parse();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
    }
}

fn default_workers() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get().min(16)).unwrap_or(NonZeroUsize::MIN)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
