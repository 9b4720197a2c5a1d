use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,
}

/// Proxy configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Public listener for proxied traffic
    #[serde(default)]
    pub listener: Listener,
    /// Optional listener for health and readiness probes
    pub admin_listener: Option<Listener>,
    /// Upper bound for connecting to an upstream and receiving its response headers
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default)]
    pub upstreams: UpstreamsConfig,
}

fn default_upstream_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: None,
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            upstreams: UpstreamsConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin_listener) = &self.admin_listener {
            admin_listener.validate()?;
        }

        if self.upstream_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to. Defaults to all interfaces.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: default_host(),
            port: DEFAULT_PORT,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Origin overrides for each public prefix. Anything left out keeps the public default.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct UpstreamsConfig {
    pub code_host: Option<Url>,
    pub metadata_api: Option<Url>,
    pub registry_auth: Option<Url>,
    pub registry_blob: Option<Url>,
}
