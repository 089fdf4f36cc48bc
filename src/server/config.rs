//! Server configuration

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::coordinator::RelayConfig;
use crate::error::ServerError;

const DEFAULT_PORT: u16 = 3330;
const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Base URL embedded into room links handed to clients
    pub public_base_url: String,

    /// Frontend origin allowed by CORS
    pub cors_origin: String,

    /// Base URL of the object storage service
    pub storage_url: String,

    /// Secret used to authorize storage calls
    pub storage_secret: String,

    /// Room lifecycle policy
    pub relay: RelayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            public_base_url: DEFAULT_FRONTEND_ORIGIN.to_string(),
            cors_origin: DEFAULT_FRONTEND_ORIGIN.to_string(),
            storage_url: "http://localhost:9000".to_string(),
            storage_secret: String::new(),
            relay: RelayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the public base URL used in room links
    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into();
        self
    }

    /// Set the allowed CORS origin
    pub fn cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origin = origin.into();
        self
    }

    /// Set the relay policy
    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Set the inactivity timeout
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.relay.inactivity_timeout = timeout;
        self
    }

    /// Load configuration from the environment
    ///
    /// Unset variables fall back to defaults; values that are set but
    /// unparsable are configuration errors rather than silent fallbacks.
    pub fn from_env() -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Ok(port) = env::var("PORT") {
            let port: u16 = port.parse().map_err(|_| ServerError::Config {
                key: "PORT".into(),
                reason: format!("not a port number: {}", port),
            })?;
            config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        }
        if let Ok(addr) = env::var("BIND_ADDR") {
            config.bind_addr = addr.parse().map_err(|_| ServerError::Config {
                key: "BIND_ADDR".into(),
                reason: format!("not a socket address: {}", addr),
            })?;
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL") {
            config.public_base_url = url;
        }
        if let Ok(origin) = env::var("CORS_ORIGIN") {
            config.cors_origin = origin;
        }
        if let Ok(url) = env::var("STORAGE_URL") {
            config.storage_url = url;
        }
        if let Ok(secret) = env::var("STORAGE_SECRET") {
            config.storage_secret = secret;
        }
        if let Ok(secs) = env::var("INACTIVITY_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ServerError::Config {
                key: "INACTIVITY_TIMEOUT_SECS".into(),
                reason: format!("not a number of seconds: {}", secs),
            })?;
            config.relay.inactivity_timeout = Duration::from_secs(secs);
        }
        if let Ok(value) = env::var("TEARDOWN_ON_EMPTY") {
            config.relay.teardown_on_empty = parse_bool("TEARDOWN_ON_EMPTY", &value)?;
        }
        if let Ok(value) = env::var("RESET_TIMER_ON_MEDIA") {
            config.relay.reset_timer_on_media = parse_bool("RESET_TIMER_ON_MEDIA", &value)?;
        }

        Ok(config)
    }

    /// Room link handed out at creation time
    pub fn room_link(&self, token: &crate::room::RoomToken) -> String {
        format!(
            "{}/chat/{}",
            self.public_base_url.trim_end_matches('/'),
            token
        )
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ServerError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ServerError::Config {
            key: key.into(),
            reason: format!("not a boolean: {}", value),
        }),
    }
}
