//! Gateway configuration.
//!
//! A TOML file supplies the base values; `serve` flags and `STREAMGATE_*`
//! environment variables override them afterwards.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use streamgate_dispatch::{
    Credentials, PipelineConfig, SessionConfig, DEFAULT_BOT_USERNAME, DEFAULT_PROTOCOL,
    DEFAULT_RENEWAL_HORIZON,
};
use streamgate_transport::{UdpConfig, DEFAULT_MAX_DATAGRAM, DEFAULT_REPLY_QUEUE};

pub const DEFAULT_PORT: u16 = 4977;
pub const DEFAULT_BACKEND: &str = "127.0.0.1:4978";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid duration {input:?}: {reason}")]
    Duration { input: String, reason: &'static str },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Everything `serve` needs to run the gateway.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// UDP listen address. Port 0 disables the server.
    pub bind: SocketAddr,
    #[serde(deserialize_with = "humane_duration")]
    pub heartbeat_interval: Duration,
    #[serde(deserialize_with = "humane_duration")]
    pub renewal_horizon: Duration,
    #[serde(deserialize_with = "humane_duration")]
    pub dispatch_timeout: Duration,
    #[serde(deserialize_with = "humane_duration")]
    pub connect_timeout: Duration,
    pub protocol: String,
    /// Backend command processor, `host:port`.
    pub backend: String,
    pub client_id: String,
    pub client_secret: String,
    pub bot_username: String,
    pub agent: Option<String>,
    pub host: Option<String>,
    pub area: Option<String>,
    pub max_datagram_size: usize,
    /// Replies allowed to wait for the socket before new ones are refused.
    pub reply_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            heartbeat_interval: Duration::from_secs(5),
            renewal_horizon: DEFAULT_RENEWAL_HORIZON,
            dispatch_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            protocol: DEFAULT_PROTOCOL.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            bot_username: DEFAULT_BOT_USERNAME.to_string(),
            agent: None,
            host: None,
            area: None,
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            reply_queue: DEFAULT_REPLY_QUEUE,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("renewal_horizon", &self.renewal_horizon)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("protocol", &self.protocol)
            .field("backend", &self.backend)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &format_args!("<redacted:{} bytes>", self.client_secret.len()),
            )
            .field("bot_username", &self.bot_username)
            .field("agent", &self.agent)
            .field("host", &self.host)
            .field("area", &self.area)
            .field("max_datagram_size", &self.max_datagram_size)
            .field("reply_queue", &self.reply_queue)
            .finish()
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// False when the configured port is 0.
    pub fn enabled(&self) -> bool {
        self.bind.port() != 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.trim().is_empty() {
            return Err(ConfigError::Empty("protocol"));
        }
        if self.backend.trim().is_empty() {
            return Err(ConfigError::Empty("backend"));
        }
        if self.bot_username.trim().is_empty() {
            return Err(ConfigError::Empty("bot_username"));
        }
        if self.max_datagram_size == 0 {
            return Err(ConfigError::Zero("max_datagram_size"));
        }
        if self.reply_queue == 0 {
            return Err(ConfigError::Zero("reply_queue"));
        }
        for (field, value) in [
            ("heartbeat_interval", self.heartbeat_interval),
            ("renewal_horizon", self.renewal_horizon),
            ("dispatch_timeout", self.dispatch_timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Zero(field));
            }
        }
        Ok(())
    }

    pub fn agent(&self) -> String {
        self.agent
            .clone()
            .unwrap_or_else(|| format!("streamgate/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn host(&self) -> String {
        self.host
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            bind: self.bind,
            heartbeat_interval: self.heartbeat_interval,
            max_datagram_size: self.max_datagram_size,
            reply_queue: self.reply_queue,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            credentials: Credentials {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                agent: self.agent(),
                host: self.host(),
                bot_username: self.bot_username.clone(),
            },
            heartbeat_interval: self.heartbeat_interval,
            renewal_horizon: self.renewal_horizon,
            dispatch_timeout: self.dispatch_timeout,
            area: self.area.clone(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            protocol: self.protocol.clone(),
            dispatch_timeout: self.dispatch_timeout,
        }
    }
}

/// Parse `500ms`, `5s`, `10m`, `24h`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    let invalid = |reason| ConfigError::Duration {
        input: input.to_string(),
        reason,
    };
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }

    let (number, scale) = if let Some(num) = trimmed.strip_suffix("ms") {
        (num, Duration::from_millis(1))
    } else if let Some(num) = trimmed.strip_suffix('s') {
        (num, Duration::from_secs(1))
    } else if let Some(num) = trimmed.strip_suffix('m') {
        (num, Duration::from_secs(60))
    } else if let Some(num) = trimmed.strip_suffix('h') {
        (num, Duration::from_secs(3600))
    } else {
        (trimmed, Duration::from_secs(1))
    };

    let value: u32 = number
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number with ms, s, m or h"))?;
    if value == 0 {
        return Err(invalid("must be greater than zero"));
    }
    scale.checked_mul(value).ok_or_else(|| invalid("out of range"))
}

fn humane_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(0) => Err(serde::de::Error::custom("duration must be greater than zero")),
        Raw::Seconds(secs) => Ok(Duration::from_secs(u64::from(secs))),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
