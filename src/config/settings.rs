use std::fmt;

use serde::Deserialize;

/// Signing secret used when none is configured. Fine for local runs only.
pub const DEFAULT_SECRET: &str = "change-me";

/// Top-level configuration settings for the gateway.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub auth: AuthSettings,
    pub gateway: GatewaySettings,
    pub log: LogSettings,
}

/// Bind address for the WebSocket and HTTP listeners.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    /// WebSocket port.
    pub port: u16,
    pub http_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub max_connections: usize,
    /// Seconds a socket may stay open without a successful `connect`.
    pub connect_timeout_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub token_ttl_secs: u64,
}

impl AuthSettings {
    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SECRET
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Channel policy knobs.
///
/// `default_channels` are subscribed server-side on every accepted connect.
/// Setting `owner_namespace` switches from allow-all to owner-only access
/// for channels under that namespace.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewaySettings {
    pub default_channels: Vec<String>,
    pub owner_namespace: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; [`PartialSettings::merge`] fills the gaps from
/// the compiled defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub gateway: Option<PartialGatewaySettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub http_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
pub struct PartialAuthSettings {
    pub secret: Option<String>,
    pub token_ttl_secs: Option<u64>,
}

impl fmt::Debug for PartialAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialAuthSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialGatewaySettings {
    pub default_channels: Option<Vec<String>>,
    pub owner_namespace: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Overlay whatever was provided onto `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let auth = self.auth.unwrap_or_default();
        let gateway = self.gateway.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
                http_port: server.http_port.unwrap_or(defaults.server.http_port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .max_connections
                    .unwrap_or(defaults.broker.max_connections),
                connect_timeout_secs: broker
                    .connect_timeout_secs
                    .unwrap_or(defaults.broker.connect_timeout_secs),
            },
            auth: AuthSettings {
                secret: auth.secret.unwrap_or(defaults.auth.secret),
                token_ttl_secs: auth.token_ttl_secs.unwrap_or(defaults.auth.token_ttl_secs),
            },
            gateway: GatewaySettings {
                default_channels: gateway
                    .default_channels
                    .unwrap_or(defaults.gateway.default_channels),
                owner_namespace: gateway
                    .owner_namespace
                    .filter(|ns| !ns.trim().is_empty())
                    .or(defaults.gateway.owner_namespace),
            },
            log: LogSettings {
                level: log.level.unwrap_or(defaults.log.level),
            },
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            http_port: 8081,
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
