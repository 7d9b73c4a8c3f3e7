mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    AuthSettings, BrokerSettings, DEFAULT_SECRET, GatewaySettings, LogSettings, ServerSettings,
    Settings,
};

/// Loads the configuration from the default file and environment variables.
///
/// Precedence, lowest first: compiled defaults, `config/default.*`,
/// `PUBGATE_*` variables (`__` separates sections, e.g.
/// `PUBGATE_SERVER__PORT`), then the bare `JWT_SECRET`, `PORT` and
/// `LOG_LEVEL` variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("PUBGATE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("gateway.default_channels")
                .try_parsing(true),
        )
        .set_override_option("auth.secret", legacy_var("JWT_SECRET"))?
        .set_override_option("server.http_port", legacy_var("PORT"))?
        .set_override_option("log.level", legacy_var("LOG_LEVEL"))?;

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    Ok(partial.merge(Settings::default()))
}

fn legacy_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
