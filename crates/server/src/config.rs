use serde::Deserialize;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Deserialize)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect target used by the callback flow when the caller does not pass one.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    /// Upper bound for each of the two provider calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding `private_key.pem` and `public_key.pem`.
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,
}

fn default_redirect_uri() -> String {
    "http://localhost:8001/auth/callback".into()
}

fn default_api_base_url() -> String {
    "https://discord.com/api".into()
}

fn default_authorize_url() -> String {
    "https://discord.com/api/oauth2/authorize".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8001
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("keys")
}

/// Flat environment variables understood for compatibility with existing deployments,
/// mapped onto their configuration key.
const LEGACY_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DISCORD_CLIENT_ID", "discord.client_id"),
    ("DISCORD_CLIENT_SECRET", "discord.client_secret"),
    ("DISCORD_REDIRECT_URI", "discord.redirect_uri"),
];

/// Load application configuration from `config.yaml` (optional) + environment overrides.
///
/// Precedence, lowest first:
/// - the config file
/// - environment variables named after the key path with `__` separators
///   (e.g. `DISCORD__CLIENT_SECRET`, `PORT`, `KEYS_DIR`)
/// - the flat `DISCORD_CLIENT_ID`, `DISCORD_CLIENT_SECRET` and `DISCORD_REDIRECT_URI`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config")
}

/// Like [`load_config`] with an explicit file name (extension optional).
pub fn load_config_from(file: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};

    let mut builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(Environment::default().separator("__"));

    for (var, key) in LEGACY_ENV_OVERRIDES {
        builder = builder.set_override_option(*key, env::var(var).ok())?;
    }

    let app: AppConfig = builder.build()?.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.client_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discord.client_id must not be empty".into(),
            ));
        }
        if self.discord.client_secret.trim().is_empty() {
            return Err(ConfigError::Validation(
                "discord.client_secret must not be empty".into(),
            ));
        }
        if self.discord.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "discord.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be > 0".into()));
        }
        Ok(())
    }
}
