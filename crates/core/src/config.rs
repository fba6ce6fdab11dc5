use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{DEFAULT_CAPACITY, DEFAULT_RECENT_LIMIT};

pub const DEFAULT_APPROVE_EMOJI: &str = "✅";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub token: Option<SecretString>,
    pub channel_id: Option<String>,
    pub approve_emoji: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub capacity: usize,
    pub recent_limit: usize,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub discord_token: Option<String>,
    pub channel_id: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub store_capacity: Option<usize>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                token: None,
                channel_id: None,
                approve_emoji: DEFAULT_APPROVE_EMOJI.to_string(),
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: 3000 },
            store: StoreConfig { capacity: DEFAULT_CAPACITY, recent_limit: DEFAULT_RECENT_LIMIT },
            gateway: GatewayConfig { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl DiscordConfig {
    pub fn has_token(&self) -> bool {
        self.token.as_ref().is_some_and(|token| !token.expose_secret().trim().is_empty())
    }

    /// Ingress needs both a token and a channel; either missing disables it
    /// without failing the HTTP API.
    pub fn ingress_enabled(&self) -> bool {
        self.has_token() && self.channel_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(discord) = patch.discord {
            if let Some(discord_token_value) = discord.token {
                self.discord.token = Some(secret_value(discord_token_value));
            }
            if let Some(channel_id) = discord.channel_id {
                self.discord.channel_id = Some(channel_id);
            }
            if let Some(approve_emoji) = discord.approve_emoji {
                self.discord.approve_emoji = approve_emoji;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(store) = patch.store {
            if let Some(capacity) = store.capacity {
                self.store.capacity = capacity;
            }
            if let Some(recent_limit) = store.recent_limit {
                self.store.recent_limit = recent_limit;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(max_retries) = gateway.max_retries {
                self.gateway.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = gateway.base_delay_ms {
                self.gateway.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = gateway.max_delay_ms {
                self.gateway.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let token = read_env("RELAY_DISCORD_TOKEN").or_else(|| read_env("DISCORD_TOKEN"));
        if let Some(value) = token {
            self.discord.token = Some(secret_value(value));
        }
        let channel_id = read_env("RELAY_CHANNEL_ID").or_else(|| read_env("CHANNEL_ID"));
        if let Some(value) = channel_id {
            self.discord.channel_id = Some(value);
        }
        if let Some(value) = read_env("RELAY_APPROVE_EMOJI") {
            self.discord.approve_emoji = value;
        }

        if let Some(value) = read_env("RELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RELAY_SERVER_PORT") {
            self.server.port = parse_u16("RELAY_SERVER_PORT", &value)?;
        } else if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }

        if let Some(value) = read_env("RELAY_STORE_CAPACITY") {
            self.store.capacity = parse_usize("RELAY_STORE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("RELAY_STORE_RECENT_LIMIT") {
            self.store.recent_limit = parse_usize("RELAY_STORE_RECENT_LIMIT", &value)?;
        }

        if let Some(value) = read_env("RELAY_GATEWAY_MAX_RETRIES") {
            self.gateway.max_retries = parse_u32("RELAY_GATEWAY_MAX_RETRIES", &value)?;
        }

        let log_level = read_env("RELAY_LOGGING_LEVEL").or_else(|| read_env("RELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RELAY_LOGGING_FORMAT").or_else(|| read_env("RELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(discord_token) = overrides.discord_token {
            self.discord.token = Some(secret_value(discord_token));
        }
        if let Some(channel_id) = overrides.channel_id {
            self.discord.channel_id = Some(channel_id);
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(store_capacity) = overrides.store_capacity {
            self.store.capacity = store_capacity;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    /// Channel ids are compared verbatim against gateway events, so surrounding
    /// whitespace is dropped and a blank id counts as unset.
    fn normalize(&mut self) {
        self.discord.channel_id = self
            .discord
            .channel_id
            .take()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_discord(&self.discord)?;
        validate_server(&self.server)?;
        validate_store(&self.store)?;
        validate_gateway(&self.gateway)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("relay.toml"), PathBuf::from("config/relay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

// Token and channel are deliberately not required here; their presence is only
// reported at startup.
fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    if discord.approve_emoji.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.approve_emoji must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.capacity == 0 {
        return Err(ConfigError::Validation(
            "store.capacity must be greater than zero".to_string(),
        ));
    }

    if store.recent_limit == 0 || store.recent_limit > store.capacity {
        return Err(ConfigError::Validation(format!(
            "store.recent_limit must be in range 1..={}",
            store.capacity
        )));
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.base_delay_ms > gateway.max_delay_ms {
        return Err(ConfigError::Validation(
            "gateway.base_delay_ms must not exceed gateway.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    discord: Option<DiscordPatch>,
    server: Option<ServerPatch>,
    store: Option<StorePatch>,
    gateway: Option<GatewayPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    token: Option<String>,
    channel_id: Option<String>,
    approve_emoji: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    capacity: Option<usize>,
    recent_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
