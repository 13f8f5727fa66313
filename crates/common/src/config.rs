//! Application configuration.

use serde::Deserialize;
use std::path::Path;
use url::Url;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Federation configuration.
    #[serde(default)]
    pub federation: FederationConfig,
    /// Redis configuration. When absent, activities are recorded in memory.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
    /// Scheme used when rebuilding the IRI of an inbox a request was POSTed to.
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl ServerConfig {
    /// Parse the public URL.
    pub fn public_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Upper bound for an inbox request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Accepted distance between the `Date` header and local time.
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,
    /// Domains whose actors and objects are refused.
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    /// User agent for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// How long a recorded activity id is remembered, in either store.
    #[serde(default = "default_dedupe_ttl_secs")]
    pub dedupe_ttl_secs: u64,
    /// Key used to sign outbound deliveries. Sending is disabled without it.
    #[serde(default)]
    pub signing_key: Option<SigningKeyConfig>,
}

/// Key outbound requests are signed with.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKeyConfig {
    /// `keyId` advertised in signatures, usually `{actor}#main-key`.
    pub key_id: String,
    /// PKCS#8 PEM file holding the RSA private key.
    pub private_key_file: String,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            max_clock_skew_secs: default_max_clock_skew_secs(),
            blocked_domains: Vec::new(),
            user_agent: default_user_agent(),
            dedupe_ttl_secs: default_dedupe_ttl_secs(),
            signing_key: None,
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human readable format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

fn default_scheme() -> String {
    "https".to_string()
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

const fn default_max_clock_skew_secs() -> i64 {
    5 * 60
}

fn default_user_agent() -> String {
    concat!("emissary/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_redis_prefix() -> String {
    "emissary".to_string()
}

const fn default_dedupe_ttl_secs() -> u64 {
    48 * 60 * 60
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `EMISSARY_ENV`)
    /// 4. Environment variables with `EMISSARY_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("EMISSARY_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("EMISSARY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("federation.blocked_domains")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("EMISSARY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
