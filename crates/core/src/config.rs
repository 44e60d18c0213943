use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ratelimit::{RateLimitConfig, RateLimitRule};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub routing: RoutingSettings,
    pub rate_limit: RateLimitConfig,
    pub business_hours: BusinessHoursConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Thresholds and node names used by the analyzer and the route resolver.
#[derive(Clone, Debug)]
pub struct RoutingSettings {
    pub domain: String,
    pub confidence_threshold: f64,
    pub out_of_scope_threshold: f64,
    pub fallback_timeout_ms: u64,
    pub recent_turns: usize,
    pub config_cache_ttl_secs: u64,
    pub auth_entry_node: String,
    pub main_menu_node: String,
    /// Global-keyword intents that may interrupt a pending awaited input.
    pub escape_intents: Vec<String>,
}

impl RoutingSettings {
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    pub fn config_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl_secs)
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            domain: "collections".to_string(),
            confidence_threshold: 0.7,
            out_of_scope_threshold: 0.3,
            fallback_timeout_ms: 5_000,
            recent_turns: 6,
            config_cache_ttl_secs: 300,
            auth_entry_node: "authentication".to_string(),
            main_menu_node: "main_menu".to_string(),
            escape_intents: ["cancel", "show_menu", "farewell", "request_advisor"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BusinessHoursConfig {
    pub default_timezone: String,
    /// Applied to stored schedules that leave the enabled flag unset.
    pub default_enabled: bool,
    pub lookup_timeout_ms: u64,
}

impl BusinessHoursConfig {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.default_timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::Validation(format!(
                "business_hours.default_timezone `{}` is not a known IANA time zone",
                self.default_timezone
            ))
        })
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub llm_enabled: Option<bool>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub routing_domain: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
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
            database: DatabaseConfig {
                url: "sqlite://dialroute.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                enabled: false,
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 1,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            routing: RoutingSettings::default(),
            rate_limit: RateLimitConfig::default(),
            business_hours: BusinessHoursConfig {
                default_timezone: "America/Bogota".to_string(),
                default_enabled: true,
                lookup_timeout_ms: 500,
            },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dialroute.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(enabled) = llm.enabled {
                self.llm.enabled = enabled;
            }
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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

        if let Some(routing) = patch.routing {
            if let Some(domain) = routing.domain {
                self.routing.domain = domain;
            }
            if let Some(threshold) = routing.confidence_threshold {
                self.routing.confidence_threshold = threshold;
            }
            if let Some(threshold) = routing.out_of_scope_threshold {
                self.routing.out_of_scope_threshold = threshold;
            }
            if let Some(timeout_ms) = routing.fallback_timeout_ms {
                self.routing.fallback_timeout_ms = timeout_ms;
            }
            if let Some(recent_turns) = routing.recent_turns {
                self.routing.recent_turns = recent_turns;
            }
            if let Some(ttl) = routing.config_cache_ttl_secs {
                self.routing.config_cache_ttl_secs = ttl;
            }
            if let Some(node) = routing.auth_entry_node {
                self.routing.auth_entry_node = node;
            }
            if let Some(node) = routing.main_menu_node {
                self.routing.main_menu_node = node;
            }
            if let Some(intents) = routing.escape_intents {
                self.routing.escape_intents = intents;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            apply_rule_patch(&mut self.rate_limit.messages_per_minute, rate_limit.messages_per_minute);
            apply_rule_patch(&mut self.rate_limit.messages_per_hour, rate_limit.messages_per_hour);
            apply_rule_patch(
                &mut self.rate_limit.external_queries_per_hour,
                rate_limit.external_queries_per_hour,
            );
            apply_rule_patch(
                &mut self.rate_limit.payment_links_per_day,
                rate_limit.payment_links_per_day,
            );
            if let Some(timeout_ms) = rate_limit.store_timeout_ms {
                self.rate_limit.store_timeout_ms = timeout_ms;
            }
            if let Some(interval) = rate_limit.purge_interval_secs {
                self.rate_limit.purge_interval_secs = interval;
            }
        }

        if let Some(business_hours) = patch.business_hours {
            if let Some(timezone) = business_hours.default_timezone {
                self.business_hours.default_timezone = timezone;
            }
            if let Some(enabled) = business_hours.default_enabled {
                self.business_hours.default_enabled = enabled;
            }
            if let Some(timeout_ms) = business_hours.lookup_timeout_ms {
                self.business_hours.lookup_timeout_ms = timeout_ms;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DIALROUTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DIALROUTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("DIALROUTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DIALROUTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("DIALROUTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DIALROUTE_LLM_ENABLED") {
            self.llm.enabled = parse_env("DIALROUTE_LLM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("DIALROUTE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("DIALROUTE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DIALROUTE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DIALROUTE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DIALROUTE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("DIALROUTE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DIALROUTE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("DIALROUTE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("DIALROUTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DIALROUTE_SERVER_PORT") {
            self.server.port = parse_env("DIALROUTE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DIALROUTE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("DIALROUTE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DIALROUTE_LOGGING_LEVEL").or_else(|| read_env("DIALROUTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DIALROUTE_LOGGING_FORMAT").or_else(|| read_env("DIALROUTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("DIALROUTE_ROUTING_DOMAIN") {
            self.routing.domain = value;
        }
        if let Some(value) = read_env("DIALROUTE_ROUTING_CONFIDENCE_THRESHOLD") {
            self.routing.confidence_threshold =
                parse_env("DIALROUTE_ROUTING_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("DIALROUTE_ROUTING_FALLBACK_TIMEOUT_MS") {
            self.routing.fallback_timeout_ms =
                parse_env("DIALROUTE_ROUTING_FALLBACK_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("DIALROUTE_RATE_LIMIT_STORE_TIMEOUT_MS") {
            self.rate_limit.store_timeout_ms =
                parse_env("DIALROUTE_RATE_LIMIT_STORE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("DIALROUTE_RATE_LIMIT_PURGE_INTERVAL_SECS") {
            self.rate_limit.purge_interval_secs =
                parse_env("DIALROUTE_RATE_LIMIT_PURGE_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("DIALROUTE_BUSINESS_HOURS_DEFAULT_TIMEZONE") {
            self.business_hours.default_timezone = value;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(domain) = overrides.routing_domain {
            self.routing.domain = domain;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_routing(&self.routing)?;
        validate_rate_limit(&self.rate_limit)?;
        self.business_hours.timezone()?;
        Ok(())
    }
}

fn apply_rule_patch(rule: &mut RateLimitRule, patch: Option<RateLimitRulePatch>) {
    let Some(patch) = patch else {
        return;
    };
    if let Some(limit) = patch.limit {
        rule.limit = limit;
    }
    if let Some(window_secs) = patch.window_secs {
        rule.window_secs = window_secs;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dialroute.toml"), PathBuf::from("config/dialroute.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.enabled {
        return Ok(());
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers when llm.enabled is true"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn validate_routing(routing: &RoutingSettings) -> Result<(), ConfigError> {
    if routing.domain.trim().is_empty() {
        return Err(ConfigError::Validation("routing.domain must not be empty".to_string()));
    }

    for (key, value) in [
        ("routing.confidence_threshold", routing.confidence_threshold),
        ("routing.out_of_scope_threshold", routing.out_of_scope_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range 0.0..=1.0")));
        }
    }

    if routing.out_of_scope_threshold > routing.confidence_threshold {
        return Err(ConfigError::Validation(
            "routing.out_of_scope_threshold must not exceed routing.confidence_threshold"
                .to_string(),
        ));
    }

    if routing.fallback_timeout_ms == 0 || routing.fallback_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "routing.fallback_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if routing.auth_entry_node.trim().is_empty() || routing.main_menu_node.trim().is_empty() {
        return Err(ConfigError::Validation(
            "routing.auth_entry_node and routing.main_menu_node must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    for (key, rule) in [
        ("rate_limit.messages_per_minute", rate_limit.messages_per_minute),
        ("rate_limit.messages_per_hour", rate_limit.messages_per_hour),
        ("rate_limit.external_queries_per_hour", rate_limit.external_queries_per_hour),
        ("rate_limit.payment_links_per_day", rate_limit.payment_links_per_day),
    ] {
        if rule.limit == 0 || rule.window_secs == 0 {
            return Err(ConfigError::Validation(format!(
                "{key}.limit and {key}.window_secs must be greater than zero"
            )));
        }
    }

    if rate_limit.store_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.store_timeout_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    routing: Option<RoutingPatch>,
    rate_limit: Option<RateLimitPatch>,
    business_hours: Option<BusinessHoursPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    enabled: Option<bool>,
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    domain: Option<String>,
    confidence_threshold: Option<f64>,
    out_of_scope_threshold: Option<f64>,
    fallback_timeout_ms: Option<u64>,
    recent_turns: Option<usize>,
    config_cache_ttl_secs: Option<u64>,
    auth_entry_node: Option<String>,
    main_menu_node: Option<String>,
    escape_intents: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitRulePatch {
    limit: Option<u64>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    messages_per_minute: Option<RateLimitRulePatch>,
    messages_per_hour: Option<RateLimitRulePatch>,
    external_queries_per_hour: Option<RateLimitRulePatch>,
    payment_links_per_day: Option<RateLimitRulePatch>,
    store_timeout_ms: Option<u64>,
    purge_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessHoursPatch {
    default_timezone: Option<String>,
    default_enabled: Option<bool>,
    lookup_timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, LlmProvider};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_a_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.llm.enabled, "model fallback should be disabled by default")?;
        ensure(config.routing.domain == "collections", "default domain should be collections")?;
        ensure(
            config.routing.escape_intents.iter().any(|intent| intent == "cancel"),
            "cancel should be an escape intent by default",
        )?;
        ensure(config.rate_limit.messages_per_minute.limit == 10, "minute quota default is 10")?;
        ensure(config.rate_limit.purge_interval_secs == 300, "counter sweep every five minutes")?;
        ensure(
            config.business_hours.timezone().map(|tz| tz.name() == "America/Bogota").unwrap_or(false),
            "default time zone should be America/Bogota",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DIALROUTE_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dialroute.toml");
            fs::write(
                &path,
                r#"
[llm]
enabled = true
provider = "open_ai"
api_key = "${TEST_DIALROUTE_LLM_KEY}"
model = "gpt-4o-mini"

[rate_limit.messages_per_minute]
limit = 3
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(matches!(config.llm.provider, LlmProvider::OpenAi), "provider from file")?;
            ensure(
                config
                    .llm
                    .api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "sk-from-env")
                    .unwrap_or(false),
                "api key should be interpolated from environment",
            )?;
            ensure(config.rate_limit.messages_per_minute.limit == 3, "patched minute limit")?;
            ensure(
                config.rate_limit.messages_per_minute.window_secs == 60,
                "unpatched window keeps its default",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_DIALROUTE_LLM_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DIALROUTE_LOG_LEVEL", "warn");
        env::set_var("DIALROUTE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DIALROUTE_LOG_LEVEL", "DIALROUTE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DIALROUTE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DIALROUTE_ROUTING_DOMAIN", "from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dialroute.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[routing]
domain = "from-file"
main_menu_node = "menu_principal"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.routing.domain == "from-env", "env domain should win over file")?;
            ensure(
                config.routing.main_menu_node == "menu_principal",
                "file value should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["DIALROUTE_DATABASE_URL", "DIALROUTE_ROUTING_DOMAIN"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DIALROUTE_LLM_ENABLED", "true");
        env::set_var("DIALROUTE_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["DIALROUTE_LLM_ENABLED", "DIALROUTE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn unknown_time_zone_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DIALROUTE_BUSINESS_HOURS_DEFAULT_TIMEZONE", "America/Atlantis");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default()).err();
            ensure(
                matches!(
                    error,
                    Some(ConfigError::Validation(ref message))
                        if message.contains("business_hours.default_timezone")
                ),
                "validation failure should mention business_hours.default_timezone",
            )
        })();

        clear_vars(&["DIALROUTE_BUSINESS_HOURS_DEFAULT_TIMEZONE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DIALROUTE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["DIALROUTE_LLM_API_KEY"]);
        result
    }
}
