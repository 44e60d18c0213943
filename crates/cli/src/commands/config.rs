use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dialroute_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One inspected setting: dotted file key, environment variable and rendered value.
struct Field {
    key: &'static str,
    env_key: Option<&'static str>,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl ToString) -> Self {
        Self { key, env_key: Some(env_key), value: value.to_string() }
    }

    fn file_only(key: &'static str, value: impl ToString) -> Self {
        Self { key, env_key: None, value: value.to_string() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config.llm.api_key.as_ref().map(|key| redact_secret(key.expose_secret()));
    let rate = &config.rate_limit;

    vec![
        Field::new("database.url", "DIALROUTE_DATABASE_URL", &config.database.url),
        Field::new(
            "database.max_connections",
            "DIALROUTE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections,
        ),
        Field::new("database.timeout_secs", "DIALROUTE_DATABASE_TIMEOUT_SECS", config.database.timeout_secs),
        Field::new("llm.enabled", "DIALROUTE_LLM_ENABLED", config.llm.enabled),
        Field::new("llm.provider", "DIALROUTE_LLM_PROVIDER", config.llm.provider.as_str()),
        Field::new("llm.model", "DIALROUTE_LLM_MODEL", &config.llm.model),
        Field::new(
            "llm.base_url",
            "DIALROUTE_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", "DIALROUTE_LLM_API_KEY", api_key.as_deref().unwrap_or("<unset>")),
        Field::new("llm.timeout_secs", "DIALROUTE_LLM_TIMEOUT_SECS", config.llm.timeout_secs),
        Field::new("server.bind_address", "DIALROUTE_SERVER_BIND_ADDRESS", &config.server.bind_address),
        Field::new("server.port", "DIALROUTE_SERVER_PORT", config.server.port),
        Field::new("logging.level", "DIALROUTE_LOGGING_LEVEL", &config.logging.level),
        Field::new("logging.format", "DIALROUTE_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
        Field::new("routing.domain", "DIALROUTE_ROUTING_DOMAIN", &config.routing.domain),
        Field::new(
            "routing.confidence_threshold",
            "DIALROUTE_ROUTING_CONFIDENCE_THRESHOLD",
            config.routing.confidence_threshold,
        ),
        Field::file_only("routing.out_of_scope_threshold", config.routing.out_of_scope_threshold),
        Field::new(
            "routing.fallback_timeout_ms",
            "DIALROUTE_ROUTING_FALLBACK_TIMEOUT_MS",
            config.routing.fallback_timeout_ms,
        ),
        Field::file_only("routing.escape_intents", config.routing.escape_intents.join(",")),
        Field::file_only(
            "rate_limit.messages_per_minute",
            format!("{}/{}s", rate.messages_per_minute.limit, rate.messages_per_minute.window_secs),
        ),
        Field::file_only(
            "rate_limit.messages_per_hour",
            format!("{}/{}s", rate.messages_per_hour.limit, rate.messages_per_hour.window_secs),
        ),
        Field::new(
            "rate_limit.store_timeout_ms",
            "DIALROUTE_RATE_LIMIT_STORE_TIMEOUT_MS",
            rate.store_timeout_ms,
        ),
        Field::new(
            "rate_limit.purge_interval_secs",
            "DIALROUTE_RATE_LIMIT_PURGE_INTERVAL_SECS",
            rate.purge_interval_secs,
        ),
        Field::new(
            "business_hours.default_timezone",
            "DIALROUTE_BUSINESS_HOURS_DEFAULT_TIMEZONE",
            &config.business_hours.default_timezone,
        ),
        Field::file_only("business_hours.default_enabled", config.business_hours.default_enabled),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("dialroute.toml"), PathBuf::from("config/dialroute.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short provider prefix such as `sk-` and hides the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
