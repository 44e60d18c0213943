pub mod classify;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;
pub mod start;

use std::future::Future;

use dialroute_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Failure of one command step: error class, message and process exit code.
pub(crate) type StepError = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command,
            status: "ok",
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    pub(crate) fn from_step(command: &str, error: StepError) -> Self {
        let (error_class, message, exit_code) = error;
        Self::failure(command, error_class, message, exit_code)
    }
}

/// Loads configuration the way every command does; failures exit with code 2.
pub(crate) fn load_config() -> Result<AppConfig, StepError> {
    AppConfig::load(LoadOptions::default())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

/// Runs one async command body on a fresh current-thread runtime; failures exit with code 3.
pub(crate) fn block_on<F, T>(future: F) -> Result<T, StepError>
where
    F: Future<Output = Result<T, StepError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| ("runtime_init", format!("failed to initialize async runtime: {error}"), 3),
    )?;
    runtime.block_on(future)
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
