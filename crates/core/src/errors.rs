use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid routing rule `{trigger}`: {reason}")]
    InvalidRoutingRule { trigger: String, reason: String },
    #[error("invalid schedule range `{value}` for {day}")]
    InvalidScheduleRange { day: String, value: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure reported by a routing-config or schedule source.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source returned malformed data: {0}")]
    Malformed(String),
}

/// Failure reported by the counter store backing the rate limiter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("counter store returned malformed response: {0}")]
    Malformed(String),
}

/// Failure reported by the generative model client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("model transport failure: {0}")]
    Transport(String),
    #[error("model responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned an empty completion")]
    EmptyResponse,
    #[error("generative fallback is disabled")]
    Disabled,
}

impl ModelError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::EmptyResponse => "empty_response",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Source(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Store(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Model(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
