pub mod audit;
pub mod availability;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ratelimit;
pub mod sources;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use availability::{BusinessHoursEvaluator, BusinessHoursResult, ScheduleRecord};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::conversation::{ConversationState, ConversationTurn, DebtStatus, OrganizationId};
pub use domain::decision::{DecisionSource, MatchType, RouteDecision};
pub use domain::intent::{ClassificationMethod, ExtractedEntities, Intent, IntentResult};
pub use domain::routing::{AwaitingTypeConfig, RoutingConfig, RoutingConfigKind, RoutingConfigSet};
pub use errors::{
    ApplicationError, DomainError, InterfaceError, ModelError, SourceError, StoreError,
};
pub use ratelimit::{
    spawn_purge_task, CounterStore, InMemoryCounterStore, RateLimitConfig, RateLimitResult,
    RateLimitRule, RateLimitType, RateLimiter,
};
pub use sources::{CachedRoutingConfigSource, RoutingConfigSource, ScheduleSource};
