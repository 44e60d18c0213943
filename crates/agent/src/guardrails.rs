use chrono::{DateTime, Utc};
use dialroute_core::availability::{BusinessHoursEvaluator, BusinessHoursResult};
use dialroute_core::ratelimit::{CounterStore, RateLimitResult, RateLimiter};
use dialroute_core::sources::ScheduleSource;
use serde::Serialize;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    RateLimited,
    OutOfHours,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::OutOfHours => "out_of_hours",
        }
    }

    pub fn fallback_path(&self) -> &'static str {
        match self {
            Self::RateLimited => "entry.rate_limited",
            Self::OutOfHours => "entry.out_of_hours",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EntryDecision {
    Allow {
        /// A gate could not reach its backing store and let the message through.
        degraded: bool,
    },
    Deny {
        reason_code: DenyReason,
        user_message: String,
        fallback_path: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
}

impl EntryDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Outcome of both entry gates for one inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryCheck {
    pub decision: EntryDecision,
    pub rate_limit: RateLimitResult,
    pub business_hours: BusinessHoursResult,
}

/// Rate limiting and business hours, evaluated independently of routing and of
/// each other. Both gates fail open, so a denial only ever comes from a
/// positive answer by the backing store.
pub struct EntryGuard<C, S> {
    limiter: RateLimiter<C>,
    hours: BusinessHoursEvaluator<S>,
}

impl<C, S> EntryGuard<C, S>
where
    C: CounterStore,
    S: ScheduleSource,
{
    pub fn new(limiter: RateLimiter<C>, hours: BusinessHoursEvaluator<S>) -> Self {
        Self { limiter, hours }
    }

    pub fn limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }

    pub fn hours(&self) -> &BusinessHoursEvaluator<S> {
        &self.hours
    }

    pub async fn check(&self, identity: &str, entity_id: &str) -> EntryCheck {
        self.check_at(identity, entity_id, Utc::now()).await
    }

    pub async fn check_at(&self, identity: &str, entity_id: &str, now: DateTime<Utc>) -> EntryCheck {
        let (rate_limit, business_hours) = tokio::join!(
            self.limiter.check_message(identity),
            self.hours.evaluate_at(entity_id, now)
        );

        let decision = if !rate_limit.allowed {
            let retry_after = rate_limit
                .retry_after_secs
                .unwrap_or_else(|| self.limiter.config().rule(rate_limit.limit_type).window_secs);
            EntryDecision::Deny {
                reason_code: DenyReason::RateLimited,
                user_message: format!(
                    "Has enviado muchos mensajes en poco tiempo. Intenta de nuevo en {} segundos.",
                    retry_after
                ),
                fallback_path: DenyReason::RateLimited.fallback_path(),
                retry_after_secs: rate_limit.retry_after_secs,
            }
        } else if !business_hours.is_open {
            EntryDecision::Deny {
                reason_code: DenyReason::OutOfHours,
                user_message: business_hours.reopen_message().unwrap_or_else(|| {
                    "En este momento estamos fuera de nuestro horario de atención.".to_string()
                }),
                fallback_path: DenyReason::OutOfHours.fallback_path(),
                retry_after_secs: None,
            }
        } else {
            EntryDecision::Allow { degraded: rate_limit.degraded || business_hours.degraded }
        };

        if let EntryDecision::Deny { reason_code, .. } = &decision {
            info!(
                event_name = "gate.entry.denied",
                identity = identity,
                entity_id = entity_id,
                reason_code = reason_code.as_str(),
                "inbound message stopped at entry gate"
            );
        }

        EntryCheck { decision, rate_limit, business_hours }
    }
}
