use chrono::{DateTime, Utc};
use dialroute_core::audit::AuditContext;
use dialroute_core::availability::BusinessHoursResult;
use dialroute_core::domain::conversation::ConversationState;
use dialroute_core::domain::decision::RouteDecision;
use dialroute_core::ratelimit::{CounterStore, RateLimitResult};
use dialroute_core::sources::ScheduleSource;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::guardrails::{DenyReason, EntryDecision, EntryGuard};
use crate::resolver::IntentRouteResolver;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender identity the quotas are keyed on, usually a phone number.
    pub identity: String,
    /// Entity whose schedule governs business hours.
    pub entity_id: String,
    pub message: String,
    #[serde(default)]
    pub state: ConversationState,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    Routed {
        correlation_id: String,
        decision: RouteDecision,
        degraded: bool,
    },
    RateLimited {
        correlation_id: String,
        user_message: String,
        retry_after_secs: Option<u64>,
        rate_limit: RateLimitResult,
    },
    OutOfHours {
        correlation_id: String,
        user_message: String,
        business_hours: BusinessHoursResult,
    },
}

impl MessageOutcome {
    pub fn decision(&self) -> Option<&RouteDecision> {
        match self {
            Self::Routed { decision, .. } => Some(decision),
            _ => None,
        }
    }
}

/// Entry gates followed by routing, for one inbound message at a time.
pub struct RoutingRuntime<C, S> {
    guard: EntryGuard<C, S>,
    resolver: IntentRouteResolver,
}

impl<C, S> RoutingRuntime<C, S>
where
    C: CounterStore,
    S: ScheduleSource,
{
    pub fn new(guard: EntryGuard<C, S>, resolver: IntentRouteResolver) -> Self {
        Self { guard, resolver }
    }

    pub fn guard(&self) -> &EntryGuard<C, S> {
        &self.guard
    }

    pub fn resolver(&self) -> &IntentRouteResolver {
        &self.resolver
    }

    pub async fn handle_message(&self, inbound: &InboundMessage) -> MessageOutcome {
        self.handle_message_at(inbound, Utc::now()).await
    }

    pub async fn handle_message_at(
        &self,
        inbound: &InboundMessage,
        now: DateTime<Utc>,
    ) -> MessageOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        let check = self.guard.check_at(&inbound.identity, &inbound.entity_id, now).await;

        match check.decision {
            EntryDecision::Deny {
                reason_code: DenyReason::RateLimited,
                user_message,
                retry_after_secs,
                ..
            } => {
                MessageOutcome::RateLimited {
                    correlation_id,
                    user_message,
                    retry_after_secs,
                    rate_limit: check.rate_limit,
                }
            }
            EntryDecision::Deny { reason_code: DenyReason::OutOfHours, user_message, .. } => {
                MessageOutcome::OutOfHours {
                    correlation_id,
                    user_message,
                    business_hours: check.business_hours,
                }
            }
            EntryDecision::Allow { degraded } => {
                let audit = AuditContext::new(
                    inbound.state.organization(),
                    Some(inbound.identity.clone()),
                    correlation_id.clone(),
                    "runtime",
                );
                let decision =
                    self.resolver.route_with_context(&inbound.message, &inbound.state, &audit).await;
                debug!(
                    event_name = "routing.runtime.routed",
                    correlation_id = %correlation_id,
                    next_node = %decision.next_node,
                    degraded = degraded,
                    "inbound message routed"
                );
                MessageOutcome::Routed { correlation_id, decision, degraded }
            }
        }
    }
}
