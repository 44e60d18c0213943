//! Ordered, short-circuiting matcher chain evaluated before intent analysis.
//!
//! Every matcher answers one question about a [`MatchContext`] and returns
//! `None` when it has nothing to say. The chain runs matchers by ascending
//! priority and stops at the first hit.

mod awaiting;
mod button;
mod keyword;
mod list_item;
mod menu;

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use dialroute_core::domain::conversation::{ConversationState, OrganizationId};
use dialroute_core::domain::decision::MatchType;
use dialroute_core::domain::intent::ExtractedEntities;
use dialroute_core::domain::routing::{RoutingConfig, RoutingConfigSet};
use dialroute_core::sources::RoutingConfigSource;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::extraction::EntityExtractor;

pub use awaiting::AwaitingInputMatcher;
pub use button::ButtonMappingMatcher;
pub use keyword::GlobalKeywordMatcher;
pub use list_item::{KnownListItem, KnownListItemMatcher, KNOWN_LIST_ITEMS, LIST_FOLLOWUP};
pub use menu::{normalize_menu_digit, MenuOptionMatcher};

/// Snapshot of one inbound message. Built once per message and never mutated.
#[derive(Clone)]
pub struct MatchContext {
    pub message: String,
    /// Trimmed and lower-cased message.
    pub normalized: String,
    pub state: ConversationState,
    pub organization_id: Option<OrganizationId>,
    pub domain: String,
    pub configs: Arc<RoutingConfigSet>,
    pub source: Arc<dyn RoutingConfigSource>,
}

impl MatchContext {
    pub fn new(
        message: impl Into<String>,
        state: ConversationState,
        domain: impl Into<String>,
        configs: Arc<RoutingConfigSet>,
        source: Arc<dyn RoutingConfigSource>,
    ) -> Self {
        let message = message.into();
        let normalized = message.trim().to_lowercase();
        let organization_id = state.organization();
        Self {
            message,
            normalized,
            state,
            organization_id,
            domain: domain.into(),
            configs,
            source,
        }
    }

    pub fn awaiting(&self) -> Option<&str> {
        self.state.awaiting_marker()
    }
}

pub const META_NEXT_NODE: &str = "next_node";
pub const META_CLEAR_AWAITING: &str = "clear_awaiting";
pub const META_AMOUNT: &str = "amount";
pub const META_MATCHED_VALUE: &str = "matched_value";
pub const META_DOCUMENT_ID: &str = "document_id";
pub const META_AWAITING_TYPE: &str = "awaiting_type";

#[derive(Clone, Debug, PartialEq)]
pub struct MatcherResult {
    pub match_type: MatchType,
    /// Intent or handler key the caller should dispatch to.
    pub handler: String,
    pub config: Option<RoutingConfig>,
    pub metadata: BTreeMap<String, Value>,
}

impl MatcherResult {
    pub fn new(match_type: MatchType, handler: impl Into<String>) -> Self {
        Self { match_type, handler: handler.into(), config: None, metadata: BTreeMap::new() }
    }

    pub fn with_config(mut self, config: RoutingConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Explicit next node, falling back to the matched rule's target node.
    pub fn next_node(&self) -> Option<&str> {
        self.metadata
            .get(META_NEXT_NODE)
            .and_then(Value::as_str)
            .or_else(|| self.config.as_ref().and_then(|config| config.target_node.as_deref()))
    }

    pub fn clears_awaiting(&self) -> bool {
        self.metadata.get(META_CLEAR_AWAITING).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.metadata
            .get(META_AMOUNT)
            .and_then(Value::as_str)
            .and_then(|raw| Decimal::from_str(raw).ok())
    }

    /// Values the matcher pulled out of the reply, as decision entities.
    pub fn entities(&self) -> Option<ExtractedEntities> {
        let mut entities = ExtractedEntities {
            amount: self.amount(),
            document_id: self
                .metadata
                .get(META_DOCUMENT_ID)
                .and_then(Value::as_str)
                .map(str::to_string),
            ..ExtractedEntities::default()
        };
        if self.match_type == MatchType::AwaitingInput {
            for key in [META_MATCHED_VALUE, META_AWAITING_TYPE] {
                if let Some(value) = self.metadata.get(key) {
                    entities.extra.insert(key.to_string(), value.clone());
                }
            }
        }
        (!entities.is_empty()).then_some(entities)
    }

    pub fn requires_auth(&self) -> bool {
        self.config.as_ref().is_some_and(|config| config.requires_auth)
    }
}

#[async_trait]
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower values run first.
    fn priority(&self) -> i32;

    async fn matches(&self, context: &MatchContext) -> Option<MatcherResult>;
}

pub struct MatcherChain {
    matchers: Vec<Box<dyn Matcher>>,
}

impl MatcherChain {
    /// Orders matchers by ascending priority; equal priorities keep insertion order.
    pub fn new(mut matchers: Vec<Box<dyn Matcher>>) -> Self {
        matchers.sort_by_key(|matcher| matcher.priority());
        Self { matchers }
    }

    pub fn with_defaults(escape_intents: Vec<String>, extractor: EntityExtractor) -> Self {
        Self::new(vec![
            Box::new(AwaitingInputMatcher::new(extractor)),
            Box::new(MenuOptionMatcher),
            Box::new(KnownListItemMatcher),
            Box::new(ButtonMappingMatcher),
            Box::new(GlobalKeywordMatcher::new(escape_intents)),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|matcher| matcher.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub async fn evaluate(&self, context: &MatchContext) -> Option<MatcherResult> {
        for matcher in &self.matchers {
            if let Some(result) = matcher.matches(context).await {
                debug!(
                    event_name = "routing.matcher.hit",
                    matcher = matcher.name(),
                    priority = matcher.priority(),
                    match_type = result.match_type.as_str(),
                    handler = %result.handler,
                    "matcher chain resolved message"
                );
                return Some(result);
            }
        }
        None
    }
}
