//! Top-level routing entry point: matcher chain first, hybrid analysis second,
//! then intent → node mapping with the authentication gate applied last.

use std::collections::HashMap;
use std::sync::Arc;

use dialroute_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, NoopAuditSink};
use dialroute_core::config::RoutingSettings;
use dialroute_core::domain::conversation::{ConversationState, OrganizationId};
use dialroute_core::domain::decision::{DecisionSource, RouteDecision};
use dialroute_core::domain::intent::{ExtractedEntities, IntentResult};
use dialroute_core::domain::routing::{RoutingConfigKind, RoutingConfigSet};
use dialroute_core::sources::{CachedRoutingConfigSource, RoutingConfigSource};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::HybridIntentAnalyzer;
use crate::fallback::AnalysisContext;
use crate::llm::LlmClient;
use crate::matchers::{MatchContext, MatcherChain, MatcherResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTarget {
    pub node: String,
    pub requires_auth: bool,
    pub clears_context: bool,
}

/// Intent → node lookup built from `intent_node_mapping` rules. The first rule
/// for an intent (by priority) wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeTable {
    targets: HashMap<String, NodeTarget>,
}

impl NodeTable {
    pub fn from_configs(configs: &RoutingConfigSet) -> Self {
        let mut targets = HashMap::new();
        for config in configs.of_kind(RoutingConfigKind::IntentNodeMapping) {
            let Some(node) = config.target_node.as_deref().filter(|node| !node.trim().is_empty())
            else {
                warn!(
                    event_name = "routing.resolver.mapping_without_node",
                    intent = %config.target_intent,
                    "intent_node_mapping rule has no target node; ignored"
                );
                continue;
            };
            targets.entry(config.target_intent.trim().to_string()).or_insert_with(|| NodeTarget {
                node: node.trim().to_string(),
                requires_auth: config.requires_auth,
                clears_context: config.clears_context,
            });
        }
        Self { targets }
    }

    pub fn get(&self, intent: &str) -> Option<&NodeTarget> {
        self.targets.get(intent.trim())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

struct CachedTable {
    built_from: Arc<RoutingConfigSet>,
    table: Arc<NodeTable>,
}

/// Rules for one message plus the node table derived from them.
struct Snapshot {
    configs: Arc<RoutingConfigSet>,
    table: Arc<NodeTable>,
    degraded: bool,
}

pub struct IntentRouteResolver {
    configs: CachedRoutingConfigSource<Arc<dyn RoutingConfigSource>>,
    chain: MatcherChain,
    analyzer: HybridIntentAnalyzer,
    settings: RoutingSettings,
    node_tables: RwLock<HashMap<(OrganizationId, String), CachedTable>>,
    audit: Arc<dyn AuditSink>,
}

impl IntentRouteResolver {
    pub fn new(
        source: Arc<dyn RoutingConfigSource>,
        chain: MatcherChain,
        analyzer: HybridIntentAnalyzer,
        settings: RoutingSettings,
    ) -> Self {
        Self {
            configs: CachedRoutingConfigSource::new(source, settings.config_cache_ttl()),
            chain,
            analyzer,
            settings,
            node_tables: RwLock::new(HashMap::new()),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Default matcher chain and analyzer wired from configuration.
    pub fn from_settings(
        settings: RoutingSettings,
        source: Arc<dyn RoutingConfigSource>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let analyzer = HybridIntentAnalyzer::from_settings(&settings, llm);
        let chain =
            MatcherChain::with_defaults(settings.escape_intents.clone(), *analyzer.extractor());
        Self::new(source, chain, analyzer, settings)
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    pub fn chain(&self) -> &MatcherChain {
        &self.chain
    }

    pub fn analyzer(&self) -> &HybridIntentAnalyzer {
        &self.analyzer
    }

    pub async fn route(&self, message: &str, state: &ConversationState) -> RouteDecision {
        let audit = AuditContext::new(
            state.organization(),
            None,
            Uuid::new_v4().to_string(),
            "router",
        );
        self.route_with_context(message, state, &audit).await
    }

    pub async fn route_with_context(
        &self,
        message: &str,
        state: &ConversationState,
        audit: &AuditContext,
    ) -> RouteDecision {
        let snapshot = self.snapshot(state.organization()).await;
        let context = MatchContext::new(
            message,
            state.clone(),
            self.settings.domain.clone(),
            Arc::clone(&snapshot.configs),
            Arc::clone(self.configs.inner()),
        );

        let decision = match self.chain.evaluate(&context).await {
            Some(hit) => self.decide_from_match(hit, state, &snapshot.table),
            None => {
                let result = self.analyze(message, state).await;
                self.decide_from_analysis(result, state, &snapshot.table)
            }
        };

        self.record(&decision, audit, snapshot.degraded);
        decision
    }

    /// Classification and mapping only, for messages the matcher chain did not resolve.
    pub async fn resolve_intent(&self, message: &str, state: &ConversationState) -> RouteDecision {
        let snapshot = self.snapshot(state.organization()).await;
        let result = self.analyze(message, state).await;
        self.decide_from_analysis(result, state, &snapshot.table)
    }

    /// Drops cached rules and node tables for one organization.
    pub async fn invalidate(&self, organization_id: &OrganizationId) {
        self.configs.invalidate(organization_id).await;
        self.node_tables.write().await.retain(|(org, _), _| org != organization_id);
    }

    async fn analyze(&self, message: &str, state: &ConversationState) -> IntentResult {
        let context = AnalysisContext::from_state(state, self.settings.recent_turns);
        self.analyzer.analyze(message, &context).await
    }

    async fn snapshot(&self, organization_id: Option<OrganizationId>) -> Snapshot {
        let Some(organization_id) = organization_id else {
            return Snapshot {
                configs: Arc::new(RoutingConfigSet::default()),
                table: Arc::new(NodeTable::default()),
                degraded: false,
            };
        };

        let domain = self.settings.domain.as_str();
        let configs = match self.configs.snapshot(&organization_id, domain).await {
            Ok(configs) => configs,
            Err(error) => {
                warn!(
                    event_name = "routing.resolver.config_unavailable",
                    organization_id = %organization_id,
                    domain = domain,
                    error = %error,
                    "routing config unavailable; routing with fallback decisions only"
                );
                return Snapshot {
                    configs: Arc::new(RoutingConfigSet::default()),
                    table: Arc::new(NodeTable::default()),
                    degraded: true,
                };
            }
        };

        let key = (organization_id, domain.to_string());
        if let Some(cached) = self.node_tables.read().await.get(&key) {
            if Arc::ptr_eq(&cached.built_from, &configs) {
                return Snapshot {
                    configs,
                    table: Arc::clone(&cached.table),
                    degraded: false,
                };
            }
        }

        let table = Arc::new(NodeTable::from_configs(&configs));
        self.node_tables.write().await.insert(
            key,
            CachedTable { built_from: Arc::clone(&configs), table: Arc::clone(&table) },
        );
        Snapshot { configs, table, degraded: false }
    }

    fn decide_from_match(
        &self,
        hit: MatcherResult,
        state: &ConversationState,
        table: &NodeTable,
    ) -> RouteDecision {
        let mapped = table.get(&hit.handler);
        let target = hit
            .next_node()
            .map(|node| NodeTarget {
                node: node.to_string(),
                requires_auth: hit.requires_auth() || mapped.is_some_and(|target| target.requires_auth),
                clears_context: mapped.is_some_and(|target| target.clears_context),
            })
            .or_else(|| mapped.cloned());
        let entities = hit.entities();

        self.decide(
            hit.handler.clone(),
            target,
            hit.clears_awaiting(),
            entities,
            DecisionSource::Matcher { match_type: hit.match_type },
            state,
        )
    }

    fn decide_from_analysis(
        &self,
        result: IntentResult,
        state: &ConversationState,
        table: &NodeTable,
    ) -> RouteDecision {
        let target = if result.is_unknown() || result.out_of_scope {
            None
        } else {
            table.get(result.intent.as_str()).cloned()
        };
        let entities = (!result.entities.is_empty()).then(|| result.entities.clone());

        self.decide(
            result.intent.as_str().to_string(),
            target,
            false,
            entities,
            DecisionSource::Analyzer { method: result.method },
            state,
        )
    }

    fn decide(
        &self,
        intent: String,
        target: Option<NodeTarget>,
        clear_awaiting: bool,
        entities: Option<ExtractedEntities>,
        source: DecisionSource,
        state: &ConversationState,
    ) -> RouteDecision {
        let previous_intent = state.current_intent.clone();

        let Some(target) = target else {
            let next_node = if state.is_authenticated {
                self.settings.main_menu_node.clone()
            } else {
                self.settings.auth_entry_node.clone()
            };
            return RouteDecision {
                intent,
                previous_intent,
                next_node,
                clear_awaiting: clear_awaiting || state.awaiting_marker().is_some(),
                entities,
                source,
                auth_redirected: false,
            };
        };

        let auth_redirected = target.requires_auth && !state.is_authenticated;
        let next_node =
            if auth_redirected { self.settings.auth_entry_node.clone() } else { target.node };

        RouteDecision {
            intent,
            previous_intent,
            next_node,
            clear_awaiting: clear_awaiting || target.clears_context,
            entities,
            source,
            auth_redirected,
        }
    }

    fn record(&self, decision: &RouteDecision, audit: &AuditContext, degraded: bool) {
        let stage = match decision.source {
            DecisionSource::Matcher { match_type } => match_type.as_str(),
            DecisionSource::Analyzer { method } => method.as_str(),
        };
        info!(
            event_name = "routing.decision",
            correlation_id = %audit.correlation_id,
            intent = %decision.intent,
            next_node = %decision.next_node,
            stage = stage,
            auth_redirected = decision.auth_redirected,
            degraded = degraded,
            "message routed"
        );

        let outcome = if degraded { AuditOutcome::Degraded } else { AuditOutcome::Success };
        self.audit.emit(
            audit
                .event("routing.decision", AuditCategory::Routing, outcome)
                .with_metadata("intent", decision.intent.clone())
                .with_metadata("next_node", decision.next_node.clone())
                .with_metadata("stage", stage)
                .with_metadata("auth_redirected", decision.auth_redirected.to_string()),
        );
    }
}
