use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dialroute_agent::{
    DisabledLlmClient, EntryGuard, InboundMessage, IntentRouteResolver, MatchContext, Matcher,
    MatcherChain, MessageOutcome, RoutingRuntime,
};
use dialroute_agent::matchers::GlobalKeywordMatcher;
use dialroute_core::audit::InMemoryAuditSink;
use dialroute_core::availability::{BusinessHoursEvaluator, ScheduleRecord, DEFAULT_TIMEZONE};
use dialroute_core::config::RoutingSettings;
use dialroute_core::domain::conversation::{ConversationState, OrganizationId};
use dialroute_core::domain::decision::{DecisionSource, MatchType};
use dialroute_core::domain::intent::ClassificationMethod;
use dialroute_core::domain::routing::{
    AwaitingTypeConfig, RoutingConfig, RoutingConfigKind, RoutingConfigSet,
};
use dialroute_core::errors::SourceError;
use dialroute_core::ratelimit::{InMemoryCounterStore, RateLimitConfig, RateLimiter};
use dialroute_core::sources::{RoutingConfigSource, ScheduleSource};
use rust_decimal::Decimal;
use serde_json::json;

struct Rules {
    configs: Vec<RoutingConfig>,
    awaiting: HashMap<String, AwaitingTypeConfig>,
}

#[async_trait]
impl RoutingConfigSource for Rules {
    async fn get_configs(
        &self,
        _organization_id: &OrganizationId,
        _domain: &str,
    ) -> Result<RoutingConfigSet, SourceError> {
        Ok(RoutingConfigSet::new(self.configs.clone()))
    }

    async fn get_awaiting_config(
        &self,
        awaiting_type: &str,
    ) -> Result<Option<AwaitingTypeConfig>, SourceError> {
        Ok(self.awaiting.get(awaiting_type).cloned())
    }
}

fn rules() -> Rules {
    let configs = vec![
        RoutingConfig::new(RoutingConfigKind::MenuOption, "1", "debt_query").with_node("debt_manager"),
        RoutingConfig::new(RoutingConfigKind::MenuOption, "2", "payment_link")
            .with_node("payment_link_manager"),
        RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "menu", "show_menu")
            .with_node("main_menu")
            .with_metadata("aliases", json!(["inicio"])),
        RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "otra cuenta", "change_account")
            .with_node("account_selector"),
        RoutingConfig::new(RoutingConfigKind::ButtonMapping, "btn_agreement", "payment_agreement")
            .with_node("agreement_manager")
            .requiring_auth(),
        RoutingConfig::new(RoutingConfigKind::IntentNodeMapping, "", "debt_query")
            .with_node("debt_manager")
            .requiring_auth(),
        RoutingConfig::new(RoutingConfigKind::IntentNodeMapping, "", "payment_intent")
            .with_node("payment_manager")
            .requiring_auth(),
        RoutingConfig::new(RoutingConfigKind::IntentNodeMapping, "", "greeting")
            .with_node("greeting"),
    ];
    let awaiting = HashMap::from([
        (
            "dni".to_string(),
            AwaitingTypeConfig {
                awaiting_type: "dni".to_string(),
                target_node: "authentication".to_string(),
                valid_response_intents: Vec::new(),
                validation_pattern: Some(r"\d{7,8}$".to_string()),
                priority: 0,
            },
        ),
        (
            "confirmation".to_string(),
            AwaitingTypeConfig {
                awaiting_type: "confirmation".to_string(),
                target_node: "confirmation_handler".to_string(),
                valid_response_intents: Vec::new(),
                validation_pattern: Some(r"(?i)(s[ií]|no|claro|dale|ok)\b".to_string()),
                priority: 0,
            },
        ),
    ]);
    Rules { configs, awaiting }
}

fn resolver() -> IntentRouteResolver {
    IntentRouteResolver::from_settings(
        RoutingSettings::default(),
        Arc::new(rules()),
        Arc::new(DisabledLlmClient),
    )
}

fn state(awaiting: Option<&str>, authenticated: bool) -> ConversationState {
    ConversationState {
        awaiting: awaiting.map(str::to_string),
        is_authenticated: authenticated,
        organization_id: Some("42".to_string()),
        ..ConversationState::default()
    }
}

#[tokio::test]
async fn menu_digit_routes_to_configured_node() {
    let decision = resolver().route("1", &state(Some("menu_selection"), true)).await;

    assert_eq!(decision.next_node, "debt_manager");
    assert_eq!(decision.intent, "debt_query");
    assert!(decision.clear_awaiting);
    assert_eq!(decision.source, DecisionSource::Matcher { match_type: MatchType::MenuOption });
}

#[tokio::test]
async fn payment_message_extracts_amount_deterministically() {
    let decision = resolver().route("quiero pagar 15 mil pesos", &state(None, true)).await;

    assert_eq!(decision.intent, "payment_intent");
    assert_eq!(decision.next_node, "payment_manager");
    let entities = decision.entities.expect("amount extracted");
    assert_eq!(entities.amount, Some(Decimal::from(15_000)));
    match decision.source {
        DecisionSource::Analyzer { method } => assert_ne!(method, ClassificationMethod::KeywordFallback),
        other => panic!("expected analyzer decision, got {other:?}"),
    }
}

#[tokio::test]
async fn only_escape_keywords_interrupt_pending_input() {
    let source: Arc<dyn RoutingConfigSource> = Arc::new(rules());
    let configs = Arc::new(source.get_configs(&OrganizationId(42), "collections").await.expect("rules"));
    let matcher = GlobalKeywordMatcher::new(RoutingSettings::default().escape_intents);

    let menu = MatchContext::new("menu", state(Some("dni"), false), "collections", configs.clone(), source.clone());
    let hit = matcher.matches(&menu).await.expect("show_menu escapes");
    assert_eq!(hit.handler, "show_menu");

    let other = MatchContext::new("otra cuenta", state(Some("dni"), false), "collections", configs, source);
    assert!(matcher.matches(&other).await.is_none());

    let decision = resolver().route("menu", &state(Some("dni"), false)).await;
    assert_eq!(decision.next_node, "main_menu");
    assert!(decision.clear_awaiting);
}

#[tokio::test]
async fn auth_required_targets_always_redirect_anonymous_users() {
    let resolver = resolver();
    for (message, awaiting) in [
        ("1", Some("menu_selection")),
        ("btn_agreement", None),
        ("cuanto debo", None),
        ("quiero pagar 15 mil pesos", None),
    ] {
        let decision = resolver.route(message, &state(awaiting, false)).await;
        assert_eq!(decision.next_node, "authentication", "{message}");
        assert!(decision.auth_redirected, "{message}");
    }

    let open = resolver.route("hola", &state(None, false)).await;
    assert_eq!(open.next_node, "greeting");
    assert!(!open.auth_redirected);
}

#[tokio::test]
async fn awaiting_reply_beats_every_other_matcher() {
    let decision = resolver().route("10203040", &state(Some("dni"), false)).await;
    assert_eq!(decision.source, DecisionSource::Matcher { match_type: MatchType::AwaitingInput });
    assert_eq!(decision.next_node, "authentication");
    assert!(decision.clear_awaiting);
}

#[tokio::test]
async fn validated_replies_reach_the_decision() {
    let resolver = resolver();

    let dni = resolver.route("10203040", &state(Some("dni"), false)).await;
    let entities = dni.entities.expect("document number carried");
    assert_eq!(entities.document_id.as_deref(), Some("10203040"));
    assert_eq!(entities.extra.get("awaiting_type"), Some(&json!("dni")));

    let mut pending = state(Some("confirmation"), true);
    pending.current_intent = Some("payment_link".to_string());
    let yes = resolver.route("si", &pending).await;
    let no = resolver.route("no", &pending).await;

    assert_eq!(yes.intent, "confirm");
    assert_eq!(no.intent, "reject");
    assert_eq!(yes.previous_intent.as_deref(), Some("payment_link"));
    assert_eq!(yes.next_node, "confirmation_handler");
    assert_eq!(no.next_node, "confirmation_handler");
    assert_ne!(
        yes.entities.and_then(|e| e.extra.get("matched_value").cloned()),
        no.entities.and_then(|e| e.extra.get("matched_value").cloned())
    );
}

#[tokio::test]
async fn default_chain_short_circuits_on_first_hit() {
    let chain = MatcherChain::with_defaults(
        RoutingSettings::default().escape_intents,
        Default::default(),
    );
    let source: Arc<dyn RoutingConfigSource> = Arc::new(Rules {
        configs: vec![
            RoutingConfig::new(RoutingConfigKind::MenuOption, "2", "payment_link"),
            RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "2", "farewell"),
        ],
        awaiting: HashMap::new(),
    });
    let configs = Arc::new(source.get_configs(&OrganizationId(42), "collections").await.expect("rules"));

    let context = MatchContext::new("2", state(Some("menu_selection"), true), "collections", configs, source);
    let hit = chain.evaluate(&context).await.expect("menu option hits");
    assert_eq!(hit.match_type, MatchType::MenuOption);
    assert_eq!(hit.handler, "payment_link");
}

struct AlwaysOpen;

#[async_trait]
impl ScheduleSource for AlwaysOpen {
    async fn get_schedule(&self, _entity_id: &str) -> Result<Option<ScheduleRecord>, SourceError> {
        let hours = ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"]
            .into_iter()
            .map(|day| (day.to_string(), Some("00:00-00:00".to_string())))
            .collect::<BTreeMap<_, _>>();
        Ok(Some(ScheduleRecord { enabled: true, hours, emergency_contact: None, timezone: None }))
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 12, 17, 0, 0).single().expect("valid instant")
}

#[tokio::test]
async fn runtime_routes_then_rate_limits() {
    let sink = InMemoryAuditSink::default();
    let config = RateLimitConfig {
        messages_per_minute: dialroute_core::ratelimit::RateLimitRule::new(2, 60),
        ..RateLimitConfig::default()
    };
    let runtime = RoutingRuntime::new(
        EntryGuard::new(
            RateLimiter::new(InMemoryCounterStore::default(), config),
            BusinessHoursEvaluator::new(AlwaysOpen, DEFAULT_TIMEZONE, Duration::from_millis(200)),
        ),
        resolver().with_audit_sink(Arc::new(sink.clone())),
    );
    let inbound = InboundMessage {
        identity: "+573001112233".to_string(),
        entity_id: "entity-1".to_string(),
        message: "1".to_string(),
        state: state(Some("menu_selection"), true),
    };

    for _ in 0..2 {
        let outcome = runtime.handle_message_at(&inbound, noon()).await;
        assert_eq!(outcome.decision().map(|decision| decision.next_node.as_str()), Some("debt_manager"));
    }
    let limited = runtime.handle_message_at(&inbound, noon()).await;
    assert!(matches!(limited, MessageOutcome::RateLimited { .. }));

    let serialized = serde_json::to_value(&limited).expect("serializable");
    assert_eq!(serialized["outcome"], "rate_limited");
    assert_eq!(sink.events_of_type("routing.decision").len(), 2);
}
