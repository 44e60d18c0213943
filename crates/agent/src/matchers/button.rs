use async_trait::async_trait;
use dialroute_core::domain::decision::MatchType;
use dialroute_core::domain::routing::RoutingConfigKind;

use super::{MatchContext, Matcher, MatcherResult, META_CLEAR_AWAITING, META_MATCHED_VALUE};

/// Interactive button payloads. Trigger ids compare exactly; the visible
/// button texts stored as `text_alias`/`text_aliases` compare case-insensitively.
pub struct ButtonMappingMatcher;

#[async_trait]
impl Matcher for ButtonMappingMatcher {
    fn name(&self) -> &'static str {
        "button_mapping"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn matches(&self, context: &MatchContext) -> Option<MatcherResult> {
        let raw = context.message.trim();
        if raw.is_empty() {
            return None;
        }

        let buttons = context.configs.of_kind(RoutingConfigKind::ButtonMapping);
        let hit = buttons.iter().find(|config| config.trigger_value == raw).or_else(|| {
            buttons.iter().find(|config| {
                config
                    .text_aliases()
                    .iter()
                    .any(|alias| alias.trim().to_lowercase() == context.normalized)
            })
        })?;

        Some(
            MatcherResult::new(MatchType::ButtonMapping, hit.target_intent.clone())
                .with_metadata(META_CLEAR_AWAITING, hit.clears_context)
                .with_metadata(META_MATCHED_VALUE, raw)
                .with_config(hit.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use dialroute_core::domain::conversation::ConversationState;
    use dialroute_core::domain::routing::{RoutingConfig, RoutingConfigKind};
    use serde_json::json;

    use super::ButtonMappingMatcher;
    use crate::matchers::test_support::{context, StaticSource};
    use crate::matchers::Matcher;

    fn source() -> StaticSource {
        StaticSource {
            configs: vec![
                RoutingConfig::new(RoutingConfigKind::ButtonMapping, "btn_pay_link", "payment_link")
                    .with_node("payment_link_manager")
                    .with_metadata("text_alias", json!("Link de pago")),
                RoutingConfig::new(RoutingConfigKind::ButtonMapping, "btn_advisor", "request_advisor")
                    .with_metadata("text_aliases", json!(["Hablar con asesor", "Asesor"])),
            ],
            ..StaticSource::default()
        }
    }

    #[tokio::test]
    async fn trigger_id_is_case_sensitive() {
        let hit = ButtonMappingMatcher
            .matches(&context("btn_pay_link", ConversationState::default(), source()))
            .await
            .expect("payload matches");
        assert_eq!(hit.handler, "payment_link");
        assert_eq!(hit.next_node(), Some("payment_link_manager"));

        let miss = ButtonMappingMatcher
            .matches(&context("BTN_PAY_LINK", ConversationState::default(), source()))
            .await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn text_aliases_ignore_case() {
        for message in ["link de pago", "HABLAR CON ASESOR", " asesor "] {
            let hit = ButtonMappingMatcher
                .matches(&context(message, ConversationState::default(), source()))
                .await;
            assert!(hit.is_some(), "{message} should match");
        }
        let partial = ButtonMappingMatcher
            .matches(&context("quiero un link de pago", ConversationState::default(), source()))
            .await;
        assert!(partial.is_none());
    }
}
