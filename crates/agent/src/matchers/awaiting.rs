use async_trait::async_trait;
use dialroute_core::domain::decision::MatchType;
use dialroute_core::domain::intent::Intent;
use dialroute_core::domain::routing::AwaitingTypeConfig;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::warn;

use super::keyword::find_keyword;
use super::{
    MatchContext, Matcher, MatcherResult, META_AMOUNT, META_AWAITING_TYPE, META_CLEAR_AWAITING,
    META_DOCUMENT_ID, META_MATCHED_VALUE, META_NEXT_NODE,
};
use crate::classifier::{default_catalog, DeterministicClassifier, LEMMA_WEIGHT};
use crate::extraction::{extract_document_id, EntityExtractor};

/// Validates the reply to a pending structured question (an amount, a
/// document number, a choice among a few intents).
pub struct AwaitingInputMatcher {
    extractor: EntityExtractor,
    polarity: DeterministicClassifier,
}

impl AwaitingInputMatcher {
    pub fn new(extractor: EntityExtractor) -> Self {
        let patterns = default_catalog()
            .into_iter()
            .filter(|pattern| matches!(pattern.intent, Intent::Confirm | Intent::Reject))
            .collect();
        Self { extractor, polarity: DeterministicClassifier::new(patterns, LEMMA_WEIGHT) }
    }

    /// `confirm` or `reject` when a pattern-validated reply says yes or no.
    fn reply_polarity(&self, message: &str) -> Option<Intent> {
        let result = self.polarity.classify(message);
        matches!(result.intent, Intent::Confirm | Intent::Reject).then_some(result.intent)
    }

    fn matched(
        &self,
        context: &MatchContext,
        awaiting: &AwaitingTypeConfig,
        handler: String,
    ) -> MatcherResult {
        MatcherResult::new(MatchType::AwaitingInput, handler)
            .with_metadata(META_NEXT_NODE, awaiting.target_node.clone())
            .with_metadata(META_CLEAR_AWAITING, true)
            .with_metadata(META_AWAITING_TYPE, awaiting.awaiting_type.clone())
            .with_metadata(META_MATCHED_VALUE, context.message.trim())
    }

    fn default_handler(context: &MatchContext, awaiting: &AwaitingTypeConfig) -> String {
        context
            .state
            .current_intent
            .clone()
            .filter(|intent| !intent.trim().is_empty())
            .unwrap_or_else(|| awaiting.awaiting_type.clone())
    }
}

#[async_trait]
impl Matcher for AwaitingInputMatcher {
    fn name(&self) -> &'static str {
        "awaiting_input"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn matches(&self, context: &MatchContext) -> Option<MatcherResult> {
        let marker = context.awaiting()?;
        let awaiting = match context.source.get_awaiting_config(marker).await {
            Ok(Some(config)) => config,
            Ok(None) => return None,
            Err(error) => {
                warn!(
                    event_name = "routing.matcher.awaiting_config_failed",
                    awaiting = marker,
                    error = %error,
                    "awaiting config lookup failed; treating as no match"
                );
                return None;
            }
        };

        if awaiting.is_monetary() {
            let amount = self
                .extractor
                .extract_amount(&context.message)
                .filter(|amount| *amount > Decimal::ZERO)?;
            let handler = Self::default_handler(context, &awaiting);
            return Some(
                self.matched(context, &awaiting, handler)
                    .with_metadata(META_AMOUNT, amount.to_string()),
            );
        }

        if let Some(pattern) =
            awaiting.validation_pattern.as_deref().filter(|pattern| !pattern.trim().is_empty())
        {
            let regex = match Regex::new(&format!("^(?:{pattern})")) {
                Ok(regex) => regex,
                Err(error) => {
                    warn!(
                        event_name = "routing.matcher.invalid_validation_pattern",
                        awaiting = marker,
                        pattern = pattern,
                        error = %error,
                        "validation pattern does not compile; treating as no match"
                    );
                    return None;
                }
            };
            if !regex.is_match(context.message.trim()) {
                return None;
            }
            let handler = self
                .reply_polarity(&context.message)
                .map(|intent| intent.as_str().to_string())
                .unwrap_or_else(|| Self::default_handler(context, &awaiting));
            let mut result = self.matched(context, &awaiting, handler);
            if let Some(document_id) = extract_document_id(&context.message) {
                result = result.with_metadata(META_DOCUMENT_ID, document_id);
            }
            return Some(result);
        }

        if awaiting.valid_response_intents.is_empty() {
            return None;
        }
        context.organization_id?;

        let (config, _) = find_keyword(&context.configs, &context.normalized, |intent| {
            awaiting.valid_response_intents.iter().any(|valid| valid.trim() == intent)
        })?;
        let mut result = self.matched(context, &awaiting, config.target_intent.clone());
        if let Some(node) = &config.target_node {
            result = result.with_metadata(META_NEXT_NODE, node.clone());
        }
        Some(result.with_config(config.clone()))
    }
}
