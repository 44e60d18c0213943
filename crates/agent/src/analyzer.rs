use std::sync::Arc;
use std::time::Duration;

use dialroute_core::config::RoutingSettings;
use dialroute_core::domain::intent::{ClassificationMethod, IntentResult};
use dialroute_core::errors::ModelError;
use serde_json::json;
use tracing::{debug, warn};

use crate::classifier::DeterministicClassifier;
use crate::extraction::EntityExtractor;
use crate::fallback::{build_prompt, parse_reply, AnalysisContext};
use crate::llm::LlmClient;

/// Deterministic classification first; the generative model is consulted only
/// for low-confidence, non-reliable candidates and can never lower the outcome
/// below the deterministic result.
pub struct HybridIntentAnalyzer {
    classifier: DeterministicClassifier,
    extractor: EntityExtractor,
    llm: Arc<dyn LlmClient>,
    confidence_threshold: f64,
    fallback_timeout: Duration,
}

impl HybridIntentAnalyzer {
    pub fn new(
        classifier: DeterministicClassifier,
        extractor: EntityExtractor,
        llm: Arc<dyn LlmClient>,
        confidence_threshold: f64,
        fallback_timeout: Duration,
    ) -> Self {
        Self { classifier, extractor, llm, confidence_threshold, fallback_timeout }
    }

    pub fn from_settings(settings: &RoutingSettings, llm: Arc<dyn LlmClient>) -> Self {
        Self::new(
            DeterministicClassifier::with_default_catalog(settings.out_of_scope_threshold),
            EntityExtractor::default(),
            llm,
            settings.confidence_threshold,
            settings.fallback_timeout(),
        )
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub async fn analyze(&self, message: &str, context: &AnalysisContext) -> IntentResult {
        let entities = self.extractor.extract(message);
        let deterministic = self.classifier.classify(message).with_entities(entities);

        if !self.needs_fallback(&deterministic) {
            return deterministic;
        }

        let prompt = build_prompt(message, context);
        let outcome = tokio::time::timeout(self.fallback_timeout, self.llm.complete(&prompt)).await;

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(ModelError::Disabled)) => {
                return deterministic.with_analysis("fallback_outcome", "disabled");
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "routing.analyzer.fallback_failed",
                    reason = error.kind(),
                    error = %error,
                    "generative fallback failed; keeping deterministic result"
                );
                return keep_deterministic(deterministic, error.kind());
            }
            Err(_) => {
                warn!(
                    event_name = "routing.analyzer.fallback_failed",
                    reason = "timeout",
                    timeout_ms = self.fallback_timeout.as_millis() as u64,
                    "generative fallback timed out; keeping deterministic result"
                );
                return keep_deterministic(deterministic, "timeout");
            }
        };

        let Some(parsed) = parse_reply(&reply) else {
            warn!(
                event_name = "routing.analyzer.fallback_failed",
                reason = "unparseable",
                "generative fallback reply had no JSON object; keeping deterministic result"
            );
            return keep_deterministic(deterministic, "unparseable");
        };

        if parsed.confidence <= deterministic.confidence() {
            debug!(
                event_name = "routing.analyzer.fallback_rejected",
                fallback_intent = parsed.intent.as_str(),
                fallback_confidence = parsed.confidence,
                deterministic_confidence = deterministic.confidence(),
                "generative fallback was not more confident"
            );
            return keep_deterministic(deterministic, "lower_confidence")
                .with_analysis("fallback_intent", parsed.intent.as_str())
                .with_analysis("fallback_confidence", parsed.confidence);
        }

        let replaced = json!({
            "intent": deterministic.intent.as_str(),
            "confidence": deterministic.confidence(),
        });
        let mut result = IntentResult::new(
            parsed.intent,
            parsed.confidence,
            ClassificationMethod::GenerativeFallback,
        )
        .with_entities(deterministic.entities.merge_advisory(parsed.entities));
        result.out_of_scope = parsed.out_of_scope;
        result.suggested_response = parsed.suggested_response;
        result.analysis = deterministic.analysis;
        debug!(
            event_name = "routing.analyzer.fallback_accepted",
            intent = result.intent.as_str(),
            confidence = result.confidence(),
            "generative fallback accepted"
        );
        result
            .with_analysis("fallback_outcome", "accepted")
            .with_analysis("fallback_label", parsed.raw_label)
            .with_analysis("deterministic", replaced)
    }

    fn needs_fallback(&self, deterministic: &IntentResult) -> bool {
        deterministic.confidence() < self.confidence_threshold && !deterministic.intent.is_reliable()
    }
}

fn keep_deterministic(mut result: IntentResult, outcome: &str) -> IntentResult {
    result.method = ClassificationMethod::KeywordFallback;
    result.with_analysis("fallback_outcome", outcome)
}
