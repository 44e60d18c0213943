use std::collections::BTreeSet;

use async_trait::async_trait;
use dialroute_core::domain::decision::MatchType;
use dialroute_core::domain::routing::{
    matches_leading_token, RoutingConfig, RoutingConfigKind, RoutingConfigSet,
};
use tracing::debug;

use super::{MatchContext, Matcher, MatcherResult, META_CLEAR_AWAITING, META_MATCHED_VALUE};

/// First global keyword whose trigger or alias is the leading token of
/// `normalized`, considering only rules whose intent passes `allowed`.
/// Returns the rule and the keyword that matched.
pub(crate) fn find_keyword<'a>(
    configs: &'a RoutingConfigSet,
    normalized: &str,
    allowed: impl Fn(&str) -> bool,
) -> Option<(&'a RoutingConfig, String)> {
    configs
        .of_kind(RoutingConfigKind::GlobalKeyword)
        .iter()
        .filter(|config| allowed(&config.target_intent))
        .find_map(|config| {
            std::iter::once(config.trigger_value.clone())
                .chain(config.aliases())
                .map(|keyword| keyword.trim().to_lowercase())
                .find(|keyword| matches_leading_token(normalized, keyword))
                .map(|keyword| (config, keyword))
        })
}

/// Configured keywords such as `menu` or `salir`, matched as the leading token.
///
/// While the conversation waits for a structured reply only escape intents may
/// interrupt it.
pub struct GlobalKeywordMatcher {
    escape_intents: BTreeSet<String>,
}

impl GlobalKeywordMatcher {
    pub fn new(escape_intents: impl IntoIterator<Item = String>) -> Self {
        Self {
            escape_intents: escape_intents
                .into_iter()
                .map(|intent| intent.trim().to_string())
                .filter(|intent| !intent.is_empty())
                .collect(),
        }
    }

    pub fn is_escape_intent(&self, intent: &str) -> bool {
        self.escape_intents.contains(intent.trim())
    }
}

#[async_trait]
impl Matcher for GlobalKeywordMatcher {
    fn name(&self) -> &'static str {
        "global_keyword"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn matches(&self, context: &MatchContext) -> Option<MatcherResult> {
        let awaiting = context.awaiting();
        let found = match awaiting {
            Some(_) => find_keyword(&context.configs, &context.normalized, |intent| {
                self.is_escape_intent(intent)
            }),
            None => find_keyword(&context.configs, &context.normalized, |_| true),
        };

        let Some((config, keyword)) = found else {
            if let Some(awaiting) = awaiting {
                if let Some((blocked, keyword)) =
                    find_keyword(&context.configs, &context.normalized, |_| true)
                {
                    debug!(
                        event_name = "routing.matcher.keyword_blocked",
                        awaiting = awaiting,
                        intent = %blocked.target_intent,
                        keyword = %keyword,
                        "global keyword blocked while awaiting input"
                    );
                }
            }
            return None;
        };

        Some(
            MatcherResult::new(MatchType::GlobalKeyword, config.target_intent.clone())
                .with_metadata(META_CLEAR_AWAITING, awaiting.is_some() || config.clears_context)
                .with_metadata(META_MATCHED_VALUE, keyword)
                .with_config(config.clone()),
        )
    }
}
