use async_trait::async_trait;
use dialroute_core::domain::conversation::AWAITING_MENU_SELECTION;
use dialroute_core::domain::decision::MatchType;
use dialroute_core::domain::routing::RoutingConfigKind;

use super::{MatchContext, Matcher, MatcherResult, META_CLEAR_AWAITING, META_MATCHED_VALUE};

const VARIATION_SELECTOR_16: char = '\u{FE0F}';
const COMBINING_ENCLOSING_KEYCAP: char = '\u{20E3}';

/// Reduces `3`, `3⃣` or `3️⃣` to `'3'`. Anything else is `None`.
pub fn normalize_menu_digit(message: &str) -> Option<char> {
    let mut chars = message
        .trim()
        .chars()
        .filter(|c| *c != VARIATION_SELECTOR_16 && *c != COMBINING_ENCLOSING_KEYCAP);
    let digit = chars.next().filter(char::is_ascii_digit)?;
    chars.next().is_none().then_some(digit)
}

/// Numbered main-menu replies, active only while a menu selection is pending.
pub struct MenuOptionMatcher;

#[async_trait]
impl Matcher for MenuOptionMatcher {
    fn name(&self) -> &'static str {
        "menu_option"
    }

    fn priority(&self) -> i32 {
        40
    }

    async fn matches(&self, context: &MatchContext) -> Option<MatcherResult> {
        if context.awaiting() != Some(AWAITING_MENU_SELECTION) {
            return None;
        }
        let digit = normalize_menu_digit(&context.message)?.to_string();

        let option = context
            .configs
            .of_kind(RoutingConfigKind::MenuOption)
            .iter()
            .find(|config| config.trigger_value.trim() == digit)?;

        Some(
            MatcherResult::new(MatchType::MenuOption, option.target_intent.clone())
                .with_metadata(META_CLEAR_AWAITING, true)
                .with_metadata(META_MATCHED_VALUE, digit)
                .with_config(option.clone()),
        )
    }
}
