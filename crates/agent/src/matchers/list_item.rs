use async_trait::async_trait;
use dialroute_core::domain::decision::MatchType;

use super::{MatchContext, Matcher, MatcherResult, META_CLEAR_AWAITING, META_MATCHED_VALUE};

/// Awaiting marker set after a list message was sent to the user.
pub const LIST_FOLLOWUP: &str = "list_followup";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KnownListItem {
    pub id: &'static str,
    pub title: &'static str,
    pub intent: &'static str,
}

/// Rows of the interactive list the channel sends as its main options.
pub const KNOWN_LIST_ITEMS: &[KnownListItem] = &[
    KnownListItem { id: "list_debt_query", title: "Consultar mi deuda", intent: "debt_query" },
    KnownListItem { id: "list_payment_link", title: "Link de pago", intent: "payment_link" },
    KnownListItem {
        id: "list_payment_agreement",
        title: "Acuerdo de pago",
        intent: "payment_agreement",
    },
    KnownListItem {
        id: "list_payment_confirmation",
        title: "Ya realicé el pago",
        intent: "payment_confirmation",
    },
    KnownListItem {
        id: "list_request_advisor",
        title: "Hablar con un asesor",
        intent: "request_advisor",
    },
    KnownListItem { id: "list_change_account", title: "Cambiar de cuenta", intent: "change_account" },
    KnownListItem { id: "list_main_menu", title: "Menú principal", intent: "show_menu" },
];

/// Transports truncate long row titles and append an ellipsis.
fn strip_ellipsis(value: &str) -> &str {
    let mut value = value.trim_end();
    loop {
        let stripped = value.trim_end_matches('…').trim_end_matches("...").trim_end();
        if stripped.len() == value.len() {
            return value;
        }
        value = stripped;
    }
}

pub struct KnownListItemMatcher;

impl KnownListItemMatcher {
    pub fn lookup(message: &str) -> Option<&'static KnownListItem> {
        let candidate = strip_ellipsis(message.trim());
        if candidate.is_empty() {
            return None;
        }
        let lowered = candidate.to_lowercase();
        KNOWN_LIST_ITEMS.iter().find(|item| item.id == candidate).or_else(|| {
            KNOWN_LIST_ITEMS.iter().find(|item| {
                let title = item.title.to_lowercase();
                title == lowered || (candidate.len() < message.trim().len() && title.starts_with(&lowered))
            })
        })
    }
}

#[async_trait]
impl Matcher for KnownListItemMatcher {
    fn name(&self) -> &'static str {
        "known_list_item"
    }

    fn priority(&self) -> i32 {
        45
    }

    async fn matches(&self, context: &MatchContext) -> Option<MatcherResult> {
        let item = Self::lookup(&context.message)?;
        Some(
            MatcherResult::new(MatchType::KnownListItem, item.intent)
                .with_metadata(META_CLEAR_AWAITING, context.awaiting() == Some(LIST_FOLLOWUP))
                .with_metadata(META_MATCHED_VALUE, item.id),
        )
    }
}
