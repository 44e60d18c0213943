use serde::{Deserialize, Serialize};

use crate::domain::intent::{ClassificationMethod, ExtractedEntities};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    AwaitingInput,
    MenuOption,
    KnownListItem,
    ButtonMapping,
    GlobalKeyword,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingInput => "awaiting_input",
            Self::MenuOption => "menu_option",
            Self::KnownListItem => "known_list_item",
            Self::ButtonMapping => "button_mapping",
            Self::GlobalKeyword => "global_keyword",
        }
    }
}

/// Which stage of the engine produced a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum DecisionSource {
    Matcher { match_type: MatchType },
    Analyzer { method: ClassificationMethod },
}

/// Where processing continues after a message has been understood.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub intent: String,
    pub previous_intent: Option<String>,
    pub next_node: String,
    pub clear_awaiting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<ExtractedEntities>,
    pub source: DecisionSource,
    #[serde(default)]
    pub auth_redirected: bool,
}
