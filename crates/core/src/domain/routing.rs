use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingConfigKind {
    GlobalKeyword,
    ButtonMapping,
    KnownListItem,
    MenuOption,
    IntentNodeMapping,
}

impl RoutingConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalKeyword => "global_keyword",
            Self::ButtonMapping => "button_mapping",
            Self::KnownListItem => "known_list_item",
            Self::MenuOption => "menu_option",
            Self::IntentNodeMapping => "intent_node_mapping",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "global_keyword" => Some(Self::GlobalKeyword),
            "button_mapping" => Some(Self::ButtonMapping),
            "known_list_item" => Some(Self::KnownListItem),
            "menu_option" => Some(Self::MenuOption),
            "intent_node_mapping" => Some(Self::IntentNodeMapping),
            _ => None,
        }
    }
}

impl fmt::Display for RoutingConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative routing rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub kind: RoutingConfigKind,
    pub trigger_value: String,
    pub target_intent: String,
    #[serde(default)]
    pub target_node: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub clears_context: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl RoutingConfig {
    pub fn new(
        kind: RoutingConfigKind,
        trigger_value: impl Into<String>,
        target_intent: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            trigger_value: trigger_value.into(),
            target_intent: target_intent.into(),
            target_node: None,
            priority: 0,
            requires_auth: false,
            clears_context: false,
            metadata: Map::new(),
            display_name: None,
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.target_node = Some(node.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn clearing_context(mut self) -> Self {
        self.clears_context = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Keyword aliases from the `aliases` metadata list. Non-string entries are ignored.
    pub fn aliases(&self) -> Vec<String> {
        string_list(self.metadata.get("aliases"))
    }

    /// Text aliases from `text_alias` (single string) and `text_aliases` (list).
    pub fn text_aliases(&self) -> Vec<String> {
        let mut aliases = Vec::new();
        if let Some(Value::String(alias)) = self.metadata.get("text_alias") {
            aliases.push(alias.clone());
        }
        aliases.extend(string_list(self.metadata.get("text_aliases")));
        aliases
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => {
            items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect()
        }
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}

/// Routing rules for one organization and domain, grouped by kind.
///
/// Each group is ordered by ascending priority; rules with equal priority keep
/// the order in which they were supplied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfigSet {
    by_kind: BTreeMap<RoutingConfigKind, Vec<RoutingConfig>>,
}

impl RoutingConfigSet {
    pub fn new(configs: impl IntoIterator<Item = RoutingConfig>) -> Self {
        let mut by_kind: BTreeMap<RoutingConfigKind, Vec<RoutingConfig>> = BTreeMap::new();
        for config in configs {
            by_kind.entry(config.kind).or_default().push(config);
        }
        for configs in by_kind.values_mut() {
            configs.sort_by_key(|config| config.priority);
        }
        Self { by_kind }
    }

    pub fn of_kind(&self, kind: RoutingConfigKind) -> &[RoutingConfig] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingConfig> {
        self.by_kind.values().flatten()
    }
}

/// Describes one structured-reply state a conversation can wait in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingTypeConfig {
    pub awaiting_type: String,
    pub target_node: String,
    #[serde(default)]
    pub valid_response_intents: Vec<String>,
    #[serde(default)]
    pub validation_pattern: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

impl AwaitingTypeConfig {
    /// Awaiting types that expect a monetary amount.
    pub fn is_monetary(&self) -> bool {
        let key = self.awaiting_type.trim();
        key == "amount" || key.ends_with("_amount") || key.starts_with("amount_")
    }
}

/// Leading-token rule: the message equals the keyword or starts with `keyword + " "`.
/// Both sides are expected to be lower-cased already.
pub fn matches_leading_token(message: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    message == keyword
        || message.strip_prefix(keyword).is_some_and(|rest| rest.starts_with(' '))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        matches_leading_token, AwaitingTypeConfig, RoutingConfig, RoutingConfigKind,
        RoutingConfigSet,
    };

    #[test]
    fn set_orders_by_priority_then_input_order() {
        let set = RoutingConfigSet::new(vec![
            RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "menu", "show_menu")
                .with_priority(10),
            RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "hola", "greeting")
                .with_priority(5),
            RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "inicio", "show_menu")
                .with_priority(10),
            RoutingConfig::new(RoutingConfigKind::MenuOption, "1", "debt_query"),
        ]);

        let triggers = set
            .of_kind(RoutingConfigKind::GlobalKeyword)
            .iter()
            .map(|config| config.trigger_value.as_str())
            .collect::<Vec<_>>();
        assert_eq!(triggers, vec!["hola", "menu", "inicio"]);
        assert_eq!(set.len(), 4);
        assert!(set.of_kind(RoutingConfigKind::ButtonMapping).is_empty());
    }

    #[test]
    fn aliases_ignore_non_string_entries() {
        let config = RoutingConfig::new(RoutingConfigKind::GlobalKeyword, "menu", "show_menu")
            .with_metadata("aliases", json!(["menú", 3, "inicio"]))
            .with_metadata("text_alias", json!("Ver menú"))
            .with_metadata("text_aliases", json!(["Opciones"]));

        assert_eq!(config.aliases(), vec!["menú".to_string(), "inicio".to_string()]);
        assert_eq!(config.text_aliases(), vec!["Ver menú".to_string(), "Opciones".to_string()]);
    }

    #[test]
    fn leading_token_requires_word_boundary() {
        assert!(matches_leading_token("menu", "menu"));
        assert!(matches_leading_token("menu por favor", "menu"));
        assert!(!matches_leading_token("menus", "menu"));
        assert!(!matches_leading_token("ver menu", "menu"));
        assert!(!matches_leading_token("menu", ""));
    }

    #[test]
    fn monetary_awaiting_types_are_detected_by_key() {
        let config = |key: &str| AwaitingTypeConfig {
            awaiting_type: key.to_string(),
            target_node: "payment_manager".to_string(),
            valid_response_intents: Vec::new(),
            validation_pattern: None,
            priority: 0,
        };

        assert!(config("amount").is_monetary());
        assert!(config("payment_amount").is_monetary());
        assert!(config("amount_partial").is_monetary());
        assert!(!config("dni").is_monetary());
    }
}
