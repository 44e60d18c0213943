use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Awaiting marker set while the user is choosing from the numbered main menu.
pub const AWAITING_MENU_SELECTION: &str = "menu_selection";
/// Awaiting marker set while a yes/no confirmation is pending.
pub const AWAITING_CONFIRMATION: &str = "confirmation";

/// Numeric organization identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationId(pub u64);

impl OrganizationId {
    /// Parses a raw identifier; anything that is not a positive integer is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => None,
            Ok(value) => Some(Self(value)),
        }
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "usuario",
            Self::Assistant => "asistente",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, text: text.into() }
    }
}

/// Caller-supplied conversation facts for one inbound message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    pub awaiting: Option<String>,
    pub current_intent: Option<String>,
    pub is_authenticated: bool,
    pub debt_balance: Option<Decimal>,
    pub organization_id: Option<String>,
    pub recent_turns: Vec<ConversationTurn>,
}

impl ConversationState {
    pub fn organization(&self) -> Option<OrganizationId> {
        self.organization_id.as_deref().and_then(OrganizationId::parse)
    }

    /// Awaiting marker with surrounding whitespace removed; blank markers count as unset.
    pub fn awaiting_marker(&self) -> Option<&str> {
        self.awaiting.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.awaiting_marker() == Some(AWAITING_CONFIRMATION)
    }

    pub fn debt_status(&self) -> DebtStatus {
        DebtStatus::from_balance(self.debt_balance)
    }

    /// Formats the last `window` turns as `role: text` lines, oldest first.
    pub fn format_recent_turns(&self, window: usize) -> String {
        let start = self.recent_turns.len().saturating_sub(window);
        self.recent_turns[start..]
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Coarse debt classification shown to the generative model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Unknown,
    NoDebt,
    Moderate,
    High,
}

impl DebtStatus {
    pub const HIGH_BALANCE_THRESHOLD: i64 = 1_000_000;

    pub fn from_balance(balance: Option<Decimal>) -> Self {
        match balance {
            None => Self::Unknown,
            Some(value) if value <= Decimal::ZERO => Self::NoDebt,
            Some(value) if value < Decimal::from(Self::HIGH_BALANCE_THRESHOLD) => Self::Moderate,
            Some(_) => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NoDebt => "no_debt",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ConversationState, ConversationTurn, DebtStatus, OrganizationId};

    #[test]
    fn organization_id_rejects_malformed_values() {
        assert_eq!(OrganizationId::parse("42"), Some(OrganizationId(42)));
        assert_eq!(OrganizationId::parse(" 7 "), Some(OrganizationId(7)));
        assert_eq!(OrganizationId::parse("0"), None);
        assert_eq!(OrganizationId::parse("org-42"), None);
        assert_eq!(OrganizationId::parse(""), None);
    }

    #[test]
    fn debt_status_buckets_balance() {
        assert_eq!(DebtStatus::from_balance(None), DebtStatus::Unknown);
        assert_eq!(DebtStatus::from_balance(Some(Decimal::ZERO)), DebtStatus::NoDebt);
        assert_eq!(DebtStatus::from_balance(Some(Decimal::from(250_000))), DebtStatus::Moderate);
        assert_eq!(DebtStatus::from_balance(Some(Decimal::from(4_500_000))), DebtStatus::High);
    }

    #[test]
    fn recent_turns_are_windowed_oldest_first() {
        let state = ConversationState {
            recent_turns: vec![
                ConversationTurn::user("hola"),
                ConversationTurn::assistant("Bienvenido"),
                ConversationTurn::user("quiero pagar"),
            ],
            ..ConversationState::default()
        };

        assert_eq!(state.format_recent_turns(2), "asistente: Bienvenido\nusuario: quiero pagar");
        assert_eq!(state.format_recent_turns(0), "");
    }

    #[test]
    fn blank_awaiting_marker_counts_as_unset() {
        let state = ConversationState { awaiting: Some("  ".to_string()), ..Default::default() };
        assert_eq!(state.awaiting_marker(), None);
    }
}
