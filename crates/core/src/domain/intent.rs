use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of intent labels the engine can route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Farewell,
    Confirm,
    Reject,
    ShowMenu,
    Cancel,
    DebtQuery,
    PaymentIntent,
    PaymentLink,
    PaymentAgreement,
    PaymentConfirmation,
    RequestAdvisor,
    ChangeAccount,
    Help,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 15] = [
        Intent::Greeting,
        Intent::Farewell,
        Intent::Confirm,
        Intent::Reject,
        Intent::ShowMenu,
        Intent::Cancel,
        Intent::DebtQuery,
        Intent::PaymentIntent,
        Intent::PaymentLink,
        Intent::PaymentAgreement,
        Intent::PaymentConfirmation,
        Intent::RequestAdvisor,
        Intent::ChangeAccount,
        Intent::Help,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Farewell => "farewell",
            Self::Confirm => "confirm",
            Self::Reject => "reject",
            Self::ShowMenu => "show_menu",
            Self::Cancel => "cancel",
            Self::DebtQuery => "debt_query",
            Self::PaymentIntent => "payment_intent",
            Self::PaymentLink => "payment_link",
            Self::PaymentAgreement => "payment_agreement",
            Self::PaymentConfirmation => "payment_confirmation",
            Self::RequestAdvisor => "request_advisor",
            Self::ChangeAccount => "change_account",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }

    /// Maps any label onto the whitelist; labels outside it become `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == normalized)
            .unwrap_or(Self::Unknown)
    }

    /// Intents whose deterministic classification is trusted regardless of confidence.
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Confirm | Self::Reject | Self::Greeting)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationMethod {
    #[serde(rename = "deterministic")]
    Deterministic,
    #[serde(rename = "generative-fallback")]
    GenerativeFallback,
    #[serde(rename = "keyword-fallback")]
    KeywordFallback,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::GenerativeFallback => "generative-fallback",
            Self::KeywordFallback => "keyword-fallback",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedEntities {
    pub amount: Option<Decimal>,
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.document_id.is_none() && self.extra.is_empty()
    }

    /// Fills gaps in `self` from `advisory`; values already present are never replaced.
    pub fn merge_advisory(mut self, advisory: ExtractedEntities) -> Self {
        if self.amount.is_none() {
            self.amount = advisory.amount;
        }
        if self.document_id.is_none() {
            self.document_id = advisory.document_id;
        }
        for (key, value) in advisory.extra {
            self.extra.entry(key).or_insert(value);
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    #[serde(deserialize_with = "deserialize_confidence")]
    confidence: f64,
    pub out_of_scope: bool,
    pub suggested_response: Option<String>,
    pub entities: ExtractedEntities,
    pub method: ClassificationMethod,
    pub analysis: BTreeMap<String, Value>,
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f64, method: ClassificationMethod) -> Self {
        Self {
            intent,
            confidence: clamp_confidence(confidence),
            out_of_scope: intent == Intent::Unknown,
            suggested_response: None,
            entities: ExtractedEntities::default(),
            method,
            analysis: BTreeMap::new(),
        }
    }

    pub fn unknown(confidence: f64, method: ClassificationMethod) -> Self {
        Self::new(Intent::Unknown, confidence, method)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = clamp_confidence(confidence);
    }

    pub fn with_entities(mut self, entities: ExtractedEntities) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_analysis(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.analysis.insert(key.into(), value.into());
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.intent == Intent::Unknown || self.out_of_scope
    }
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_confidence)
}

/// Clamps into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
