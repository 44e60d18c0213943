//! Prompt construction and reply parsing for the generative fallback.
//!
//! The model is only a translator: its label is coerced onto the intent
//! whitelist, its confidence is clamped and its entities are advisory.

use std::str::FromStr;

use dialroute_core::domain::conversation::{ConversationState, DebtStatus};
use dialroute_core::domain::intent::{clamp_confidence, ExtractedEntities, Intent};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Conversation facts handed to the model alongside the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisContext {
    pub is_authenticated: bool,
    pub awaiting_confirmation: bool,
    pub debt_status: DebtStatus,
    /// Recent turns formatted as `role: text` lines, oldest first.
    pub recent_turns: String,
}

impl AnalysisContext {
    pub fn from_state(state: &ConversationState, window: usize) -> Self {
        Self {
            is_authenticated: state.is_authenticated,
            awaiting_confirmation: state.is_awaiting_confirmation(),
            debt_status: state.debt_status(),
            recent_turns: state.format_recent_turns(window),
        }
    }
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            awaiting_confirmation: false,
            debt_status: DebtStatus::Unknown,
            recent_turns: String::new(),
        }
    }
}

pub fn build_prompt(message: &str, context: &AnalysisContext) -> String {
    let intents = Intent::ALL.iter().map(Intent::as_str).collect::<Vec<_>>().join(", ");
    let history = if context.recent_turns.is_empty() {
        "(sin historial)".to_string()
    } else {
        context.recent_turns.clone()
    };

    format!(
        "Clasifica la intención del último mensaje de un cliente en una conversación de cobranza.\n\
         Intenciones permitidas: {intents}.\n\
         Contexto:\n\
         - autenticado: {authenticated}\n\
         - esperando confirmación: {awaiting}\n\
         - estado de deuda: {debt}\n\
         Historial reciente:\n{history}\n\
         Mensaje: \"{message}\"\n\
         Responde solo con JSON: {{\"intent\": string, \"confidence\": número entre 0 y 1, \
         \"out_of_scope\": boolean, \"suggested_response\": string o null, \
         \"entities\": {{\"amount\": número o null, \"document_id\": string o null}}}}",
        authenticated = yes_no(context.is_authenticated),
        awaiting = yes_no(context.awaiting_confirmation),
        debt = context.debt_status.as_str(),
        message = message.trim(),
    )
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "sí"
    } else {
        "no"
    }
}

/// Structured content recovered from a model reply.
#[derive(Clone, Debug, PartialEq)]
pub struct FallbackReply {
    pub intent: Intent,
    pub confidence: f64,
    pub out_of_scope: bool,
    pub suggested_response: Option<String>,
    pub entities: ExtractedEntities,
    /// Label exactly as the model wrote it, before whitelist coercion.
    pub raw_label: String,
}

/// Reads the outermost `{...}` block of `raw` as JSON. Missing or mistyped
/// fields take neutral values; `None` means no JSON object could be found.
pub fn parse_reply(raw: &str) -> Option<FallbackReply> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let object = match serde_json::from_str::<Value>(&raw[start..=end]).ok()? {
        Value::Object(object) => object,
        _ => return None,
    };

    let raw_label = object.get("intent").and_then(Value::as_str).unwrap_or_default().to_string();
    let intent = Intent::from_label(&raw_label);
    let confidence = object.get("confidence").and_then(lenient_f64).map(clamp_confidence);
    let out_of_scope = object
        .get("out_of_scope")
        .and_then(Value::as_bool)
        .unwrap_or(false)
        || intent == Intent::Unknown;
    let suggested_response = object
        .get("suggested_response")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    let entities = object
        .get("entities")
        .and_then(Value::as_object)
        .map(advisory_entities)
        .unwrap_or_default();

    Some(FallbackReply {
        intent,
        confidence: confidence.unwrap_or(0.0),
        out_of_scope,
        suggested_response,
        entities,
        raw_label,
    })
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

fn advisory_entities(object: &Map<String, Value>) -> ExtractedEntities {
    let mut entities = ExtractedEntities::default();
    for (key, value) in object {
        match key.as_str() {
            "amount" => entities.amount = lenient_decimal(value),
            "document_id" => {
                entities.document_id = match value {
                    Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
                    Value::Number(number) => Some(number.to_string()),
                    _ => None,
                }
            }
            _ if !value.is_null() => {
                entities.extra.insert(key.clone(), value.clone());
            }
            _ => {}
        }
    }
    entities
}
