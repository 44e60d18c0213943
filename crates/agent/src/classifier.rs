use dialroute_core::domain::intent::{ClassificationMethod, Intent, IntentResult};
use serde_json::json;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Weight of one matched lemma in a pattern score.
pub const LEMMA_WEIGHT: f64 = 0.4;
pub const EXACT_PHRASE_BONUS: f64 = 0.9;
pub const CONTAINED_PHRASE_BONUS: f64 = 0.5;
/// Lemmas at least this long also match tokens that start with them.
const PREFIX_LEMMA_MIN_LEN: usize = 4;

/// Lemmas and phrases describing one intent. Lemmas and phrases are stored normalized.
#[derive(Clone, Debug, PartialEq)]
pub struct IntentPattern {
    pub intent: Intent,
    pub lemmas: Vec<String>,
    pub phrases: Vec<String>,
    /// When set, a phrase equal to or leading the message earns the exact bonus.
    pub exact: bool,
    pub weight: f64,
}

impl IntentPattern {
    pub fn new(intent: Intent, lemmas: &[&str], phrases: &[&str]) -> Self {
        Self {
            intent,
            lemmas: lemmas.iter().map(|lemma| normalize_text(lemma)).collect(),
            phrases: phrases.iter().map(|phrase| normalize_text(phrase)).collect(),
            exact: false,
            weight: 1.0,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// `min(1, weight × (0.4 × matched_lemmas + phrase_bonus))` over normalized text.
    pub fn score(&self, normalized: &str) -> PatternScore {
        let tokens = normalized.split_whitespace().collect::<Vec<_>>();
        let matched_lemmas = self
            .lemmas
            .iter()
            .filter(|lemma| tokens.iter().any(|token| lemma_matches(token, lemma)))
            .count();

        let phrase_bonus = self
            .phrases
            .iter()
            .map(|phrase| self.phrase_bonus(normalized, phrase))
            .fold(0.0_f64, f64::max);

        let raw = self.weight * (LEMMA_WEIGHT * matched_lemmas as f64 + phrase_bonus);
        PatternScore { intent: self.intent, score: raw.min(1.0), matched_lemmas, phrase_bonus }
    }

    fn phrase_bonus(&self, normalized: &str, phrase: &str) -> f64 {
        if phrase.is_empty() {
            return 0.0;
        }
        let leading = normalized == phrase
            || normalized.strip_prefix(phrase).is_some_and(|rest| rest.starts_with(' '));
        if self.exact && leading {
            EXACT_PHRASE_BONUS
        } else if contains_phrase(normalized, phrase) {
            CONTAINED_PHRASE_BONUS
        } else {
            0.0
        }
    }
}

fn lemma_matches(token: &str, lemma: &str) -> bool {
    token == lemma || (lemma.chars().count() >= PREFIX_LEMMA_MIN_LEN && token.starts_with(lemma))
}

/// Whole-word containment so that `no` does not match inside `nombre`.
fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let padded = format!(" {normalized} ");
    padded.contains(&format!(" {phrase} "))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternScore {
    pub intent: Intent,
    pub score: f64,
    pub matched_lemmas: usize,
    pub phrase_bonus: f64,
}

/// Lowercases, strips accents through canonical decomposition and replaces
/// punctuation with spaces. Whitespace runs collapse to one space.
pub fn normalize_text(text: &str) -> String {
    let stripped = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone, Debug)]
pub struct DeterministicClassifier {
    patterns: Vec<IntentPattern>,
    out_of_scope_threshold: f64,
}

impl DeterministicClassifier {
    pub fn new(patterns: Vec<IntentPattern>, out_of_scope_threshold: f64) -> Self {
        Self { patterns, out_of_scope_threshold }
    }

    pub fn with_default_catalog(out_of_scope_threshold: f64) -> Self {
        Self::new(default_catalog(), out_of_scope_threshold)
    }

    pub fn patterns(&self) -> &[IntentPattern] {
        &self.patterns
    }

    /// Highest score wins; ties keep the earlier pattern.
    pub fn best_match(&self, message: &str) -> Option<PatternScore> {
        let normalized = normalize_text(message);
        if normalized.is_empty() {
            return None;
        }
        self.patterns.iter().map(|pattern| pattern.score(&normalized)).fold(
            None,
            |best: Option<PatternScore>, candidate| match best {
                Some(current) if current.score >= candidate.score => Some(current),
                _ => Some(candidate),
            },
        )
    }

    pub fn classify(&self, message: &str) -> IntentResult {
        let Some(best) = self.best_match(message) else {
            return IntentResult::unknown(0.0, ClassificationMethod::Deterministic)
                .with_analysis("deterministic_score", 0.0);
        };

        let result = if best.score < self.out_of_scope_threshold {
            IntentResult::unknown(best.score, ClassificationMethod::Deterministic)
                .with_analysis("best_candidate", best.intent.as_str())
        } else {
            IntentResult::new(best.intent, best.score, ClassificationMethod::Deterministic)
        };

        result.with_analysis("deterministic_score", best.score).with_analysis(
            "matched",
            json!({ "lemmas": best.matched_lemmas, "phrase_bonus": best.phrase_bonus }),
        )
    }
}

/// Spanish catalog for a collections conversation. Specific intents come
/// first so they win ties against short generic replies.
pub fn default_catalog() -> Vec<IntentPattern> {
    vec![
        IntentPattern::new(
            Intent::DebtQuery,
            &["deuda", "debo", "saldo", "cuanto", "obligacion", "mora"],
            &["cuanto debo", "mi deuda", "consultar deuda", "ver saldo", "estado de cuenta"],
        )
        .exact(),
        IntentPattern::new(
            Intent::PaymentLink,
            &["link", "enlace", "url"],
            &["link de pago", "enlace de pago", "link para pagar"],
        )
        .exact(),
        IntentPattern::new(
            Intent::PaymentAgreement,
            &["acuerdo", "cuota", "financiar", "plazo", "negociar", "partes"],
            &["acuerdo de pago", "pagar en cuotas", "pagar por partes", "no puedo pagar"],
        ),
        IntentPattern::new(
            Intent::PaymentConfirmation,
            &["pague", "pagado", "consigne", "transferi", "comprobante"],
            &["ya pague", "ya realice el pago", "ya hice el pago", "envio el comprobante"],
        )
        .exact(),
        IntentPattern::new(
            Intent::PaymentIntent,
            &["pagar", "pago", "abonar", "abono"],
            &["quiero pagar", "voy a pagar", "deseo pagar", "quiero abonar"],
        )
        .exact(),
        IntentPattern::new(
            Intent::RequestAdvisor,
            &["asesor", "agente", "humano", "operador"],
            &["hablar con un asesor", "quiero un asesor", "comunicarme con un asesor"],
        )
        .exact(),
        IntentPattern::new(
            Intent::ChangeAccount,
            &["otra", "cambiar"],
            &["otra cuenta", "cambiar de cuenta", "cambiar cuenta"],
        )
        .exact(),
        IntentPattern::new(
            Intent::ShowMenu,
            &["menu", "opciones", "inicio"],
            &["menu principal", "ver opciones", "volver al inicio"],
        )
        .exact(),
        IntentPattern::new(Intent::Cancel, &["cancelar", "salir", "terminar"], &["ya no quiero"])
            .exact(),
        IntentPattern::new(
            Intent::Help,
            &["ayuda", "ayudar", "ayudame"],
            &["necesito ayuda", "como funciona"],
        )
        .exact(),
        IntentPattern::new(
            Intent::Greeting,
            &["hola", "buenas", "buenos", "saludos"],
            &["hola", "buenos dias", "buenas tardes", "buenas noches"],
        )
        .exact(),
        IntentPattern::new(
            Intent::Farewell,
            &["adios", "chao", "hasta"],
            &["hasta luego", "nos vemos", "eso es todo"],
        )
        .exact(),
        IntentPattern::new(
            Intent::Confirm,
            &["si", "claro", "correcto", "dale", "listo", "acepto", "confirmo", "ok"],
            &["si", "claro que si", "esta bien", "de acuerdo"],
        )
        .exact(),
        IntentPattern::new(
            Intent::Reject,
            &["no", "incorrecto", "rechazo"],
            &["no", "no gracias", "para nada"],
        )
        .exact()
        .with_weight(0.9),
    ]
}

#[cfg(test)]
mod tests {
    use dialroute_core::domain::intent::{ClassificationMethod, Intent};

    use super::{normalize_text, DeterministicClassifier, IntentPattern};

    fn classifier() -> DeterministicClassifier {
        DeterministicClassifier::with_default_catalog(0.3)
    }

    #[test]
    fn normalization_strips_accents_and_punctuation() {
        assert_eq!(normalize_text("¿Cuánto DEBO?"), "cuanto debo");
        assert_eq!(normalize_text("  Sí,   claro!! "), "si claro");
        assert_eq!(normalize_text("menú"), "menu");
    }

    #[test]
    fn score_combines_lemmas_and_phrase_bonus() {
        let pattern = IntentPattern::new(Intent::DebtQuery, &["deuda", "saldo"], &["mi deuda"]);
        let normalized = normalize_text("quiero ver mi deuda y saldo");
        let score = pattern.score(&normalized);
        assert_eq!(score.matched_lemmas, 2);
        assert_eq!(score.phrase_bonus, 0.5);
        assert_eq!(score.score, 1.0);

        let weak = pattern.with_weight(0.5).score("saldo");
        assert!((weak.score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn exact_bonus_requires_leading_phrase() {
        let pattern = IntentPattern::new(Intent::PaymentIntent, &[], &["quiero pagar"]).exact();
        assert_eq!(pattern.score("quiero pagar hoy").phrase_bonus, 0.9);
        assert_eq!(pattern.score("hoy quiero pagar").phrase_bonus, 0.5);
        assert_eq!(pattern.score("quiero pagarle").phrase_bonus, 0.0);
    }

    #[test]
    fn long_lemmas_match_token_prefixes() {
        let pattern = IntentPattern::new(Intent::PaymentAgreement, &["cuota", "si"], &[]);
        assert_eq!(pattern.score("en cuotas").matched_lemmas, 1);
        assert_eq!(pattern.score("sigo").matched_lemmas, 0);
    }

    #[test]
    fn payment_message_is_confident() {
        let result = classifier().classify("quiero pagar 15 mil pesos");
        assert_eq!(result.intent, Intent::PaymentIntent);
        assert!(result.confidence() >= 0.7);
        assert_eq!(result.method, ClassificationMethod::Deterministic);
    }

    #[test]
    fn specific_intents_beat_generic_ones() {
        assert_eq!(classifier().classify("¿cuánto debo?").intent, Intent::DebtQuery);
        assert_eq!(classifier().classify("me envías el link de pago").intent, Intent::PaymentLink);
        assert_eq!(classifier().classify("ya pagué ayer").intent, Intent::PaymentConfirmation);
        assert_eq!(classifier().classify("Hola").intent, Intent::Greeting);
    }

    #[test]
    fn low_scores_are_out_of_scope() {
        let result = classifier().classify("el clima está bonito");
        assert_eq!(result.intent, Intent::Unknown);
        assert!(result.out_of_scope);
        assert!(result.confidence() < 0.3);

        let empty = classifier().classify("?!");
        assert!(empty.is_unknown());
        assert_eq!(empty.confidence(), 0.0);
    }

    #[test]
    fn confidences_stay_in_unit_interval() {
        for message in ["hola hola buenas saludos buenos dias", "no", "x", "pagar pago abonar abono"] {
            let confidence = classifier().classify(message).confidence();
            assert!((0.0..=1.0).contains(&confidence), "{message}: {confidence}");
        }
    }
}
