//! Deterministic entity extraction: monetary amounts and document identifiers.
//!
//! Amount parsing tries, in order, verbal multipliers (`15 mil`, `2 millones`),
//! digit runs grouped with the locale's thousands separator, and plain digit
//! runs. Separators are never guessed: an [`AmountLocale`] names both.

use std::str::FromStr;
use std::sync::OnceLock;

use dialroute_core::domain::intent::ExtractedEntities;
use regex::Regex;
use rust_decimal::Decimal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmountLocale {
    pub group_separator: char,
    pub decimal_separator: char,
}

impl AmountLocale {
    /// Colombian Spanish: `1.250.000,50`.
    pub const ES_CO: Self = Self { group_separator: '.', decimal_separator: ',' };
    /// `1,250,000.50`.
    pub const EN_US: Self = Self { group_separator: ',', decimal_separator: '.' };
}

impl Default for AmountLocale {
    fn default() -> Self {
        Self::ES_CO
    }
}

struct Patterns {
    millions: Regex,
    thousands: Regex,
    grouped: Regex,
    plain: Regex,
    document_id: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        millions: Regex::new(r"(?i)(?:^|[^\d.,])(\d+(?:[.,]\d+)*)\s*(?:millones|millón|millon)\b")
            .expect("literal pattern"),
        thousands: Regex::new(r"(?i)(?:^|[^\d.,])(\d+(?:[.,]\d+)*)\s*mil\b").expect("literal pattern"),
        grouped: Regex::new(r"-?\d{1,3}(?:[.,]\d{3})+(?:[.,]\d+)?").expect("literal pattern"),
        plain: Regex::new(r"-?\d+(?:[.,]\d+)?").expect("literal pattern"),
        document_id: Regex::new(r"\b\d{7,8}\b").expect("literal pattern"),
    })
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EntityExtractor {
    locale: AmountLocale,
}

impl EntityExtractor {
    pub fn new(locale: AmountLocale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> AmountLocale {
        self.locale
    }

    pub fn extract(&self, text: &str) -> ExtractedEntities {
        ExtractedEntities {
            amount: self.extract_amount(text),
            document_id: extract_document_id(text),
            ..ExtractedEntities::default()
        }
    }

    pub fn extract_amount(&self, text: &str) -> Option<Decimal> {
        let patterns = patterns();

        // A malformed operand in front of a multiplier word reports no amount
        // rather than falling through to the bare digit passes.
        if let Some(amount) = self.with_multiplier(&patterns.millions, text, 1_000_000) {
            return amount;
        }
        if let Some(amount) = self.with_multiplier(&patterns.thousands, text, 1_000) {
            return amount;
        }

        if let Some(amount) = patterns
            .grouped
            .find_iter(text)
            .find_map(|candidate| self.parse_grouped(candidate.as_str()))
        {
            return Some(amount);
        }

        patterns.plain.find_iter(text).find_map(|candidate| self.parse_plain(candidate.as_str()))
    }

    /// `None` when the multiplier word never appears; `Some(None)` when every
    /// operand in front of it is malformed.
    fn with_multiplier(
        &self,
        pattern: &Regex,
        text: &str,
        multiplier: i64,
    ) -> Option<Option<Decimal>> {
        let mut seen = false;
        for captures in pattern.captures_iter(text) {
            let Some(operand) = captures.get(1) else { continue };
            seen = true;
            if let Some(amount) = self
                .parse_operand(operand.as_str())
                .and_then(|base| base.checked_mul(Decimal::from(multiplier)))
            {
                return Some(Some(amount));
            }
        }
        seen.then_some(None)
    }

    /// Operand of `mil` / `millones`: bare digits, a valid grouped number, or a
    /// single separator followed by one or two digits read as a fraction
    /// (`2.5 millones`, `1,5 mil`). Anything else is rejected.
    fn parse_operand(&self, raw: &str) -> Option<Decimal> {
        let separators = raw.matches(['.', ',']).count();
        if separators == 0 {
            return Decimal::from_str(raw).ok();
        }
        if let Some(amount) = self.parse_grouped(raw) {
            return Some(amount);
        }
        if separators != 1 {
            return None;
        }
        let (integer, fraction) = raw.split_once(['.', ','])?;
        let well_formed = !integer.is_empty()
            && (1..=2).contains(&fraction.len())
            && fraction.chars().all(|c| c.is_ascii_digit());
        if !well_formed {
            return None;
        }
        Decimal::from_str(&format!("{integer}.{fraction}")).ok()
    }

    /// Accepts `1.250.000` or `1.250.000,50` for es-CO; any other separator layout is rejected.
    fn parse_grouped(&self, raw: &str) -> Option<Decimal> {
        let (integer, fraction) = match raw.rsplit_once(self.locale.decimal_separator) {
            Some((integer, fraction))
                if !fraction.is_empty() && fraction.chars().all(|c| c.is_ascii_digit()) =>
            {
                (integer, Some(fraction))
            }
            Some(_) => return None,
            None => (raw, None),
        };

        let unsigned = integer.strip_prefix('-').unwrap_or(integer);
        let mut groups = unsigned.split(self.locale.group_separator);
        let head = groups.next()?;
        if head.is_empty() || head.len() > 3 || !head.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let mut digits = String::from(head);
        let mut group_count = 0;
        for group in groups {
            if group.len() != 3 || !group.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            digits.push_str(group);
            group_count += 1;
        }
        if group_count == 0 {
            return None;
        }

        let sign = if integer.starts_with('-') { "-" } else { "" };
        let literal = match fraction {
            Some(fraction) => format!("{sign}{digits}.{fraction}"),
            None => format!("{sign}{digits}"),
        };
        Decimal::from_str(&literal).ok()
    }

    /// A separator counts only when it is the locale's decimal separator;
    /// otherwise the leading digit run is the amount.
    fn parse_plain(&self, raw: &str) -> Option<Decimal> {
        match raw.find(|c: char| c == '.' || c == ',') {
            Some(index) if raw[index..].starts_with(self.locale.decimal_separator) => {
                self.parse_number(raw)
            }
            Some(index) => Decimal::from_str(&raw[..index]).ok(),
            None => Decimal::from_str(raw).ok(),
        }
    }

    fn parse_number(&self, raw: &str) -> Option<Decimal> {
        let literal = raw
            .chars()
            .filter(|c| *c != self.locale.group_separator)
            .map(|c| if c == self.locale.decimal_separator { '.' } else { c })
            .collect::<String>();
        Decimal::from_str(&literal).ok()
    }
}

/// First standalone 7 or 8 digit run.
pub fn extract_document_id(text: &str) -> Option<String> {
    patterns().document_id.find(text).map(|found| found.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{extract_document_id, AmountLocale, EntityExtractor};

    fn amount(text: &str) -> Option<Decimal> {
        EntityExtractor::default().extract_amount(text)
    }

    #[test]
    fn verbal_multipliers_take_precedence() {
        assert_eq!(amount("quiero pagar 15 mil pesos"), Some(Decimal::from(15_000)));
        assert_eq!(amount("puedo abonar 2 millones"), Some(Decimal::from(2_000_000)));
        assert_eq!(amount("1 millón"), Some(Decimal::from(1_000_000)));
        assert_eq!(amount("1,5 millones"), Some(Decimal::from(1_500_000)));
        assert_eq!(amount("pago 300 de 2 millones"), Some(Decimal::from(2_000_000)));
    }

    #[test]
    fn multiplier_operands_read_short_fractions_and_reject_bad_grouping() {
        assert_eq!(amount("te pago 2.5 millones"), Some(Decimal::from(2_500_000)));
        assert_eq!(amount("abono 1.5 mil"), Some(Decimal::from(1_500)));
        assert_eq!(amount("1,25 millones"), Some(Decimal::from(1_250_000)));
        assert_eq!(amount("1.500 mil"), Some(Decimal::from(1_500_000)));
        assert_eq!(amount("1.2.3 mil"), None);
        assert_eq!(amount("2.5000 millones"), None);
        assert_eq!(amount("pago 50.000, mil gracias"), Some(Decimal::from(50_000)));

        let en = EntityExtractor::new(AmountLocale::EN_US);
        assert_eq!(en.extract_amount("2.5 millones"), Some(Decimal::from(2_500_000)));
        assert_eq!(en.extract_amount("1,500 mil"), Some(Decimal::from(1_500_000)));
    }

    #[test]
    fn grouped_digits_follow_the_locale() {
        assert_eq!(amount("$150.000"), Some(Decimal::from(150_000)));
        assert_eq!(amount("1.250.000,50"), Some(Decimal::new(125_000_050, 2)));

        let en = EntityExtractor::new(AmountLocale::EN_US);
        assert_eq!(en.extract_amount("$1,250,000.50"), Some(Decimal::new(125_000_050, 2)));
        assert_eq!(en.extract_amount("150.000"), Some(Decimal::new(150_000, 3)));
    }

    #[test]
    fn plain_digit_runs_and_signs() {
        assert_eq!(amount("50000"), Some(Decimal::from(50_000)));
        assert_eq!(amount("-200"), Some(Decimal::from(-200)));
        assert_eq!(amount("12,5"), Some(Decimal::new(125, 1)));
        assert_eq!(amount("sin monto"), None);
    }

    #[test]
    fn plain_amount_text_round_trips() {
        for value in [1_500_u64, 7, 999, 1_000_000] {
            let extracted = amount(&value.to_string()).expect("digits parse");
            assert_eq!(amount(&extracted.to_string()), Some(Decimal::from(value)));
        }
    }

    #[test]
    fn multiplier_words_need_a_word_boundary() {
        assert_eq!(amount("miles de gracias"), None);
        assert_eq!(amount("5 milanesas"), Some(Decimal::from(5)));
    }

    #[test]
    fn document_id_requires_standalone_run() {
        assert_eq!(extract_document_id("mi cédula es 1234567").as_deref(), Some("1234567"));
        assert_eq!(extract_document_id("doc 87654321.").as_deref(), Some("87654321"));
        assert_eq!(extract_document_id("123456789"), None);
        assert_eq!(extract_document_id("123456"), None);
    }

    #[test]
    fn extract_fills_both_entities() {
        let entities = EntityExtractor::default().extract("cédula 10203040 y pago 20 mil");
        assert_eq!(entities.amount, Some(Decimal::from(20_000)));
        assert_eq!(entities.document_id.as_deref(), Some("10203040"));
    }
}
