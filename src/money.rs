// 💰 Money - exact decimal parsing and rounding
// Amounts arrive as text with either '.' or ',' as decimal separator

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Round to 2 decimal places, midpoint away from zero (250.555 → 250.56)
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a monetary cell.
///
/// The last separator present ('.' or ',') is the decimal separator, the
/// other one is treated as a thousands separator:
/// - "1.234,56" → 1234.56
/// - "1,234.56" → 1234.56
/// - "1234,56"  → 1234.56
/// - "1.234"    → 1.234 (a single separator is always decimal; a lone
///   thousands group cannot be told apart from a decimal fraction)
/// - "1.234.567" → 1234567 (a repeated separator is a thousands separator)
///
/// Unparseable text yields `None`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let last_comma = trimmed.rfind(',');
    let last_dot = trimmed.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (Some(_), None) => {
            if trimmed.matches(',').count() > 1 {
                trimmed.replace(',', "")
            } else {
                trimmed.replace(',', ".")
            }
        }
        (None, Some(_)) => {
            if trimmed.matches('.').count() > 1 {
                trimmed.replace('.', "")
            } else {
                trimmed.to_string()
            }
        }
        (None, None) => trimmed.to_string(),
    };

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .ok()
}

/// Parse and round in one step, the way every monetary cell is ingested
pub fn parse_amount_rounded(raw: &str) -> Option<Decimal> {
    parse_amount(raw).map(round2)
}

/// Render with 2 decimals and ',' as decimal separator
pub fn format_decimal_comma(value: Decimal) -> String {
    let rounded = round2(value);
    // avoid rendering "-0,00"
    let rounded = if rounded.is_zero() { Decimal::ZERO } else { rounded };
    format!("{:.2}", rounded).replace('.', ",")
}

/// Same as [`format_decimal_comma`] but missing values become an empty cell
pub fn format_optional(value: Option<Decimal>) -> String {
    value.map(format_decimal_comma).unwrap_or_default()
}
