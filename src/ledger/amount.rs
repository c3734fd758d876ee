//! Delivered-amount matching.
//!
//! Native amounts are compared in drops to avoid floating point entirely:
//! the delivered XRP value string is converted to drops and compared with
//! the expected integer. Issued amounts must match on currency, issuer and
//! numerically-normalized value.

use crate::ledger::{DeliveredAmount, ExpectedAmount, NATIVE_CURRENCY};

/// Drops per whole unit of the native currency.
const DROPS_PER_XRP: u64 = 1_000_000;

/// Whether the delivered amount satisfies the expectation.
///
/// No expectation accepts any delivery. An expected integer is native
/// drops: the delivered currency must be native and its value times one
/// million must equal the integer. An expected issued amount must match
/// currency, issuer and value exactly.
#[must_use]
pub fn amount_matches(
    expected: Option<&ExpectedAmount>,
    delivered: Option<&DeliveredAmount>,
) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(delivered) = delivered else {
        return false;
    };

    match expected {
        ExpectedAmount::Drops(drops) => {
            delivered.currency == NATIVE_CURRENCY
                && delivered.issuer.is_none()
                && xrp_value_to_drops(&delivered.value) == Some(*drops)
        }
        ExpectedAmount::Issued {
            currency,
            issuer,
            value,
        } => {
            delivered.currency == *currency
                && delivered.issuer.as_deref() == Some(issuer.as_str())
                && decimal_eq(value, &delivered.value)
        }
    }
}

/// Convert a decimal XRP value string to drops.
///
/// Returns `None` for negative, malformed, or sub-drop-precision values.
#[must_use]
pub fn xrp_value_to_drops(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') || value.starts_with('+') {
        return None;
    }

    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (value, ""),
    };
    if fraction.len() > 6 || (whole.is_empty() && fraction.is_empty()) {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut padded = fraction.to_string();
    while padded.len() < 6 {
        padded.push('0');
    }
    let fraction_drops: u64 = padded.parse().ok()?;

    whole
        .checked_mul(DROPS_PER_XRP)
        .and_then(|d| d.checked_add(fraction_drops))
}

/// Format a drop count as a decimal XRP value string.
#[must_use]
pub fn drops_to_xrp_value(drops: u64) -> String {
    let whole = drops / DROPS_PER_XRP;
    let fraction = drops % DROPS_PER_XRP;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:06}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}

/// Numeric equality of two decimal strings, tolerating trailing zeros and a
/// redundant decimal point ("5" == "5.0").
fn decimal_eq(a: &str, b: &str) -> bool {
    normalize_decimal(a).is_some_and(|a| normalize_decimal(b) == Some(a))
}

fn normalize_decimal(value: &str) -> Option<(bool, String, String)> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole = whole.trim_start_matches('0');
    let fraction = fraction.trim_end_matches('0');
    let zero = whole.is_empty() && fraction.is_empty();
    Some((
        negative && !zero,
        whole.to_string(),
        fraction.to_string(),
    ))
}
