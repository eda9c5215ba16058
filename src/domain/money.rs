use thiserror::Error;

/// Amounts are held as integer pence. £12.34 is 1234.
pub type Pence = i64;

pub const PENCE_PER_POUND: Pence = 100;

/// Largest magnitude, in pence, of any amount, starting balance or resulting
/// balance (£10 trillion). Keeps every sum the ledger computes well inside i64.
pub const MAX_AMOUNT: Pence = 1_000_000_000_000_000;

/// True if `pence` is within `-MAX_AMOUNT..=MAX_AMOUNT`.
pub fn within_limit(pence: Pence) -> bool {
    (-MAX_AMOUNT..=MAX_AMOUNT).contains(&pence)
}

/// Format pence as a two-decimal string: 1234 -> "12.34", -5 -> "-0.05".
pub fn format_pence(pence: Pence) -> String {
    let sign = if pence < 0 { "-" } else { "" };
    let abs = pence.unsigned_abs();
    format!(
        "{}{}.{:02}",
        sign,
        abs / PENCE_PER_POUND as u64,
        abs % PENCE_PER_POUND as u64
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("invalid amount '{0}'")]
    InvalidFormat(String),

    #[error("amount '{0}' has more than two decimal places")]
    TooPrecise(String),

    #[error("amount '{0}' is out of range")]
    Overflow(String),
}

/// Parse a decimal string into pence.
///
/// Accepts "12", "12.3", "12.34", ".50" and a leading minus sign. More than two
/// decimal places is rejected rather than truncated, so a request for 1.005
/// never silently posts 1.00.
pub fn parse_pence(input: &str) -> Result<Pence, MoneyError> {
    let raw = input.trim();
    let (negative, body) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(MoneyError::InvalidFormat(raw.to_string()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(MoneyError::InvalidFormat(raw.to_string()));
    }
    if fraction.len() > 2 {
        return Err(MoneyError::TooPrecise(raw.to_string()));
    }

    let pounds: Pence = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| MoneyError::Overflow(raw.to_string()))?
    };
    let pence_part: Pence = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<Pence>().unwrap_or(0) * 10,
        _ => fraction.parse().unwrap_or(0),
    };

    let total = pounds
        .checked_mul(PENCE_PER_POUND)
        .and_then(|p| p.checked_add(pence_part))
        .ok_or_else(|| MoneyError::Overflow(raw.to_string()))?;

    Ok(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_pence_with_two_decimals() {
        assert_eq!(format_pence(1234), "12.34");
        assert_eq!(format_pence(100), "1.00");
        assert_eq!(format_pence(7), "0.07");
        assert_eq!(format_pence(0), "0.00");
        assert_eq!(format_pence(-5), "-0.05");
        assert_eq!(format_pence(-250_000), "-2500.00");
    }

    #[test]
    fn parses_common_amounts() {
        assert_eq!(parse_pence("12.34"), Ok(1234));
        assert_eq!(parse_pence("12"), Ok(1200));
        assert_eq!(parse_pence("12.3"), Ok(1230));
        assert_eq!(parse_pence(".50"), Ok(50));
        assert_eq!(parse_pence("3."), Ok(300));
        assert_eq!(parse_pence(" -7.05 "), Ok(-705));
    }

    #[test]
    fn limit_is_symmetric() {
        assert!(within_limit(MAX_AMOUNT));
        assert!(within_limit(-MAX_AMOUNT));
        assert!(!within_limit(MAX_AMOUNT + 1));
        assert!(!within_limit(i64::MIN));
    }

    #[test]
    fn rejects_sub_penny_precision() {
        assert!(matches!(parse_pence("1.005"), Err(MoneyError::TooPrecise(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_pence("abc"), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_pence("1.2.3"), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_pence("."), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(parse_pence("+5"), Err(MoneyError::InvalidFormat(_))));
        assert!(matches!(
            parse_pence("99999999999999999999"),
            Err(MoneyError::Overflow(_))
        ));
    }
}
