use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::ValueError;

/// Parses an amount cell as exported by banks and spreadsheets.
///
/// Accepts currency symbols, thousands separators, a leading sign and the
/// accounting convention of wrapping negatives in parentheses.
pub fn parse_amount(s: &str) -> Result<Decimal, ValueError> {
    let trimmed = s.trim();
    let (negative, body) = if trimmed.len() >= 2 && trimmed.starts_with('(') && trimmed.ends_with(')')
    {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };
    let cleaned = body.replace([',', '$', ' '], "");
    if cleaned.is_empty() {
        return Err(ValueError::amount(s));
    }
    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| ValueError::amount(s))?;
    Ok(if negative { -value } else { value })
}

/// Rounds to two decimal places, the granularity recurring amounts are compared at.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// `|a - b| <= tolerance`; a difference too large to represent is never
/// within tolerance.
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.checked_sub(b).is_some_and(|diff| diff.abs() <= tolerance)
}

/// Returns `(low, high)` bounds `percent` either side of `amount`, ordered so
/// that `low <= high` for negative amounts too. `None` when a bound falls
/// outside the `Decimal` range.
pub fn tolerance_band(amount: Decimal, percent: u32) -> Option<(Decimal, Decimal)> {
    let delta = amount.abs().checked_mul(Decimal::from(percent))? / Decimal::from(100);
    Some((
        round_cents(amount.checked_sub(delta)?),
        round_cents(amount.checked_add(delta)?),
    ))
}

/// Sum of `amounts`, or `None` when it overflows.
pub fn checked_sum(amounts: &[Decimal]) -> Option<Decimal> {
    amounts
        .iter()
        .try_fold(Decimal::ZERO, |total, a| total.checked_add(*a))
}

/// Arithmetic mean. When the plain sum overflows, each amount is divided
/// first and the result is kept within the observed min and max.
pub fn mean(amounts: &[Decimal]) -> Option<Decimal> {
    let (min, max) = (amounts.iter().min()?, amounts.iter().max()?);
    let n = Decimal::from(amounts.len());
    let mean = match checked_sum(amounts) {
        Some(total) => total / n,
        None => amounts
            .iter()
            .fold(Decimal::ZERO, |acc, a| acc.saturating_add(*a / n)),
    };
    Some(mean.clamp(*min, *max))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("123.45").unwrap(), d("123.45"));
    }

    #[test]
    fn parse_amount_with_dollar_sign_and_commas() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), d("1234.56"));
    }

    #[test]
    fn parse_amount_negative() {
        assert_eq!(parse_amount("-50.00").unwrap(), d("-50.00"));
    }

    #[test]
    fn parse_amount_accounting_parens() {
        assert_eq!(parse_amount("(75.25)").unwrap(), d("-75.25"));
    }

    #[test]
    fn parse_amount_scientific() {
        assert_eq!(parse_amount("1e3").unwrap(), d("1000"));
    }

    #[test]
    fn parse_amount_invalid() {
        assert!(parse_amount("not_a_number").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("()").is_err());
    }

    #[test]
    fn round_cents_rounds_to_two_places() {
        assert_eq!(round_cents(d("5.756")), d("5.76"));
    }

    #[test]
    fn within_tolerance_is_inclusive() {
        assert!(within_tolerance(d("10.00"), d("10.01"), d("0.01")));
        assert!(!within_tolerance(d("10.00"), d("10.02"), d("0.01")));
    }

    #[test]
    fn tolerance_band_positive() {
        assert_eq!(tolerance_band(d("100"), 5), Some((d("95"), d("105"))));
    }

    #[test]
    fn tolerance_band_negative_is_ordered() {
        let (low, high) = tolerance_band(d("-40.00"), 5).unwrap();
        assert_eq!(low, d("-42.00"));
        assert_eq!(high, d("-38.00"));
        assert!(low <= high);
    }

    #[test]
    fn tolerance_band_out_of_range_is_none() {
        assert_eq!(tolerance_band(Decimal::MAX, 5), None);
        assert_eq!(tolerance_band(Decimal::MIN, 5), None);
    }

    #[test]
    fn tolerance_across_the_whole_range_does_not_overflow() {
        assert!(!within_tolerance(Decimal::MAX, Decimal::MIN, d("0.01")));
        assert!(within_tolerance(Decimal::MAX, Decimal::MAX, d("0.01")));
    }

    #[test]
    fn sum_and_mean() {
        let amounts = [d("10"), d("20"), d("-3")];
        assert_eq!(checked_sum(&amounts), Some(d("27")));
        assert_eq!(mean(&amounts), Some(d("9")));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn mean_survives_overflowing_sum() {
        let amounts = [Decimal::MAX, Decimal::MAX];
        assert_eq!(checked_sum(&amounts), None);
        assert_eq!(mean(&amounts), Some(Decimal::MAX));
    }
}
