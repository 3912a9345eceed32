//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Calculate weighted average.
pub fn weighted_average(values: &[(Decimal, Decimal)]) -> Decimal {
    let (sum, weight_sum) = values.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(sum, weight_sum), (val, weight)| (sum + val * weight, weight_sum + weight),
    );

    safe_div(sum, weight_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_weighted_average() {
        let values = vec![
            (dec!(100), dec!(2)), // 100 with weight 2
            (dec!(200), dec!(1)), // 200 with weight 1
        ];
        // (100*2 + 200*1) / (2+1) = 400/3 ≈ 133.33
        let avg = weighted_average(&values);
        assert!(avg > dec!(133) && avg < dec!(134));
    }

    #[test]
    fn test_weighted_average_with_zero_weight() {
        assert_eq!(
            weighted_average(&[(dec!(50), Decimal::ZERO)]),
            Decimal::ZERO
        );
    }
}
