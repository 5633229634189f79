//! Decimal arithmetic utilities for rates and amounts.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Convert a daily interest fraction to its compounded annual yield:
/// `(1 + daily)^365 - 1`.
///
/// Computed through `f64`. The APY only feeds the low-yield guard comparison
/// and log output, never an order amount or a wire rate.
pub fn daily_to_apy(daily: Decimal) -> Decimal {
    let d = daily.to_f64().unwrap_or(0.0);
    let apy = (1.0 + d).powi(365) - 1.0;
    Decimal::from_f64(apy).unwrap_or(Decimal::ZERO)
}

/// Render an APY fraction as a percentage string, e.g. `0.1234` -> `"12.34%"`.
pub fn apy_display(apy: Decimal) -> String {
    format!("{:.2}%", apy * dec!(100))
}

/// Clamp a computed daily rate to a strictly positive floor.
pub fn floor_rate(rate: Decimal, floor: Decimal) -> Decimal {
    rate.max(floor)
}

/// Format an amount or rate as the fixed-point decimal string the submit
/// endpoint expects: six decimal places, no exponent, no representation
/// drift on the round trip.
pub fn fmt_fixed(value: Decimal) -> String {
    format!("{:.6}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_to_apy_compounds() {
        // 5 bps/day compounds to roughly 20% annually
        let apy = daily_to_apy(dec!(0.0005));
        assert!(apy > dec!(0.19) && apy < dec!(0.21));

        assert_eq!(daily_to_apy(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_apy_display() {
        assert_eq!(apy_display(dec!(0.1234)), "12.34%");
        assert_eq!(apy_display(Decimal::ZERO), "0.00%");
    }

    #[test]
    fn test_floor_rate() {
        let floor = dec!(0.000001);
        assert_eq!(floor_rate(dec!(-0.0005), floor), floor);
        assert_eq!(floor_rate(Decimal::ZERO, floor), floor);
        assert_eq!(floor_rate(dec!(0.0003), floor), dec!(0.0003));
    }

    #[test]
    fn test_fmt_fixed() {
        assert_eq!(fmt_fixed(dec!(500)), "500.000000");
        assert_eq!(fmt_fixed(dec!(0.0002)), "0.000200");
        assert_eq!(fmt_fixed(dec!(123.4567891)), "123.456789");
    }
}
