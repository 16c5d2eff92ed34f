//! Small decimal helpers shared by the calculators and the export loaders.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a currency amount to cents, halves away from zero.
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46));
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts an export percentage (e.g. `164` for 164 %) into a fraction.
///
/// ```
/// use rust_decimal_macros::dec;
/// use tax_core::calculations::common::percent_to_fraction;
///
/// assert_eq!(percent_to_fraction(dec!(164)), dec!(1.64));
/// assert_eq!(percent_to_fraction(dec!(0.5)), dec!(0.005));
/// ```
pub fn percent_to_fraction(percent: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED
}

/// Amount of `value` above `floor`, never negative.
pub fn excess_over(
    value: Decimal,
    floor: Decimal,
) -> Decimal {
    (value - floor).max(Decimal::ZERO)
}
