/// Currency utility functions for escrow amounts
///
/// Amounts are exact decimals in major units (e.g. dollars) everywhere in the
/// service; the payment gateway only speaks integer minor units (cents). Every
/// conversion goes through `to_minor_units` so rounding is applied once, the
/// same way, on every path.
use num_traits::{ToPrimitive, Zero};
use sqlx::types::BigDecimal;

pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Convert a non-negative amount to minor units, rounding half up.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    if amount < &BigDecimal::zero() {
        return None;
    }
    let scaled = amount.clone() * BigDecimal::from(MINOR_UNITS_PER_MAJOR);
    let whole = scaled.with_scale(0);
    let half = BigDecimal::from(1) / BigDecimal::from(2);
    let rounded = if &scaled - &whole >= half {
        whole + BigDecimal::from(1)
    } else {
        whole
    };
    rounded.to_i64()
}

/// Convert minor units back to a two-decimal amount
pub fn from_minor_units(minor: i64) -> BigDecimal {
    (BigDecimal::from(minor) / BigDecimal::from(MINOR_UNITS_PER_MAJOR)).with_scale(2)
}

/// Platform fee and tasker share of a gross amount, all in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub gross_minor: i64,
    pub fee_minor: i64,
    pub tasker_minor: i64,
}

impl FeeSplit {
    pub fn gross(&self) -> BigDecimal {
        from_minor_units(self.gross_minor)
    }

    pub fn platform_fee(&self) -> BigDecimal {
        from_minor_units(self.fee_minor)
    }

    pub fn tasker_amount(&self) -> BigDecimal {
        from_minor_units(self.tasker_minor)
    }
}

/// fee = round_half_up(gross * percentage / 100); tasker = gross - fee
pub fn split_fee(amount: &BigDecimal, fee_percentage: u32) -> Option<FeeSplit> {
    if fee_percentage > 100 {
        return None;
    }
    let gross_minor = to_minor_units(amount)?;
    let numerator = gross_minor.checked_mul(i64::from(fee_percentage))?;
    let fee_minor = (numerator + 50) / 100;
    Some(FeeSplit {
        gross_minor,
        fee_minor,
        tasker_minor: gross_minor - fee_minor,
    })
}

/// Format an amount with its ISO currency code, e.g. `"120.50 USD"`
pub fn format_amount(amount: &BigDecimal, currency: &str) -> String {
    format!("{} {}", amount.with_scale(2), currency.to_uppercase())
}
