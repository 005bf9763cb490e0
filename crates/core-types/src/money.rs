//! Rounding rules for monetary values and quantities.
//!
//! Fees truncate toward zero so the desk never charges more than the fee rate
//! implies; PnL and posted margin round half-even so repeated open/close cycles
//! do not drift in either direction.

use crate::error::CoreError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for cash, margin, fees and PnL.
pub const MONEY_DP: u32 = 8;

/// Decimal places kept for base-unit quantities.
pub const QUANTITY_DP: u32 = 8;

pub fn truncate_fee(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero)
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointNearestEven)
}

pub fn truncate_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero)
}

/// Fee charged on a notional amount at the given rate.
pub fn fee_for(notional: Decimal, fee_rate: Decimal) -> Result<Decimal, CoreError> {
    notional
        .checked_mul(fee_rate)
        .map(truncate_fee)
        .ok_or(CoreError::Overflow("fee"))
}

/// Caps a closing fee at what the position returns, so a close never drives cash negative.
pub fn cap_fee(fee: Decimal, available: Decimal) -> Decimal {
    truncate_fee(fee.min(available.max(Decimal::ZERO)))
}

pub(crate) fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, CoreError> {
    a.checked_mul(b).ok_or(CoreError::Overflow(what))
}

pub(crate) fn div(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, CoreError> {
    a.checked_div(b).ok_or(CoreError::Overflow(what))
}
