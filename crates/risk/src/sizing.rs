//! Pure sizing arithmetic. Nothing here knows about configuration.

use crate::error::RiskError;
use core_types::{MarginLevel, PositionSide};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Default share of the balance above which used margin is flagged.
pub const DEFAULT_MARGIN_WARNING_RATIO: Decimal = dec!(0.9);

/// Quantity that loses `risk_pct` percent of `balance` if the stop is hit, scaled by leverage.
pub fn size_position(
    balance: Decimal,
    risk_pct: Decimal,
    entry: Decimal,
    stop: Decimal,
    leverage: u8,
) -> Result<Decimal, RiskError> {
    let stop_distance = entry.checked_sub(stop).ok_or(RiskError::Overflow)?.abs();
    if stop_distance.is_zero() {
        return Err(RiskError::InvalidStop { entry, stop });
    }
    balance
        .checked_mul(risk_pct)
        .and_then(|amount| amount.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|amount| amount.checked_div(stop_distance))
        .and_then(|qty| qty.checked_mul(Decimal::from(leverage)))
        .ok_or(RiskError::Overflow)
}

/// Distance to target over distance to stop.
pub fn reward_ratio(entry: Decimal, stop: Decimal, target: Decimal) -> Result<Decimal, RiskError> {
    let risk = entry.checked_sub(stop).ok_or(RiskError::Overflow)?.abs();
    if risk.is_zero() {
        return Err(RiskError::InvalidStop { entry, stop });
    }
    target
        .checked_sub(entry)
        .and_then(|reward| reward.abs().checked_div(risk))
        .ok_or(RiskError::Overflow)
}

/// Margin consumed by `quantity` at `entry` under `leverage`. Zero leverage counts as 1x.
pub fn margin_used(quantity: Decimal, entry: Decimal, leverage: u8) -> Result<Decimal, RiskError> {
    quantity
        .checked_mul(entry)
        .and_then(|notional| notional.checked_div(Decimal::from(leverage.max(1))))
        .ok_or(RiskError::Overflow)
}

/// Flags positions whose margin eats (nearly) the whole balance.
/// Returns `(is_risky, level)`; anything but `Ok` is risky. A margin too large
/// to represent is blocked.
pub fn margin_check(
    balance: Decimal,
    quantity: Decimal,
    entry: Decimal,
    leverage: u8,
) -> (bool, MarginLevel) {
    margin_check_with_ratio(balance, quantity, entry, leverage, DEFAULT_MARGIN_WARNING_RATIO)
}

pub fn margin_check_with_ratio(
    balance: Decimal,
    quantity: Decimal,
    entry: Decimal,
    leverage: u8,
    warning_ratio: Decimal,
) -> (bool, MarginLevel) {
    let warning_line = balance.checked_mul(warning_ratio).unwrap_or(Decimal::MAX);
    let level = match margin_used(quantity, entry, leverage) {
        Ok(used) if used > balance => MarginLevel::Blocked,
        Ok(used) if used > warning_line => MarginLevel::Warning,
        Ok(_) => MarginLevel::Ok,
        Err(_) => MarginLevel::Blocked,
    };
    (level != MarginLevel::Ok, level)
}

/// Unrealised move from `entry` to `mark` in percent, signed by direction.
pub fn profit_pct(entry: Decimal, mark: Decimal, side: PositionSide) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let change = match side {
        PositionSide::Long => mark - entry,
        PositionSide::Short => entry - mark,
    };
    change / entry * Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_from_risk_budget_and_leverage() {
        let qty = size_position(dec!(20), dec!(50), dec!(100), dec!(99), 10).unwrap();
        assert_eq!(qty, dec!(100));
    }

    #[test]
    fn oversized_position_is_blocked() {
        let (risky, level) = margin_check(dec!(20), dec!(100), dec!(100), 10);
        assert!(risky);
        assert_eq!(level, MarginLevel::Blocked);
    }

    #[test]
    fn margin_levels_follow_the_ninety_percent_line() {
        // 1 * 100 / 10 = 10 of margin.
        assert_eq!(margin_check(dec!(10.5), dec!(1), dec!(100), 10), (true, MarginLevel::Warning));
        assert_eq!(margin_check(dec!(20), dec!(1), dec!(100), 10), (false, MarginLevel::Ok));
        assert_eq!(margin_check(dec!(10), dec!(1), dec!(100), 10), (true, MarginLevel::Warning));
        assert_eq!(margin_check(dec!(9.99), dec!(1), dec!(100), 10), (true, MarginLevel::Blocked));
    }

    #[test]
    fn zero_leverage_is_treated_as_unleveraged() {
        assert_eq!(margin_used(dec!(2), dec!(50), 0), Ok(dec!(100)));
    }

    #[test]
    fn stop_at_entry_is_invalid() {
        assert_eq!(
            size_position(dec!(1000), dec!(1), dec!(100), dec!(100), 5),
            Err(RiskError::InvalidStop {
                entry: dec!(100),
                stop: dec!(100)
            })
        );
        assert!(reward_ratio(dec!(100), dec!(100), dec!(110)).is_err());
    }

    #[test]
    fn unrepresentable_size_is_an_error() {
        let huge = Decimal::MAX / dec!(10);
        assert_eq!(
            size_position(huge, dec!(50), dec!(2), dec!(1), 125),
            Err(RiskError::Overflow)
        );
        assert_eq!(
            size_position(dec!(1000), dec!(1), Decimal::MAX, -Decimal::MAX, 1),
            Err(RiskError::Overflow)
        );
        assert_eq!(reward_ratio(dec!(1), dec!(0.9999999), huge), Err(RiskError::Overflow));
    }

    #[test]
    fn unrepresentable_margin_is_blocked() {
        let huge = Decimal::MAX / dec!(10);
        assert_eq!(margin_used(huge, dec!(100), 1), Err(RiskError::Overflow));
        assert_eq!(margin_check(dec!(1), huge, dec!(100), 1), (true, MarginLevel::Blocked));
    }

    #[test]
    fn reward_ratio_uses_absolute_distances() {
        assert_eq!(reward_ratio(dec!(100), dec!(98), dec!(105)).unwrap(), dec!(2.5));
        assert_eq!(reward_ratio(dec!(100), dec!(102), dec!(95)).unwrap(), dec!(2.5));
    }

    #[test]
    fn profit_is_signed_by_side() {
        assert_eq!(profit_pct(dec!(100), dec!(103), PositionSide::Long), dec!(3));
        assert_eq!(profit_pct(dec!(100), dec!(103), PositionSide::Short), dec!(-3));
    }
}
