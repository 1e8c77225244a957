//! Exchange precision rules applied to an order before it is submitted.
//!
//! Quantities only ever round down. Prices round to the tick so that the stop moves
//! away from the entry and the target moves toward it: a long floors both, a short
//! ceils both.

use core_types::{ExchangeSymbolRules, PositionSide};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// An order that satisfies the symbol's rules and may be submitted as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NormalizedOrder {
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub notional: Decimal,
}

/// Why an order must not be submitted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("quantity {quantity} and entry {entry} must both be positive")]
    NonPositiveInput { quantity: Decimal, entry: Decimal },

    #[error("symbol rules are unusable: {0}")]
    InvalidRules(String),

    #[error("bracket crossed entry {entry} after rounding (stop {stop}, target {target})")]
    BracketCrossed {
        entry: Decimal,
        stop: Decimal,
        target: Decimal,
    },

    #[error("quantity {quantity} is below the exchange minimum {minimum}")]
    BelowMinQuantity { quantity: Decimal, minimum: Decimal },

    #[error("notional {notional} is below the exchange minimum {minimum}")]
    BelowMinNotional { notional: Decimal, minimum: Decimal },
}

/// Largest multiple of `step` not above `value`. Expects non-negative input.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    value - value % step
}

/// Smallest multiple of `step` not below `value`. Expects non-negative input.
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    let remainder = value % step;
    if remainder.is_zero() {
        value
    } else {
        value - remainder + step
    }
}

/// Rounds an exit price for a position on `side`.
pub fn round_exit_price(side: PositionSide, price: Decimal, tick: Decimal) -> Decimal {
    match side {
        PositionSide::Long => floor_to_step(price, tick),
        PositionSide::Short => ceil_to_step(price, tick),
    }
}

pub fn normalize(
    side: PositionSide,
    entry: Decimal,
    quantity: Decimal,
    stop: Decimal,
    target: Decimal,
    rules: &ExchangeSymbolRules,
) -> Result<NormalizedOrder, Rejection> {
    if quantity <= Decimal::ZERO || entry <= Decimal::ZERO {
        return Err(Rejection::NonPositiveInput { quantity, entry });
    }
    if rules.quantity_step <= Decimal::ZERO || rules.price_tick <= Decimal::ZERO {
        return Err(Rejection::InvalidRules(format!(
            "step {} and tick {} must be positive",
            rules.quantity_step, rules.price_tick
        )));
    }

    let quantity = floor_to_step(quantity, rules.quantity_step);
    let stop_price = round_exit_price(side, stop, rules.price_tick);
    let target_price = round_exit_price(side, target, rules.price_tick);

    let ordered = match side {
        PositionSide::Long => stop_price < entry && entry < target_price,
        PositionSide::Short => target_price < entry && entry < stop_price,
    };
    if !ordered || stop_price <= Decimal::ZERO {
        return Err(Rejection::BracketCrossed {
            entry,
            stop: stop_price,
            target: target_price,
        });
    }

    if quantity < rules.quantity_min || quantity.is_zero() {
        return Err(Rejection::BelowMinQuantity {
            quantity,
            minimum: rules.quantity_min,
        });
    }
    let notional = quantity * entry;
    if notional < rules.minimum_notional {
        return Err(Rejection::BelowMinNotional {
            notional,
            minimum: rules.minimum_notional,
        });
    }

    Ok(NormalizedOrder {
        quantity,
        stop_price,
        target_price,
        notional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn rules() -> ExchangeSymbolRules {
        ExchangeSymbolRules {
            quantity_step: dec!(0.001),
            quantity_min: dec!(0.001),
            price_tick: dec!(0.1),
            minimum_notional: dec!(5),
            max_leverage: 125,
        }
    }

    #[test]
    fn long_floors_everything() {
        let order = normalize(
            PositionSide::Long,
            dec!(100),
            dec!(1.23456),
            dec!(98.17),
            dec!(104.96),
            &rules(),
        )
        .unwrap();

        assert_eq!(order.quantity, dec!(1.234));
        assert_eq!(order.stop_price, dec!(98.1));
        assert_eq!(order.target_price, dec!(104.9));
        assert_eq!(order.notional, dec!(123.4));
    }

    #[test]
    fn short_ceils_prices() {
        let order = normalize(
            PositionSide::Short,
            dec!(100),
            dec!(0.5),
            dec!(101.83),
            dec!(95.01),
            &rules(),
        )
        .unwrap();

        assert_eq!(order.stop_price, dec!(101.9));
        assert_eq!(order.target_price, dec!(95.1));
    }

    #[test]
    fn dust_quantity_is_rejected() {
        let err = normalize(
            PositionSide::Long,
            dec!(100),
            dec!(0.0009),
            dec!(98),
            dec!(105),
            &rules(),
        )
        .unwrap_err();
        assert!(matches!(err, Rejection::BelowMinQuantity { .. }));
    }

    #[test]
    fn small_notional_is_rejected() {
        let err = normalize(
            PositionSide::Long,
            dec!(100),
            dec!(0.04),
            dec!(98),
            dec!(105),
            &rules(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Rejection::BelowMinNotional {
                notional: dec!(4.000),
                minimum: dec!(5)
            }
        );
    }

    #[test]
    fn target_rounded_onto_entry_is_rejected() {
        // 100.05 floors to 100.0, which no longer sits above the entry.
        let err = normalize(
            PositionSide::Long,
            dec!(100),
            dec!(1),
            dec!(99),
            dec!(100.05),
            &rules(),
        )
        .unwrap_err();
        assert!(matches!(err, Rejection::BracketCrossed { .. }));
    }

    #[test]
    fn zero_step_rules_are_rejected() {
        let rules = ExchangeSymbolRules {
            quantity_step: Decimal::ZERO,
            ..rules()
        };
        assert!(matches!(
            normalize(PositionSide::Long, dec!(100), dec!(1), dec!(98), dec!(105), &rules),
            Err(Rejection::InvalidRules(_))
        ));
    }

    proptest! {
        #[test]
        fn quantity_is_a_step_multiple_never_rounded_up(
            units in 1u64..10_000_000,
            step_exp in 0u32..4,
        ) {
            let quantity = Decimal::new(units as i64, 5);
            let step = Decimal::new(1, step_exp);
            let floored = floor_to_step(quantity, step);

            prop_assert!(floored <= quantity);
            prop_assert!(quantity - floored < step);
            prop_assert_eq!(floored % step, Decimal::ZERO);
        }

        #[test]
        fn ceiling_never_rounds_down(units in 1u64..10_000_000) {
            let price = Decimal::new(units as i64, 3);
            let tick = dec!(0.1);
            let ceiled = ceil_to_step(price, tick);

            prop_assert!(ceiled >= price);
            prop_assert!(ceiled - price < tick);
            prop_assert_eq!(ceiled % tick, Decimal::ZERO);
        }
    }
}
