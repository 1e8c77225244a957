use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Leverage tier for a balance: smaller accounts get more leverage so a minimum
/// position is still reachable.
pub fn dynamic_leverage(balance: Decimal) -> u8 {
    if balance >= dec!(100) {
        50
    } else if balance >= dec!(50) {
        75
    } else if balance >= dec!(25) {
        100
    } else {
        125
    }
}

/// Risk percentage tier for a balance.
pub fn dynamic_risk_pct(balance: Decimal) -> Decimal {
    if balance >= dec!(100) {
        dec!(3)
    } else if balance >= dec!(50) {
        dec!(5)
    } else {
        dec!(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leverage_tiers() {
        assert_eq!(dynamic_leverage(dec!(1000)), 50);
        assert_eq!(dynamic_leverage(dec!(100)), 50);
        assert_eq!(dynamic_leverage(dec!(99.99)), 75);
        assert_eq!(dynamic_leverage(dec!(25)), 100);
        assert_eq!(dynamic_leverage(dec!(10)), 125);
    }

    #[test]
    fn risk_tiers() {
        assert_eq!(dynamic_risk_pct(dec!(500)), dec!(3));
        assert_eq!(dynamic_risk_pct(dec!(50)), dec!(5));
        assert_eq!(dynamic_risk_pct(dec!(49)), dec!(7));
    }
}
