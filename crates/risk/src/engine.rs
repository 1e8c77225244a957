use crate::bracket::{Bracket, BracketPolicy};
use crate::error::RiskError;
use crate::policy::{dynamic_leverage, dynamic_risk_pct};
use crate::sizing::{margin_check_with_ratio, margin_used, reward_ratio, size_position};
use configuration::RiskManagement;
use core_types::{PositionSide, RiskAssessment};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Composes bracket placement, sizing and the margin check into one assessment.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    params: RiskManagement,
    brackets: BracketPolicy,
}

impl RiskEngine {
    /// Creates a new `RiskEngine` with the given configuration parameters.
    pub fn new(params: RiskManagement) -> Result<Self, RiskError> {
        // Validate that risk parameters are logical.
        if let Some(pct) = params.risk_pct {
            if pct <= dec!(0) || pct > dec!(100) {
                return Err(RiskError::InvalidParameters(
                    "risk_pct must be in (0, 100]".to_string(),
                ));
            }
        }
        if params.leverage == Some(0) {
            return Err(RiskError::InvalidParameters(
                "leverage must be at least 1".to_string(),
            ));
        }
        if params.stop_atr_multiplier <= dec!(0) || params.fallback_stop_pct <= dec!(0) {
            return Err(RiskError::InvalidParameters(
                "stop distances must be greater than 0".to_string(),
            ));
        }
        if params.target_atr_multiplier <= dec!(0) || params.fallback_target_pct <= dec!(0) {
            return Err(RiskError::InvalidParameters(
                "target distances must be greater than 0".to_string(),
            ));
        }
        if params.margin_warning_ratio <= dec!(0) {
            return Err(RiskError::InvalidParameters(
                "margin_warning_ratio must be greater than 0".to_string(),
            ));
        }
        let brackets = BracketPolicy::from(&params);
        Ok(Self { params, brackets })
    }

    pub fn brackets(&self) -> &BracketPolicy {
        &self.brackets
    }

    /// Configured leverage, or the balance tier when none is fixed.
    pub fn leverage_for(&self, balance: Decimal) -> u8 {
        self.params.leverage.unwrap_or_else(|| dynamic_leverage(balance))
    }

    /// Configured risk percentage, or the balance tier when none is fixed.
    pub fn risk_pct_for(&self, balance: Decimal) -> Decimal {
        self.params.risk_pct.unwrap_or_else(|| dynamic_risk_pct(balance))
    }

    /// Leverage that will actually be set on a symbol allowing at most `max_leverage`.
    pub fn effective_leverage(&self, balance: Decimal, max_leverage: u8) -> u8 {
        self.leverage_for(balance).min(max_leverage).max(1)
    }

    /// Places a volatility bracket around `entry` and sizes the position for it.
    /// Sizing and the margin check use leverage capped at the symbol's `max_leverage`.
    pub fn assess(
        &self,
        side: PositionSide,
        balance: Decimal,
        entry: Decimal,
        atr: Option<Decimal>,
        max_leverage: u8,
    ) -> Result<RiskAssessment, RiskError> {
        let bracket = self.brackets.bracket(side, entry, atr)?;
        self.assess_bracket(side, balance, entry, bracket, max_leverage)
    }

    /// Sizes a position for a caller-supplied bracket.
    pub fn assess_bracket(
        &self,
        side: PositionSide,
        balance: Decimal,
        entry: Decimal,
        bracket: Bracket,
        max_leverage: u8,
    ) -> Result<RiskAssessment, RiskError> {
        // --- 1. Validation ---
        if entry <= dec!(0) {
            return Err(RiskError::InvalidEntryPrice(entry));
        }
        if balance <= dec!(0) {
            return Err(RiskError::InsufficientBalance(balance));
        }
        if bracket.stop == entry {
            return Err(RiskError::InvalidStop {
                entry,
                stop: bracket.stop,
            });
        }
        bracket.validate(side, entry)?;

        // --- 2. Size against the risk budget ---
        let leverage = self.effective_leverage(balance, max_leverage);
        let risk_pct = self.risk_pct_for(balance);
        let position_size = size_position(balance, risk_pct, entry, bracket.stop, leverage)?;
        let reward_to_risk_ratio = reward_ratio(entry, bracket.stop, bracket.target)?;

        // --- 3. Margin safety ---
        let (is_risky, margin_warning_level) = margin_check_with_ratio(
            balance,
            position_size,
            entry,
            leverage,
            self.params.margin_warning_ratio,
        );
        if is_risky {
            tracing::warn!(
                %side,
                %balance,
                %position_size,
                level = ?margin_warning_level,
                "Position margin is close to or above the available balance."
            );
        }

        Ok(RiskAssessment {
            side,
            position_size,
            entry_price: entry,
            stop_price: bracket.stop,
            target_price: bracket.target,
            reward_to_risk_ratio,
            leverage,
            margin_used: margin_used(position_size, entry, leverage)?,
            margin_warning_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::MarginLevel;

    fn params(risk_pct: Decimal, leverage: u8) -> RiskManagement {
        RiskManagement {
            risk_pct: Some(risk_pct),
            leverage: Some(leverage),
            ..RiskManagement::default()
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(RiskEngine::new(params(dec!(0), 10)).is_err());
        assert!(RiskEngine::new(params(dec!(101), 10)).is_err());
        assert!(RiskEngine::new(params(dec!(1), 0)).is_err());
    }

    #[test]
    fn assessment_combines_bracket_size_and_margin() {
        let engine = RiskEngine::new(params(dec!(0.5), 10)).unwrap();
        let a = engine
            .assess(PositionSide::Long, dec!(10000), dec!(100), Some(dec!(2)), 125)
            .unwrap();

        assert_eq!(a.stop_price, dec!(97));
        assert_eq!(a.target_price, dec!(105));
        // 50 at risk over a 3 point stop, times 10x.
        assert_eq!(a.position_size.round_dp(6), dec!(166.666667));
        assert_eq!(a.reward_to_risk_ratio.round_dp(4), dec!(1.6667));
        assert_eq!(a.leverage, 10);
        assert_eq!(a.margin_warning_level, MarginLevel::Ok);
    }

    #[test]
    fn blocked_assessment_is_reported_not_raised() {
        let engine = RiskEngine::new(params(dec!(50), 10)).unwrap();
        let a = engine
            .assess_bracket(
                PositionSide::Long,
                dec!(20),
                dec!(100),
                Bracket { stop: dec!(99), target: dec!(102) },
                125,
            )
            .unwrap();

        assert_eq!(a.position_size, dec!(100));
        assert_eq!(a.margin_warning_level, MarginLevel::Blocked);
    }

    #[test]
    fn stop_equal_to_entry_is_invalid() {
        let engine = RiskEngine::new(params(dec!(1), 10)).unwrap();
        let result = engine.assess_bracket(
            PositionSide::Short,
            dec!(100),
            dec!(100),
            Bracket { stop: dec!(100), target: dec!(95) },
            125,
        );
        assert!(matches!(result, Err(RiskError::InvalidStop { .. })));
    }

    #[test]
    fn leverage_is_capped_by_the_symbol_maximum() {
        let engine = RiskEngine::new(params(dec!(0.5), 50)).unwrap();
        let capped = engine
            .assess(PositionSide::Long, dec!(10000), dec!(100), Some(dec!(2)), 10)
            .unwrap();
        let uncapped = engine
            .assess(PositionSide::Long, dec!(10000), dec!(100), Some(dec!(2)), 125)
            .unwrap();

        assert_eq!(capped.leverage, 10);
        assert_eq!(uncapped.leverage, 50);
        // Size scales with leverage, so the margin stays the same.
        assert_eq!(
            (capped.position_size * dec!(5)).round_dp(6),
            uncapped.position_size.round_dp(6)
        );
        assert_eq!(capped.margin_used.round_dp(6), uncapped.margin_used.round_dp(6));
        assert_eq!(capped.margin_used, margin_used(capped.position_size, dec!(100), 10).unwrap());
        assert_eq!(engine.effective_leverage(dec!(10000), 0), 1);
    }

    #[test]
    fn capped_leverage_still_blocks_an_oversized_budget() {
        // 100% of 1000 over a 3 point stop at 100 needs 33333 of margin at any leverage.
        let engine = RiskEngine::new(params(dec!(100), 50)).unwrap();
        let a = engine
            .assess(PositionSide::Long, dec!(1000), dec!(100), Some(dec!(2)), 10)
            .unwrap();
        assert_eq!(a.leverage, 10);
        assert_eq!(a.margin_warning_level, MarginLevel::Blocked);
    }

    #[test]
    fn unset_leverage_and_risk_follow_balance_tiers() {
        let engine = RiskEngine::new(RiskManagement::default()).unwrap();
        assert_eq!(engine.leverage_for(dec!(40)), 100);
        assert_eq!(engine.risk_pct_for(dec!(40)), dec!(7));
    }
}
