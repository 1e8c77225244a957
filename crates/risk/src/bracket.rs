use crate::error::RiskError;
use configuration::RiskManagement;
use core_types::PositionSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stop and target prices around an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub stop: Decimal,
    pub target: Decimal,
}

impl Bracket {
    /// Places the bracket `stop_distance` against and `target_distance` in favour of `side`.
    pub fn around(
        side: PositionSide,
        entry: Decimal,
        stop_distance: Decimal,
        target_distance: Decimal,
    ) -> Result<Self, RiskError> {
        if entry <= Decimal::ZERO {
            return Err(RiskError::InvalidEntryPrice(entry));
        }
        let bracket = match side {
            PositionSide::Long => Self {
                stop: entry - stop_distance,
                target: entry + target_distance,
            },
            PositionSide::Short => Self {
                stop: entry + stop_distance,
                target: entry - target_distance,
            },
        };
        bracket.validate(side, entry)?;
        Ok(bracket)
    }

    /// The same distances re-applied for the opposite side at `trigger`.
    ///
    /// Used when a stopped-out position is reversed.
    pub fn mirrored(
        &self,
        side: PositionSide,
        entry: Decimal,
        trigger: Decimal,
    ) -> Result<Self, RiskError> {
        Self::around(
            side.opposite(),
            trigger,
            self.stop_distance(entry),
            self.target_distance(entry),
        )
    }

    pub fn stop_distance(&self, entry: Decimal) -> Decimal {
        (entry - self.stop).abs()
    }

    pub fn target_distance(&self, entry: Decimal) -> Decimal {
        (self.target - entry).abs()
    }

    /// A long bracket must read stop < entry < target, a short one the reverse,
    /// and every price must stay positive.
    pub fn validate(&self, side: PositionSide, entry: Decimal) -> Result<(), RiskError> {
        let ordered = match side {
            PositionSide::Long => self.stop < entry && entry < self.target,
            PositionSide::Short => self.target < entry && entry < self.stop,
        };
        if !ordered || self.stop <= Decimal::ZERO || self.target <= Decimal::ZERO {
            return Err(RiskError::InvalidStop {
                entry,
                stop: self.stop,
            });
        }
        Ok(())
    }
}

/// How brackets are derived from volatility.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketPolicy {
    pub stop_atr_multiplier: Decimal,
    pub target_atr_multiplier: Decimal,
    pub fallback_stop_pct: Decimal,
    pub fallback_target_pct: Decimal,
}

impl From<&RiskManagement> for BracketPolicy {
    fn from(params: &RiskManagement) -> Self {
        Self {
            stop_atr_multiplier: params.stop_atr_multiplier,
            target_atr_multiplier: params.target_atr_multiplier,
            fallback_stop_pct: params.fallback_stop_pct,
            fallback_target_pct: params.fallback_target_pct,
        }
    }
}

impl BracketPolicy {
    /// ATR-scaled bracket, or a fixed percentage of entry when ATR is unknown or zero.
    pub fn bracket(
        &self,
        side: PositionSide,
        entry: Decimal,
        atr: Option<Decimal>,
    ) -> Result<Bracket, RiskError> {
        let (stop_distance, target_distance) = match atr.filter(|a| *a > Decimal::ZERO) {
            Some(atr) => (atr * self.stop_atr_multiplier, atr * self.target_atr_multiplier),
            None => (entry * self.fallback_stop_pct, entry * self.fallback_target_pct),
        };
        Bracket::around(side, entry, stop_distance, target_distance)
    }
}
