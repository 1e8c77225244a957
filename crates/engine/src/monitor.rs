//! Short-lived supervision of a freshly opened position.
//!
//! A monitor polls the mark price, folds it into the position's trailing extremes and
//! closes (or reverses) the position on the first exit condition that fires. It stops
//! on its own after the configured timeout, leaving the position to its exchange-side
//! exits, and cancels itself as soon as the ledger no longer holds the position it was
//! started for.

use crate::error::EngineError;
use configuration::MonitorConfig;
use core_types::{Candle, CloseReason, ClosedPosition, Position, PositionKey, PositionSide};
use executor::{EntryPlan, ExecutionEngine, ExecutionError};
use risk::Bracket;
use rust_decimal::Decimal;
use signals::oscillator_at_price;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    Stop,
    Target,
    TrailingRetrace,
    Overextension,
}

impl ExitTrigger {
    pub fn close_reason(self) -> CloseReason {
        match self {
            ExitTrigger::Stop => CloseReason::StopTouched,
            ExitTrigger::Target => CloseReason::TargetTouched,
            ExitTrigger::TrailingRetrace => CloseReason::TrailingRetrace,
            ExitTrigger::Overextension => CloseReason::Overextension,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// The stop was touched and the opposite side is now open.
    Reversed(Position),
    Closed(ClosedPosition),
    /// The deadline passed with the position still open.
    TimedOut,
    /// The ledger entry was cleared or replaced while monitoring.
    Cancelled,
}

/// The first exit condition `price` meets, checked stop, target, trailing
/// retracement, then oscillator overextension.
///
/// `position` must already include `price` in its extremes.
pub fn check_exit(
    position: &Position,
    price: Decimal,
    oscillator: Option<Decimal>,
    config: &MonitorConfig,
) -> Option<ExitTrigger> {
    let entry = position.entry_price;
    match position.side {
        PositionSide::Long => {
            if price <= position.stop_price {
                return Some(ExitTrigger::Stop);
            }
            if price >= position.target_price {
                return Some(ExitTrigger::Target);
            }
            let best = position.highest_price_seen;
            let activated = best >= entry * (Decimal::ONE + config.trailing_activation_pct);
            if activated && price <= best * (Decimal::ONE - config.trailing_retrace_pct) {
                return Some(ExitTrigger::TrailingRetrace);
            }
            if oscillator.is_some_and(|o| o >= config.oscillator_overbought) {
                return Some(ExitTrigger::Overextension);
            }
        }
        PositionSide::Short => {
            if price >= position.stop_price {
                return Some(ExitTrigger::Stop);
            }
            if price <= position.target_price {
                return Some(ExitTrigger::Target);
            }
            let best = position.lowest_price_seen;
            let activated = best <= entry * (Decimal::ONE - config.trailing_activation_pct);
            if activated && price >= best * (Decimal::ONE + config.trailing_retrace_pct) {
                return Some(ExitTrigger::TrailingRetrace);
            }
            if oscillator.is_some_and(|o| o <= config.oscillator_oversold) {
                return Some(ExitTrigger::Overextension);
            }
        }
    }
    None
}

pub struct MonitorTask {
    executor: Arc<ExecutionEngine>,
    config: MonitorConfig,
    key: PositionKey,
    position_id: Uuid,
    leverage: u8,
    /// The window the entry signal was computed on; its last close is replaced by
    /// the live price when the oscillator is recomputed.
    candles: Vec<Candle>,
    oscillator_period: usize,
}

impl MonitorTask {
    pub fn new(
        executor: Arc<ExecutionEngine>,
        config: MonitorConfig,
        position: &Position,
        leverage: u8,
        candles: Vec<Candle>,
        oscillator_period: usize,
    ) -> Self {
        Self {
            executor,
            config,
            key: position.key(),
            position_id: position.position_id,
            leverage,
            candles,
            oscillator_period,
        }
    }

    pub async fn run(self) -> Result<MonitorOutcome, EngineError> {
        let deadline = Instant::now() + self.config.timeout();
        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(key = %self.key, timeout = ?self.config.timeout(), "Monitor started.");

        loop {
            poll.tick().await;
            if Instant::now() >= deadline {
                tracing::info!(key = %self.key, "Monitor timed out; position left to its exchange exits.");
                return Ok(MonitorOutcome::TimedOut);
            }

            let price = match self.executor.api().get_mark_price(&self.key.symbol).await {
                Ok(price) => price,
                Err(e) if e.is_transient() => {
                    tracing::warn!(key = %self.key, error = %e, "Mark price unavailable, retrying next poll.");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let position = {
                let mut entry = self.executor.ledger().lock(&self.key).await;
                match entry.get_mut() {
                    Some(p) if p.position_id == self.position_id => {
                        p.observe_price(price);
                        p.clone()
                    }
                    _ => {
                        tracing::info!(key = %self.key, "Position left the ledger, monitor cancelled.");
                        return Ok(MonitorOutcome::Cancelled);
                    }
                }
            };

            let oscillator = oscillator_at_price(&self.candles, price, self.oscillator_period);
            let Some(trigger) = check_exit(&position, price, oscillator, &self.config) else {
                tracing::trace!(key = %self.key, %price, "No exit condition.");
                continue;
            };
            tracing::info!(key = %self.key, %price, ?trigger, "Exit condition met.");

            if trigger == ExitTrigger::Stop && self.config.auto_reversal {
                return self.reverse(&position, price).await;
            }
            return self.close(trigger.close_reason()).await;
        }
    }

    async fn close(&self, reason: CloseReason) -> Result<MonitorOutcome, EngineError> {
        Ok(match self.executor.close(&self.key, reason).await? {
            Some(closed) => MonitorOutcome::Closed(closed),
            None => MonitorOutcome::Cancelled,
        })
    }

    /// Enters the opposite side at `trigger` with the same quantity and bracket distances.
    async fn reverse(&self, position: &Position, trigger: Decimal) -> Result<MonitorOutcome, EngineError> {
        let bracket = Bracket {
            stop: position.stop_price,
            target: position.target_price,
        };
        let mirrored = match bracket.mirrored(position.side, position.entry_price, trigger) {
            Ok(mirrored) => mirrored,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Cannot mirror the bracket, closing instead.");
                return self.close(CloseReason::StopTouched).await;
            }
        };
        let plan = EntryPlan {
            quantity: position.quantity,
            entry_price: trigger,
            stop_price: mirrored.stop,
            target_price: mirrored.target,
            leverage: self.leverage,
        };

        let opposite = position.side.opposite();
        tracing::warn!(key = %self.key, from = %position.side, to = %opposite, %trigger, "Stop touched, reversing.");
        match self.executor.enter(&self.key, opposite, &plan).await {
            Ok(outcome) => Ok(MonitorOutcome::Reversed(outcome.position().clone())),
            // Opened but degraded; the next tick repairs its exits.
            Err(ExecutionError::PartialFire { position, .. }) => Ok(MonitorOutcome::Reversed(*position)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::PositionStatus;
    use rust_decimal_macros::dec;

    fn position(side: PositionSide) -> Position {
        let (stop, target) = match side {
            PositionSide::Long => (dec!(98), dec!(105)),
            PositionSide::Short => (dec!(102), dec!(95)),
        };
        Position {
            position_id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            interval: "15m".to_string(),
            side,
            entry_price: dec!(100),
            quantity: dec!(1),
            stop_price: stop,
            target_price: target,
            opened_at: Utc::now(),
            highest_price_seen: dec!(100),
            lowest_price_seen: dec!(100),
            status: PositionStatus::Open,
        }
    }

    fn observed(mut p: Position, prices: &[Decimal]) -> Position {
        for price in prices {
            p.observe_price(*price);
        }
        p
    }

    #[test]
    fn quiet_prices_trigger_nothing() {
        let config = MonitorConfig::default();
        let long = observed(position(PositionSide::Long), &[dec!(101)]);
        assert_eq!(check_exit(&long, dec!(101), Some(dec!(55)), &config), None);
    }

    #[test]
    fn stop_and_target_touches() {
        let config = MonitorConfig::default();
        let long = position(PositionSide::Long);
        assert_eq!(check_exit(&long, dec!(98), None, &config), Some(ExitTrigger::Stop));
        assert_eq!(check_exit(&long, dec!(105), None, &config), Some(ExitTrigger::Target));

        let short = position(PositionSide::Short);
        assert_eq!(check_exit(&short, dec!(102.5), None, &config), Some(ExitTrigger::Stop));
        assert_eq!(check_exit(&short, dec!(94), None, &config), Some(ExitTrigger::Target));
    }

    #[test]
    fn stop_takes_precedence_over_overextension() {
        let config = MonitorConfig::default();
        let short = position(PositionSide::Short);
        assert_eq!(
            check_exit(&short, dec!(103), Some(dec!(10)), &config),
            Some(ExitTrigger::Stop)
        );
    }

    #[test]
    fn retracement_needs_activation() {
        let config = MonitorConfig::default();

        // Best 101.5 is below the 102 activation level.
        let early = observed(position(PositionSide::Long), &[dec!(101.5), dec!(100.2)]);
        assert_eq!(check_exit(&early, dec!(100.2), None, &config), None);

        // Best 104 activates; 102.9 is more than 1% below it.
        let late = observed(position(PositionSide::Long), &[dec!(104), dec!(102.9)]);
        assert_eq!(
            check_exit(&late, dec!(102.9), None, &config),
            Some(ExitTrigger::TrailingRetrace)
        );
    }

    #[test]
    fn short_retracement_mirrors_long() {
        let config = MonitorConfig::default();
        let short = observed(position(PositionSide::Short), &[dec!(97), dec!(98.1)]);
        assert_eq!(
            check_exit(&short, dec!(98.1), None, &config),
            Some(ExitTrigger::TrailingRetrace)
        );
    }

    #[test]
    fn overextension_closes_against_the_position() {
        let config = MonitorConfig::default();
        let long = position(PositionSide::Long);
        let short = position(PositionSide::Short);

        assert_eq!(
            check_exit(&long, dec!(101), Some(dec!(72)), &config),
            Some(ExitTrigger::Overextension)
        );
        assert_eq!(check_exit(&long, dec!(101), Some(dec!(25)), &config), None);
        assert_eq!(
            check_exit(&short, dec!(99), Some(dec!(30)), &config),
            Some(ExitTrigger::Overextension)
        );
    }
}
