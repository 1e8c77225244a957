use crate::error::EngineError;
use chrono::{DateTime, Utc};
use core_types::{Position, Signal, SignalRecord};

/// Where a bot is in its entry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Idle,
    Sizing,
    Entering,
    Monitoring,
}

impl BotState {
    pub fn can_transition_to(self, next: BotState) -> bool {
        use BotState::*;
        matches!(
            (self, next),
            (Idle, Sizing)
                | (Sizing, Entering)
                | (Sizing, Idle)
                | (Entering, Monitoring)
                | (Entering, Idle)
                | (Monitoring, Idle)
        )
    }
}

/// Tracks one bot's state and refuses transitions outside the entry cycle.
#[derive(Debug, Clone)]
pub struct BotStateMachine {
    state: BotState,
}

impl Default for BotStateMachine {
    fn default() -> Self {
        Self {
            state: BotState::Idle,
        }
    }
}

impl BotStateMachine {
    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn advance(&mut self, next: BotState) -> Result<(), EngineError> {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = ?self.state, to = ?next, "Refused invalid state transition.");
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = ?self.state, to = ?next, "State transition.");
        self.state = next;
        Ok(())
    }

    /// Returns to `Idle` from wherever the cycle was abandoned.
    pub fn reset(&mut self) {
        if self.state != BotState::Idle {
            tracing::debug!(from = ?self.state, "State reset to Idle.");
        }
        self.state = BotState::Idle;
    }
}

/// Whether `signal` on the candle opened at `candle_time` repeats the last action.
///
/// It does when it matches the last acted signal and either comes from the same
/// candle or a position on that side is still open.
pub fn is_duplicate(
    last: Option<&SignalRecord>,
    signal: Signal,
    candle_time: DateTime<Utc>,
    open: Option<&Position>,
) -> bool {
    let Some(last) = last else {
        return false;
    };
    if last.signal != signal {
        return false;
    }
    last.candle_time == candle_time || open.is_some_and(|p| Some(p.side) == signal.side())
}
