use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{ClosedPosition, Position, PositionStatus, Signal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a candidate trade was not placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionNotice {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub interval: String,
    pub signal: Signal,
    pub reason: String,
}

/// The top-level notification enum.
///
/// Serialized adjacently tagged, e.g. `{"type": "Closed", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TradeEvent {
    /// A position was opened. A `Degraded` status means some exit legs are missing.
    Entered(Position),
    /// A position left the ledger.
    Closed(ClosedPosition),
    /// A signal was acted on but sizing, margin or the exchange refused it.
    Rejected(RejectionNotice),
}

impl TradeEvent {
    pub fn rejected(symbol: &str, interval: &str, signal: Signal, reason: impl Into<String>) -> Self {
        TradeEvent::Rejected(RejectionNotice {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            signal,
            reason: reason.into(),
        })
    }

    pub fn symbol(&self) -> &str {
        match self {
            TradeEvent::Entered(position) => &position.symbol,
            TradeEvent::Closed(closed) => &closed.position.symbol,
            TradeEvent::Rejected(notice) => &notice.symbol,
        }
    }

    /// A short plain-text rendering suitable for chat or log output.
    pub fn summary(&self) -> String {
        match self {
            TradeEvent::Entered(p) => {
                let mut text = format!(
                    "ENTERED {} {} [{}] qty {} @ {} | stop {} | target {}",
                    p.side, p.symbol, p.interval, p.quantity, p.entry_price, p.stop_price, p.target_price
                );
                if let PositionStatus::Degraded { missing_legs } = &p.status {
                    let legs: Vec<String> = missing_legs.iter().map(|l| l.to_string()).collect();
                    text.push_str(&format!(" | MISSING EXITS: {}", legs.join(", ")));
                }
                text
            }
            TradeEvent::Closed(c) => format!(
                "CLOSED {} {} [{}] @ {} ({}) | PnL {} ({}%)",
                c.position.side,
                c.position.symbol,
                c.position.interval,
                c.exit_price,
                c.reason,
                c.realized_pnl.round_dp(4),
                pnl_percent(c).round_dp(2)
            ),
            TradeEvent::Rejected(r) => format!(
                "REJECTED {} {} [{}]: {}",
                r.signal, r.symbol, r.interval, r.reason
            ),
        }
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Realised PnL relative to the entry notional, in percent.
fn pnl_percent(closed: &ClosedPosition) -> Decimal {
    let notional = closed.position.entry_price * closed.position.quantity;
    if notional.is_zero() {
        return Decimal::ZERO;
    }
    closed.realized_pnl / notional * Decimal::ONE_HUNDRED
}
