use crate::enums::{CloseReason, ExitLeg, MarginLevel, OrderSide, PositionSide, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One OHLCV sample for a fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
}

/// The ledger key: one position at most per symbol and interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub symbol: String,
    pub interval: String,
}

impl PositionKey {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbol, self.interval)
    }
}

/// Health of the exit legs attached to a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Entry and every configured exit leg are resting on the exchange.
    Open,
    /// The entry filled but some exit legs are missing. Must be repaired before new signals.
    Degraded { missing_legs: Vec<ExitLeg> },
}

/// A live position tracked by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub symbol: String,
    pub interval: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub highest_price_seen: Decimal,
    pub lowest_price_seen: Decimal,
    pub status: PositionStatus,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.symbol.clone(), self.interval.clone())
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, PositionStatus::Degraded { .. })
    }

    /// Folds a new price observation into the trailing extremes.
    pub fn observe_price(&mut self, price: Decimal) {
        self.highest_price_seen = self.highest_price_seen.max(price);
        self.lowest_price_seen = self.lowest_price_seen.min(price);
    }

    /// Profit or loss of the full quantity if closed at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => (price - self.entry_price) * self.quantity,
            PositionSide::Short => (self.entry_price - price) * self.quantity,
        }
    }
}

/// A position that has been removed from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

/// Trading constraints published by the exchange for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSymbolRules {
    pub quantity_step: Decimal,
    pub quantity_min: Decimal,
    pub price_tick: Decimal,
    pub minimum_notional: Decimal,
    pub max_leverage: u8,
}

/// The exchange's own view of the position held on a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: u8,
}

/// An order to be sent to the exchange. Each variant carries only the fields its order type needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OrderRequest {
    MarketEntry {
        client_order_id: Uuid,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
    },
    /// Reduce-only market order used to flatten a position.
    MarketExit {
        client_order_id: Uuid,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
    },
    StopExit {
        client_order_id: Uuid,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    },
    TargetExit {
        client_order_id: Uuid,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        target_price: Decimal,
    },
    TrailingExit {
        client_order_id: Uuid,
        symbol: String,
        side: OrderSide,
        quantity: Decimal,
        /// Percentage retracement from the extreme, e.g. `1.0` for 1%.
        callback_rate: Decimal,
        activation_price: Decimal,
    },
}

impl OrderRequest {
    pub fn market_entry(symbol: &str, side: PositionSide, quantity: Decimal) -> Self {
        OrderRequest::MarketEntry {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: side.entry_side(),
            quantity,
        }
    }

    pub fn market_exit(symbol: &str, side: PositionSide, quantity: Decimal) -> Self {
        OrderRequest::MarketExit {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: side.exit_side(),
            quantity,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            OrderRequest::MarketEntry { symbol, .. }
            | OrderRequest::MarketExit { symbol, .. }
            | OrderRequest::StopExit { symbol, .. }
            | OrderRequest::TargetExit { symbol, .. }
            | OrderRequest::TrailingExit { symbol, .. } => symbol,
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            OrderRequest::MarketEntry { side, .. }
            | OrderRequest::MarketExit { side, .. }
            | OrderRequest::StopExit { side, .. }
            | OrderRequest::TargetExit { side, .. }
            | OrderRequest::TrailingExit { side, .. } => *side,
        }
    }

    pub fn quantity(&self) -> Decimal {
        match self {
            OrderRequest::MarketEntry { quantity, .. }
            | OrderRequest::MarketExit { quantity, .. }
            | OrderRequest::StopExit { quantity, .. }
            | OrderRequest::TargetExit { quantity, .. }
            | OrderRequest::TrailingExit { quantity, .. } => *quantity,
        }
    }

    pub fn client_order_id(&self) -> Uuid {
        match self {
            OrderRequest::MarketEntry { client_order_id, .. }
            | OrderRequest::MarketExit { client_order_id, .. }
            | OrderRequest::StopExit { client_order_id, .. }
            | OrderRequest::TargetExit { client_order_id, .. }
            | OrderRequest::TrailingExit { client_order_id, .. } => *client_order_id,
        }
    }

    /// Every variant except `MarketEntry` may only shrink a position.
    pub fn is_reduce_only(&self) -> bool {
        !matches!(self, OrderRequest::MarketEntry { .. })
    }

    /// The exit leg this order implements, if it is one.
    pub fn exit_leg(&self) -> Option<ExitLeg> {
        match self {
            OrderRequest::StopExit { .. } => Some(ExitLeg::Stop),
            OrderRequest::TargetExit { .. } => Some(ExitLeg::Target),
            OrderRequest::TrailingExit { .. } => Some(ExitLeg::Trailing),
            _ => None,
        }
    }
}

/// The exchange's acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: i64,
    pub client_order_id: String,
    pub status: String,
    /// Average fill price; zero for resting (unfilled) orders.
    pub avg_price: Decimal,
    pub executed_qty: Decimal,
}

/// The outcome of sizing a candidate entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub side: PositionSide,
    pub position_size: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub reward_to_risk_ratio: Decimal,
    pub leverage: u8,
    pub margin_used: Decimal,
    pub margin_warning_level: MarginLevel,
}

/// The persisted memory of the last action taken for a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: Signal,
    pub candle_time: DateTime<Utc>,
    pub acted_at: DateTime<Utc>,
}
