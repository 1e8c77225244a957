use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// The wire representation used by the exchange (`BUY` / `SELL`).
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// The direction of an open futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn opposite(&self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }

    /// The order side that opens (or adds to) a position in this direction.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// The order side that reduces a position in this direction.
    pub fn exit_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// The directional output of the signal evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Signal {
    #[default]
    None,
    Long,
    Short,
}

impl Signal {
    /// The position side this signal asks for, if any.
    pub fn side(&self) -> Option<PositionSide> {
        match self {
            Signal::None => None,
            Signal::Long => Some(PositionSide::Long),
            Signal::Short => Some(PositionSide::Short),
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Signal::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::None => "NONE",
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
        }
    }
}

impl From<PositionSide> for Signal {
    fn from(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => Signal::Long,
            PositionSide::Short => Signal::Short,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" | "" => Ok(Signal::None),
            "LONG" => Ok(Signal::Long),
            "SHORT" => Ok(Signal::Short),
            other => Err(CoreError::UnknownSignal(other.to_string())),
        }
    }
}

/// Verdict of the margin-safety check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarginLevel {
    Ok,
    Warning,
    Blocked,
}

/// One of the reduce-only orders that protect an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitLeg {
    Stop,
    Target,
    Trailing,
}

impl fmt::Display for ExitLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitLeg::Stop => write!(f, "stop"),
            ExitLeg::Target => write!(f, "target"),
            ExitLeg::Trailing => write!(f, "trailing"),
        }
    }
}

/// Why a position left the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopTouched,
    TargetTouched,
    TrailingRetrace,
    Overextension,
    /// Closed to make room for the opposite side.
    Reversal,
    /// The exchange no longer reports the position (bracket fill or manual exit).
    ClosedOnExchange,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::StopTouched => "stop touched",
            CloseReason::TargetTouched => "target touched",
            CloseReason::TrailingRetrace => "trailing retracement",
            CloseReason::Overextension => "oscillator overextension",
            CloseReason::Reversal => "reversal",
            CloseReason::ClosedOnExchange => "closed on exchange",
            CloseReason::Manual => "manual",
        };
        f.write_str(text)
    }
}
