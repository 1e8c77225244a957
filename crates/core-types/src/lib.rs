pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CloseReason, ExitLeg, MarginLevel, OrderSide, PositionSide, Signal};
pub use error::CoreError;
pub use structs::{
    Candle, ClosedPosition, ExchangePosition, ExchangeSymbolRules, OrderAck, OrderRequest,
    Position, PositionKey, PositionStatus, RiskAssessment, SignalRecord,
};
