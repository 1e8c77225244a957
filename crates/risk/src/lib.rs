//! # Apex Risk
//!
//! Position sizing under an account-risk budget, bracket placement and the
//! margin-safety check. Everything here is pure and synchronous.

pub mod bracket;
pub mod engine;
pub mod error;
pub mod policy;
pub mod sizing;

pub use bracket::{Bracket, BracketPolicy};
pub use engine::RiskEngine;
pub use error::RiskError;
pub use policy::{dynamic_leverage, dynamic_risk_pct};
pub use sizing::{
    margin_check, margin_check_with_ratio, margin_used, profit_pct, reward_ratio, size_position,
};
