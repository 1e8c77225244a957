use crate::error::ExecutionError;
use crate::ledger::{LedgerEntry, PositionLedger};
use crate::precision::{normalize, round_exit_price};
use crate::rules::SymbolRulesCache;
use alerter::AlertSender;
use api_client::ApiClient;
use chrono::Utc;
use configuration::ExecutionConfig;
use core_types::{
    CloseReason, ClosedPosition, ExchangePosition, ExchangeSymbolRules, ExitLeg, OrderRequest,
    Position, PositionKey, PositionSide, PositionStatus, RiskAssessment,
};
use events::TradeEvent;
use risk::BracketPolicy;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What to enter: an unrounded size and bracket around a reference price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryPlan {
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub leverage: u8,
}

impl From<&RiskAssessment> for EntryPlan {
    fn from(assessment: &RiskAssessment) -> Self {
        Self {
            quantity: assessment.position_size,
            entry_price: assessment.entry_price,
            stop_price: assessment.stop_price,
            target_price: assessment.target_price,
            leverage: assessment.leverage,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// A new position was opened with every exit leg in place.
    Opened(Position),
    /// A same-side position was already live; nothing was submitted.
    AlreadyOpen(Position),
}

impl EntryOutcome {
    pub fn position(&self) -> &Position {
        match self {
            EntryOutcome::Opened(p) | EntryOutcome::AlreadyOpen(p) => p,
        }
    }
}

/// The ledger's view of a key after comparing it with the exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Flat,
    InSync(Position),
    /// The tracked position is gone from the exchange and was dropped from the ledger.
    ClosedOnExchange(ClosedPosition),
    /// An untracked exchange position was taken over. Its exits still need repair.
    Adopted(Position),
}

/// Places and unwinds positions, keeping the ledger in step with the exchange.
///
/// Every operation on a key runs under that key's ledger lock, so two calls for the
/// same key never interleave their orders.
pub struct ExecutionEngine {
    api: Arc<dyn ApiClient>,
    rules: SymbolRulesCache,
    ledger: Arc<PositionLedger>,
    alerts: AlertSender,
    config: ExecutionConfig,
    brackets: BracketPolicy,
    leverage: Mutex<HashMap<String, u8>>,
}

impl ExecutionEngine {
    pub fn new(
        api: Arc<dyn ApiClient>,
        ledger: Arc<PositionLedger>,
        alerts: AlertSender,
        config: ExecutionConfig,
        brackets: BracketPolicy,
    ) -> Self {
        Self {
            rules: SymbolRulesCache::new(api.clone()),
            api,
            ledger,
            alerts,
            config,
            brackets,
            leverage: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    pub fn api(&self) -> &Arc<dyn ApiClient> {
        &self.api
    }

    pub fn rules(&self) -> &SymbolRulesCache {
        &self.rules
    }

    /// Opens `side` on `key` according to `plan`.
    ///
    /// A live same-side position makes this a no-op. A live opposite position is
    /// closed first, under the same lock, before anything is submitted for the new side.
    pub async fn enter(
        &self,
        key: &PositionKey,
        side: PositionSide,
        plan: &EntryPlan,
    ) -> Result<EntryOutcome, ExecutionError> {
        if plan.leverage == 0 {
            return Err(ExecutionError::InvalidPlan("leverage must be at least 1".into()));
        }

        let mut entry = self.ledger.lock(key).await;
        self.sync_locked(&mut entry).await?;

        if let Some(existing) = entry.get().cloned() {
            if existing.side == side {
                tracing::info!(%key, %side, "Position already open on this side, nothing to do.");
                return Ok(EntryOutcome::AlreadyOpen(existing));
            }
            tracing::info!(%key, from = %existing.side, to = %side, "Closing opposite position before entry.");
            self.close_locked(&mut entry, CloseReason::Reversal).await?;
        }

        let rules = self.rules.get(&key.symbol).await?;
        let leverage = plan.leverage.min(rules.max_leverage).max(1);
        self.ensure_leverage(&key.symbol, leverage).await?;

        let order = normalize(
            side,
            plan.entry_price,
            plan.quantity,
            plan.stop_price,
            plan.target_price,
            &rules,
        )?;

        let ack = self
            .api
            .place_order(&OrderRequest::market_entry(&key.symbol, side, order.quantity))
            .await?;
        let fill_price = if ack.avg_price > Decimal::ZERO {
            ack.avg_price
        } else {
            plan.entry_price
        };
        let quantity = if ack.executed_qty > Decimal::ZERO {
            ack.executed_qty
        } else {
            order.quantity
        };
        tracing::info!(
            %key,
            %side,
            %quantity,
            %fill_price,
            leverage,
            order_id = ack.order_id,
            "Market entry filled."
        );

        let mut position = Position {
            position_id: Uuid::new_v4(),
            symbol: key.symbol.clone(),
            interval: key.interval.clone(),
            side,
            entry_price: fill_price,
            quantity,
            stop_price: order.stop_price,
            target_price: order.target_price,
            opened_at: Utc::now(),
            highest_price_seen: fill_price,
            lowest_price_seen: fill_price,
            status: PositionStatus::Open,
        };

        let missing_legs = self.place_exit_legs(&position, &rules).await;
        if !missing_legs.is_empty() {
            position.status = PositionStatus::Degraded {
                missing_legs: missing_legs.clone(),
            };
        }
        entry.put(position.clone());
        self.alerts.notify(TradeEvent::Entered(position.clone()));

        if missing_legs.is_empty() {
            Ok(EntryOutcome::Opened(position))
        } else {
            tracing::error!(%key, ?missing_legs, "Entry filled with exit legs missing.");
            Err(ExecutionError::PartialFire {
                position: Box::new(position),
                missing_legs,
            })
        }
    }

    /// Flattens the position on `key`. Returns `None` when nothing was tracked.
    pub async fn close(
        &self,
        key: &PositionKey,
        reason: CloseReason,
    ) -> Result<Option<ClosedPosition>, ExecutionError> {
        let mut entry = self.ledger.lock(key).await;
        self.close_locked(&mut entry, reason).await
    }

    /// Cancels whatever exits are resting and submits the full set again.
    pub async fn repair_exits(&self, key: &PositionKey) -> Result<Position, ExecutionError> {
        let mut entry = self.ledger.lock(key).await;
        let Some(mut position) = entry.get().cloned() else {
            return Err(ExecutionError::NoPosition(key.clone()));
        };

        let rules = self.rules.get(&key.symbol).await?;
        self.api.cancel_all_orders(&key.symbol).await?;
        let missing_legs = self.place_exit_legs(&position, &rules).await;

        position.status = if missing_legs.is_empty() {
            PositionStatus::Open
        } else {
            PositionStatus::Degraded {
                missing_legs: missing_legs.clone(),
            }
        };
        entry.put(position.clone());

        if missing_legs.is_empty() {
            tracing::info!(%key, "Exit legs repaired.");
            Ok(position)
        } else {
            tracing::warn!(%key, ?missing_legs, "Exit legs still missing after repair.");
            Err(ExecutionError::PartialFire {
                position: Box::new(position),
                missing_legs,
            })
        }
    }

    /// Reconciles the ledger entry for `key` with the exchange.
    pub async fn sync_with_exchange(&self, key: &PositionKey) -> Result<SyncOutcome, ExecutionError> {
        let mut entry = self.ledger.lock(key).await;
        self.sync_locked(&mut entry).await
    }

    async fn sync_locked(&self, entry: &mut LedgerEntry) -> Result<SyncOutcome, ExecutionError> {
        let symbol = entry.key().symbol.clone();
        let live = self.api.get_open_position(&symbol).await?;

        let tracked = match entry.get().cloned() {
            Some(tracked) => tracked,
            None => {
                return match live {
                    Some(live) => Ok(SyncOutcome::Adopted(self.adopt(entry, live))),
                    None => Ok(SyncOutcome::Flat),
                };
            }
        };

        if live.as_ref().is_some_and(|l| l.side == tracked.side) {
            return Ok(SyncOutcome::InSync(tracked));
        }

        // The exchange no longer holds what we track: a bracket leg filled or the
        // position was closed by hand. Leftover exits must not outlive it.
        self.api.cancel_all_orders(&symbol).await?;
        let exit_price = self.api.get_mark_price(&symbol).await?;
        entry.remove();
        let closed = ClosedPosition {
            realized_pnl: tracked.pnl_at(exit_price),
            exit_price,
            reason: CloseReason::ClosedOnExchange,
            closed_at: Utc::now(),
            position: tracked,
        };
        tracing::info!(key = %entry.key(), %exit_price, "Tracked position closed on the exchange.");
        self.alerts.notify(TradeEvent::Closed(closed.clone()));

        match live {
            Some(live) => Ok(SyncOutcome::Adopted(self.adopt(entry, live))),
            None => Ok(SyncOutcome::ClosedOnExchange(closed)),
        }
    }

    /// Takes over an exchange position with a fallback bracket and no confirmed exits.
    fn adopt(&self, entry: &mut LedgerEntry, live: ExchangePosition) -> Position {
        let (stop_price, target_price) = match self.brackets.bracket(live.side, live.entry_price, None) {
            Ok(bracket) => (bracket.stop, bracket.target),
            Err(e) => {
                tracing::warn!(error = %e, "Fallback bracket unusable, keeping entry as both levels.");
                (live.entry_price, live.entry_price)
            }
        };
        let position = Position {
            position_id: Uuid::new_v4(),
            symbol: live.symbol.clone(),
            interval: entry.key().interval.clone(),
            side: live.side,
            entry_price: live.entry_price,
            quantity: live.quantity,
            stop_price,
            target_price,
            opened_at: Utc::now(),
            highest_price_seen: live.entry_price.max(live.mark_price),
            lowest_price_seen: live.entry_price.min(live.mark_price),
            status: PositionStatus::Degraded {
                missing_legs: self.leg_set(),
            },
        };
        tracing::warn!(
            key = %entry.key(),
            side = %position.side,
            quantity = %position.quantity,
            "Adopted untracked exchange position."
        );
        entry.put(position.clone());
        position
    }

    async fn close_locked(
        &self,
        entry: &mut LedgerEntry,
        reason: CloseReason,
    ) -> Result<Option<ClosedPosition>, ExecutionError> {
        let Some(position) = entry.get().cloned() else {
            return Ok(None);
        };
        let symbol = position.symbol.clone();

        self.api.cancel_all_orders(&symbol).await?;
        let live = self
            .api
            .get_open_position(&symbol)
            .await?
            .filter(|l| l.side == position.side);

        let exit_price = match live {
            Some(live) => {
                let ack = self
                    .api
                    .place_order(&OrderRequest::market_exit(&symbol, position.side, live.quantity))
                    .await?;
                if ack.avg_price > Decimal::ZERO {
                    ack.avg_price
                } else {
                    live.mark_price
                }
            }
            None => self.api.get_mark_price(&symbol).await?,
        };

        entry.remove();
        let closed = ClosedPosition {
            realized_pnl: position.pnl_at(exit_price),
            exit_price,
            reason,
            closed_at: Utc::now(),
            position,
        };
        tracing::info!(
            key = %entry.key(),
            %reason,
            %exit_price,
            pnl = %closed.realized_pnl,
            "Position closed."
        );
        self.alerts.notify(TradeEvent::Closed(closed.clone()));
        Ok(Some(closed))
    }

    /// Sets leverage only when the exchange holds a different value.
    async fn ensure_leverage(&self, symbol: &str, desired: u8) -> Result<(), ExecutionError> {
        let cached = self.leverage.lock().await.get(symbol).copied();
        let current = match cached {
            Some(leverage) => Some(leverage),
            None => self.api.get_leverage(symbol).await?,
        };
        if current != Some(desired) {
            self.api.set_leverage(symbol, desired).await?;
            tracing::info!(symbol, leverage = desired, "Leverage updated.");
        }
        self.leverage.lock().await.insert(symbol.to_string(), desired);
        Ok(())
    }

    fn leg_set(&self) -> Vec<ExitLeg> {
        let mut legs = vec![ExitLeg::Stop, ExitLeg::Target];
        if self.config.trailing_enabled {
            legs.push(ExitLeg::Trailing);
        }
        legs
    }

    fn exit_orders(&self, position: &Position, rules: &ExchangeSymbolRules) -> Vec<OrderRequest> {
        let side = position.side;
        let exit_side = side.exit_side();
        let tick = rules.price_tick;

        let mut orders = vec![
            OrderRequest::StopExit {
                client_order_id: Uuid::new_v4(),
                symbol: position.symbol.clone(),
                side: exit_side,
                quantity: position.quantity,
                stop_price: round_exit_price(side, position.stop_price, tick),
            },
            OrderRequest::TargetExit {
                client_order_id: Uuid::new_v4(),
                symbol: position.symbol.clone(),
                side: exit_side,
                quantity: position.quantity,
                target_price: round_exit_price(side, position.target_price, tick),
            },
        ];

        if self.config.trailing_enabled {
            let offset = position.entry_price * self.config.trailing_activation_pct;
            let activation = match side {
                PositionSide::Long => position.entry_price + offset,
                PositionSide::Short => position.entry_price - offset,
            };
            orders.push(OrderRequest::TrailingExit {
                client_order_id: Uuid::new_v4(),
                symbol: position.symbol.clone(),
                side: exit_side,
                quantity: position.quantity,
                callback_rate: self.config.trailing_callback_rate,
                activation_price: round_exit_price(side, activation, tick),
            });
        }
        orders
    }

    /// Submits every exit leg, returning the ones the exchange did not accept.
    async fn place_exit_legs(&self, position: &Position, rules: &ExchangeSymbolRules) -> Vec<ExitLeg> {
        let mut missing = Vec::new();
        for order in self.exit_orders(position, rules) {
            let Some(leg) = order.exit_leg() else {
                continue;
            };
            match self.api.place_order(&order).await {
                Ok(ack) => {
                    tracing::debug!(symbol = %position.symbol, %leg, order_id = ack.order_id, "Exit leg resting.");
                }
                Err(e) => {
                    tracing::warn!(symbol = %position.symbol, %leg, error = %e, "Exit leg rejected.");
                    missing.push(leg);
                }
            }
        }
        missing
    }
}
