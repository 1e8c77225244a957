//! A scripted, in-memory futures exchange.
//!
//! `MockExchange` fills market orders at the current mark price, keeps one net
//! position per symbol, rests exit orders without ever triggering them, and records
//! every accepted order so tests can assert on the exact sequence sent.

use crate::ApiClient;
use crate::error::ApiError;
use async_trait::async_trait;
use core_types::{
    Candle, ExchangePosition, ExchangeSymbolRules, OrderAck, OrderRequest, OrderSide,
    PositionSide,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// Every exchange operation the mock can count or fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    FetchCandles,
    SetLeverage,
    GetLeverage,
    SymbolRules,
    MarketEntry,
    MarketExit,
    StopExit,
    TargetExit,
    TrailingExit,
    CancelAll,
    OpenPosition,
    MarkPrice,
    Balance,
}

impl MockOp {
    fn for_order(order: &OrderRequest) -> Self {
        match order {
            OrderRequest::MarketEntry { .. } => MockOp::MarketEntry,
            OrderRequest::MarketExit { .. } => MockOp::MarketExit,
            OrderRequest::StopExit { .. } => MockOp::StopExit,
            OrderRequest::TargetExit { .. } => MockOp::TargetExit,
            OrderRequest::TrailingExit { .. } => MockOp::TrailingExit,
        }
    }
}

#[derive(Default)]
struct MockState {
    candles: HashMap<(String, String), Vec<Candle>>,
    marks: HashMap<String, VecDeque<Decimal>>,
    rules: HashMap<String, ExchangeSymbolRules>,
    positions: HashMap<String, ExchangePosition>,
    leverage: HashMap<String, u8>,
    balances: HashMap<String, Decimal>,
    orders: Vec<OrderRequest>,
    resting: HashMap<String, Vec<OrderRequest>>,
    failures: HashMap<MockOp, VecDeque<ApiError>>,
    calls: HashMap<MockOp, usize>,
    next_order_id: i64,
}

impl MockState {
    fn record(&mut self, op: MockOp) -> Result<(), ApiError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The price fills happen at: the head of the scripted queue.
    fn current_mark(&self, symbol: &str) -> Result<Decimal, ApiError> {
        self.marks
            .get(symbol)
            .and_then(|queue| queue.front().copied())
            .ok_or_else(|| ApiError::Exchange {
                code: -1121,
                msg: format!("no mark price scripted for {symbol}"),
            })
    }

    fn rules(&self, symbol: &str) -> Result<&ExchangeSymbolRules, ApiError> {
        self.rules
            .get(symbol)
            .ok_or_else(|| ApiError::UnknownSymbol(symbol.to_string()))
    }

    fn ack(&mut self, order: &OrderRequest, status: &str, avg_price: Decimal, qty: Decimal) -> OrderAck {
        self.next_order_id += 1;
        OrderAck {
            order_id: self.next_order_id,
            client_order_id: order.client_order_id().simple().to_string(),
            status: status.to_string(),
            avg_price,
            executed_qty: qty,
        }
    }

    fn check_precision(&self, order: &OrderRequest) -> Result<(), ApiError> {
        let rules = self.rules(order.symbol())?;
        let qty = order.quantity();
        if qty <= Decimal::ZERO || (qty % rules.quantity_step) != Decimal::ZERO {
            return Err(ApiError::InvalidPrecision(format!(
                "quantity {qty} is not a multiple of {}",
                rules.quantity_step
            )));
        }
        if qty < rules.quantity_min {
            return Err(ApiError::InvalidPrecision(format!(
                "quantity {qty} below minimum {}",
                rules.quantity_min
            )));
        }
        Ok(())
    }

    fn fill_entry(&mut self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        self.check_precision(order)?;
        let symbol = order.symbol().to_string();
        let qty = order.quantity();
        let price = self.current_mark(&symbol)?;
        let rules = self.rules(&symbol)?;
        if qty * price < rules.minimum_notional {
            return Err(ApiError::MinNotional(format!(
                "notional {} below {}",
                qty * price,
                rules.minimum_notional
            )));
        }

        let leverage = self.leverage.get(&symbol).copied().unwrap_or(1).max(1);
        let margin = qty * price / Decimal::from(leverage);
        let balance = self.balances.entry("USDT".to_string()).or_default();
        if margin > *balance {
            return Err(ApiError::InsufficientMargin(format!(
                "margin {margin} exceeds available {balance}"
            )));
        }
        *balance -= margin;

        let side = match order.side() {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };
        match self.positions.get_mut(&symbol) {
            Some(existing) if existing.side == side => {
                let total = existing.quantity + qty;
                existing.entry_price =
                    (existing.entry_price * existing.quantity + price * qty) / total;
                existing.quantity = total;
                existing.mark_price = price;
            }
            Some(_) => {
                return Err(ApiError::Exchange {
                    code: -4061,
                    msg: "entry against an open opposite position".to_string(),
                });
            }
            None => {
                self.positions.insert(
                    symbol.clone(),
                    ExchangePosition {
                        symbol: symbol.clone(),
                        side,
                        quantity: qty,
                        entry_price: price,
                        mark_price: price,
                        unrealized_pnl: Decimal::ZERO,
                        leverage,
                    },
                );
            }
        }

        self.orders.push(order.clone());
        Ok(self.ack(order, "FILLED", price, qty))
    }

    fn fill_exit(&mut self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let symbol = order.symbol().to_string();
        let price = self.current_mark(&symbol)?;
        let position = self
            .positions
            .get_mut(&symbol)
            .filter(|p| p.side.exit_side() == order.side())
            .ok_or_else(|| ApiError::Exchange {
                code: -2022,
                msg: "ReduceOnly Order is rejected.".to_string(),
            })?;

        let qty = order.quantity().min(position.quantity);
        let pnl = match position.side {
            PositionSide::Long => (price - position.entry_price) * qty,
            PositionSide::Short => (position.entry_price - price) * qty,
        };
        let released = qty * position.entry_price / Decimal::from(position.leverage.max(1));
        position.quantity -= qty;
        if position.quantity.is_zero() {
            self.positions.remove(&symbol);
        }
        *self.balances.entry("USDT".to_string()).or_default() += released + pnl;

        self.orders.push(order.clone());
        Ok(self.ack(order, "FILLED", price, qty))
    }

    fn rest_exit(&mut self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        self.check_precision(order)?;
        let symbol = order.symbol().to_string();
        let mark = self.current_mark(&symbol)?;

        // Stop legs must sit beyond the mark on the losing side, targets on the winning side.
        let would_trigger = match order {
            OrderRequest::StopExit { side, stop_price, .. } => match side {
                OrderSide::Sell => *stop_price >= mark,
                OrderSide::Buy => *stop_price <= mark,
            },
            OrderRequest::TargetExit { side, target_price, .. } => match side {
                OrderSide::Sell => *target_price <= mark,
                OrderSide::Buy => *target_price >= mark,
            },
            _ => false,
        };
        if would_trigger {
            return Err(ApiError::WouldTrigger(format!(
                "trigger price would fire at mark {mark}"
            )));
        }

        self.orders.push(order.clone());
        self.resting.entry(symbol).or_default().push(order.clone());
        Ok(self.ack(order, "NEW", Decimal::ZERO, Decimal::ZERO))
    }
}

/// Scripted exchange for tests and dry runs.
#[derive(Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_candles(&self, symbol: &str, interval: &str, candles: Vec<Candle>) {
        self.state
            .lock()
            .await
            .candles
            .insert((symbol.to_string(), interval.to_string()), candles);
    }

    /// Queues mark prices. Each `get_mark_price` call consumes one; the last one sticks.
    pub async fn set_marks(&self, symbol: &str, marks: impl IntoIterator<Item = Decimal>) {
        self.state
            .lock()
            .await
            .marks
            .insert(symbol.to_string(), marks.into_iter().collect());
    }

    pub async fn set_rules(&self, symbol: &str, rules: ExchangeSymbolRules) {
        self.state.lock().await.rules.insert(symbol.to_string(), rules);
    }

    pub async fn set_balance(&self, asset: &str, balance: Decimal) {
        self.state
            .lock()
            .await
            .balances
            .insert(asset.to_string(), balance);
    }

    pub async fn set_leverage_value(&self, symbol: &str, leverage: u8) {
        self.state.lock().await.leverage.insert(symbol.to_string(), leverage);
    }

    /// Installs a position as if it had been opened outside this process.
    pub async fn set_position(&self, position: ExchangePosition) {
        self.state
            .lock()
            .await
            .positions
            .insert(position.symbol.clone(), position);
    }

    /// Drops the position and its resting orders, as if a bracket order had filled.
    pub async fn clear_position(&self, symbol: &str) {
        let mut state = self.state.lock().await;
        state.positions.remove(symbol);
        state.resting.remove(symbol);
    }

    /// Makes the next call of `op` fail with `err`. Calls queue up in order.
    pub async fn fail_next(&self, op: MockOp, err: ApiError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub async fn calls(&self, op: MockOp) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Every order the exchange accepted, in submission order.
    pub async fn orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.orders.clone()
    }

    pub async fn orders_of(&self, op: MockOp) -> Vec<OrderRequest> {
        self.state
            .lock()
            .await
            .orders
            .iter()
            .filter(|o| MockOp::for_order(o) == op)
            .cloned()
            .collect()
    }

    pub async fn resting_orders(&self, symbol: &str) -> Vec<OrderRequest> {
        self.state
            .lock()
            .await
            .resting
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn position(&self, symbol: &str) -> Option<ExchangePosition> {
        self.state.lock().await.positions.get(symbol).cloned()
    }
}

#[async_trait]
impl ApiClient for MockExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::FetchCandles)?;
        let candles = state
            .candles
            .get(&(symbol.to_string(), interval.to_string()))
            .cloned()
            .unwrap_or_default();
        let skip = candles.len().saturating_sub(usize::from(limit));
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::SetLeverage)?;
        let max = state.rules(symbol)?.max_leverage;
        if leverage == 0 || leverage > max {
            return Err(ApiError::Exchange {
                code: -4028,
                msg: format!("Leverage {leverage} is not valid"),
            });
        }
        state.leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn get_leverage(&self, symbol: &str) -> Result<Option<u8>, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::GetLeverage)?;
        Ok(state.leverage.get(symbol).copied())
    }

    async fn get_symbol_rules(&self, symbol: &str) -> Result<ExchangeSymbolRules, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::SymbolRules)?;
        state.rules(symbol).cloned()
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::for_order(order))?;
        match order {
            OrderRequest::MarketEntry { .. } => state.fill_entry(order),
            OrderRequest::MarketExit { .. } => state.fill_exit(order),
            _ => state.rest_exit(order),
        }
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::CancelAll)?;
        state.resting.remove(symbol);
        Ok(())
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::OpenPosition)?;
        Ok(state.positions.get(symbol).cloned())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::MarkPrice)?;
        let mark = state.current_mark(symbol)?;
        if let Some(queue) = state.marks.get_mut(symbol) {
            if queue.len() > 1 {
                queue.pop_front();
            }
        }
        Ok(mark)
    }

    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, ApiError> {
        let mut state = self.state.lock().await;
        state.record(MockOp::Balance)?;
        Ok(state.balances.get(asset).copied().unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> ExchangeSymbolRules {
        ExchangeSymbolRules {
            quantity_step: dec!(0.001),
            quantity_min: dec!(0.001),
            price_tick: dec!(0.1),
            minimum_notional: dec!(5),
            max_leverage: 125,
        }
    }

    async fn exchange() -> MockExchange {
        let mock = MockExchange::new();
        mock.set_rules("BTCUSDT", rules()).await;
        mock.set_balance("USDT", dec!(1000)).await;
        mock.set_leverage_value("BTCUSDT", 10).await;
        mock.set_marks("BTCUSDT", [dec!(100)]).await;
        mock
    }

    #[tokio::test]
    async fn mark_prices_are_consumed_and_the_last_one_sticks() {
        let mock = exchange().await;
        mock.set_marks("BTCUSDT", [dec!(101), dec!(99.5)]).await;

        assert_eq!(mock.get_mark_price("BTCUSDT").await.unwrap(), dec!(101));
        assert_eq!(mock.get_mark_price("BTCUSDT").await.unwrap(), dec!(99.5));
        assert_eq!(mock.get_mark_price("BTCUSDT").await.unwrap(), dec!(99.5));
    }

    #[tokio::test]
    async fn entry_then_exit_round_trips_the_position() {
        let mock = exchange().await;

        let entry = OrderRequest::market_entry("BTCUSDT", PositionSide::Long, dec!(1));
        let ack = mock.place_order(&entry).await.unwrap();
        assert_eq!(ack.avg_price, dec!(100));

        let position = mock.position("BTCUSDT").await.unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.quantity, dec!(1));

        let exit = OrderRequest::market_exit("BTCUSDT", PositionSide::Long, dec!(1));
        mock.place_order(&exit).await.unwrap();
        assert!(mock.position("BTCUSDT").await.is_none());
        assert_eq!(
            mock.get_available_balance("USDT").await.unwrap(),
            dec!(1000)
        );
    }

    #[tokio::test]
    async fn reduce_only_exit_without_position_is_rejected() {
        let mock = exchange().await;
        let exit = OrderRequest::market_exit("BTCUSDT", PositionSide::Short, dec!(1));

        assert!(matches!(
            mock.place_order(&exit).await,
            Err(ApiError::Exchange { code: -2022, .. })
        ));
    }

    #[tokio::test]
    async fn off_step_quantity_is_a_precision_error() {
        let mock = exchange().await;
        let entry = OrderRequest::market_entry("BTCUSDT", PositionSide::Long, dec!(0.0015));

        assert!(matches!(
            mock.place_order(&entry).await,
            Err(ApiError::InvalidPrecision(_))
        ));
    }

    #[tokio::test]
    async fn scripted_failures_fire_once_and_are_counted() {
        let mock = exchange().await;
        mock.fail_next(MockOp::MarkPrice, ApiError::Timeout("slow".into()))
            .await;

        assert!(mock.get_mark_price("BTCUSDT").await.is_err());
        assert!(mock.get_mark_price("BTCUSDT").await.is_ok());
        assert_eq!(mock.calls(MockOp::MarkPrice).await, 2);
    }

    #[tokio::test]
    async fn stop_on_the_wrong_side_of_mark_would_trigger() {
        let mock = exchange().await;
        mock.place_order(&OrderRequest::market_entry("BTCUSDT", PositionSide::Long, dec!(1)))
            .await
            .unwrap();

        let stop = OrderRequest::StopExit {
            client_order_id: uuid_like(),
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Sell,
            quantity: dec!(1),
            stop_price: dec!(100.5),
        };
        assert!(matches!(
            mock.place_order(&stop).await,
            Err(ApiError::WouldTrigger(_))
        ));
        assert!(mock.resting_orders("BTCUSDT").await.is_empty());
    }

    fn uuid_like() -> uuid::Uuid {
        OrderRequest::market_entry("X", PositionSide::Long, Decimal::ONE).client_order_id()
    }
}
