#![allow(dead_code)]

use api_client::MockExchange;
use chrono::{Duration, TimeZone, Utc};
use configuration::{BotConfig, Config};
use core_types::{Candle, ExchangeSymbolRules};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

pub const SYMBOL: &str = "BTCUSDT";
pub const INTERVAL: &str = "15m";

pub fn rules() -> ExchangeSymbolRules {
    ExchangeSymbolRules {
        quantity_step: dec!(0.001),
        quantity_min: dec!(0.001),
        price_tick: dec!(0.1),
        minimum_notional: dec!(5),
        max_leverage: 125,
    }
}

/// A steady climb that breaks out with a volume spike on the last candle.
pub fn breakout_candles(shift_minutes: i64) -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..100i64)
        .map(|i| {
            let open_time = Utc.timestamp_opt(1_700_000_000 + i * 900, 0).unwrap()
                + Duration::minutes(shift_minutes);
            let wiggle = if i % 2 == 0 { dec!(0.1) } else { dec!(-0.1) };
            let close = dec!(100) + Decimal::from(i) * dec!(0.5) + wiggle;
            Candle {
                open_time,
                open: close - dec!(0.2),
                high: close + dec!(0.4),
                low: close - dec!(0.6),
                close,
                volume: dec!(100),
                close_time: open_time + Duration::seconds(899),
            }
        })
        .collect();
    let last = candles.last_mut().unwrap();
    last.close = last.open * dec!(1.03);
    last.high = last.close + dec!(0.2);
    last.volume = dec!(500);
    candles
}

/// A perfectly flat market: no condition beyond the neutral oscillator votes.
pub fn flat_candles(len: i64) -> Vec<Candle> {
    (0..len)
        .map(|i| {
            let open_time = Utc.timestamp_opt(1_700_000_000 + i * 900, 0).unwrap();
            Candle {
                open_time,
                open: dec!(100),
                high: dec!(100),
                low: dec!(100),
                close: dec!(100),
                volume: dec!(100),
                close_time: open_time + Duration::seconds(899),
            }
        })
        .collect()
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.bots = vec![BotConfig {
        symbol: SYMBOL.to_string(),
        interval: INTERVAL.to_string(),
        confirmation_interval: None,
        enabled: true,
    }];
    config.risk_management.risk_pct = Some(dec!(0.5));
    config.risk_management.leverage = Some(10);
    config.monitor.enabled = false;
    config
}

/// An exchange with a 10 000 USDT balance and the breakout window loaded.
pub async fn exchange() -> Arc<MockExchange> {
    let mock = Arc::new(MockExchange::new());
    mock.set_rules(SYMBOL, rules()).await;
    mock.set_balance("USDT", dec!(10000)).await;
    mock.set_marks(SYMBOL, [dec!(153.7)]).await;
    mock.set_candles(SYMBOL, INTERVAL, breakout_candles(0)).await;
    mock
}
