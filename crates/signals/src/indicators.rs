use crate::adx::AverageDirectionalIndex;
use crate::error::SignalError;
use chrono::{DateTime, Utc};
use configuration::settings::SignalParams;
use core_types::Candle;
use rust_decimal::prelude::*;
use serde::Serialize;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage as Ema,
    MovingAverageConvergenceDivergence as Macd, RelativeStrengthIndex as Rsi,
    SimpleMovingAverage as Sma,
};
use ta::{Close, High, Low, Next};

/// Derived attributes for one candle. `None` means undefined: the indicator has not
/// seen enough history yet, or produced a non-finite value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub open_time: DateTime<Utc>,
    pub close: Decimal,
    pub volume: Decimal,
    /// EMA of closes.
    pub trend_average: Option<Decimal>,
    /// RSI of closes.
    pub oscillator: Option<Decimal>,
    /// MACD line.
    pub momentum_line: Option<Decimal>,
    /// MACD signal line.
    pub momentum_signal_line: Option<Decimal>,
    pub band_upper: Option<Decimal>,
    pub band_lower: Option<Decimal>,
    /// ADX.
    pub directional_strength: Option<Decimal>,
    /// ATR.
    pub volatility_range: Option<Decimal>,
    /// SMA of volume.
    pub volume_baseline: Option<Decimal>,
    pub volume_spike_flag: Option<bool>,
}

struct Bar {
    high: f64,
    low: f64,
    close: f64,
}

impl High for Bar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Bar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Bar {
    fn close(&self) -> f64 {
        self.close
    }
}

fn ta_err<E: std::fmt::Debug>(name: &str) -> impl FnOnce(E) -> SignalError + '_ {
    move |e| SignalError::InvalidParameters(format!("Failed to initialize {name}: {e:?}"))
}

fn to_f64(value: Decimal, index: usize, field: &str) -> Result<f64, SignalError> {
    value.to_f64().ok_or_else(|| SignalError::InvalidCandle {
        index,
        reason: format!("{field} {value} does not fit in f64"),
    })
}

/// Converts an indicator output, masking values produced before `warmup` samples.
fn defined(value: f64, index: usize, warmup: usize) -> Option<Decimal> {
    if index < warmup || !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(8))
}

fn validate(params: &SignalParams) -> Result<(), SignalError> {
    let periods = [
        ("ema_period", params.ema_period),
        ("rsi_period", params.rsi_period),
        ("macd_fast_period", params.macd_fast_period),
        ("macd_slow_period", params.macd_slow_period),
        ("macd_signal_period", params.macd_signal_period),
        ("bb_period", params.bb_period),
        ("adx_period", params.adx_period),
        ("atr_period", params.atr_period),
        ("volume_ma_period", params.volume_ma_period),
    ];
    for (name, period) in periods {
        if period == 0 {
            return Err(SignalError::InvalidParameters(format!(
                "{name} cannot be zero"
            )));
        }
    }
    if params.macd_fast_period >= params.macd_slow_period {
        return Err(SignalError::InvalidParameters(
            "MACD fast period must be shorter than the slow period".to_string(),
        ));
    }
    Ok(())
}

/// Computes one snapshot per candle, oldest first.
///
/// Candles must be in ascending time order. A candle whose high is below its low,
/// or whose close lies outside its range, is rejected.
pub fn compute_snapshots(
    candles: &[Candle],
    params: &SignalParams,
) -> Result<Vec<IndicatorSnapshot>, SignalError> {
    validate(params)?;

    let mut ema = Ema::new(params.ema_period).map_err(ta_err("EMA"))?;
    let mut rsi = Rsi::new(params.rsi_period).map_err(ta_err("RSI"))?;
    let mut macd = Macd::new(
        params.macd_fast_period,
        params.macd_slow_period,
        params.macd_signal_period,
    )
    .map_err(ta_err("MACD"))?;
    let bb_std_dev = params
        .bb_std_dev
        .to_f64()
        .ok_or_else(|| SignalError::InvalidParameters("bb_std_dev out of range".to_string()))?;
    let mut bb = BollingerBands::new(params.bb_period, bb_std_dev).map_err(ta_err("Bollinger"))?;
    let mut atr = AverageTrueRange::new(params.atr_period).map_err(ta_err("ATR"))?;
    let mut volume_ma = Sma::new(params.volume_ma_period).map_err(ta_err("volume SMA"))?;
    let mut adx = AverageDirectionalIndex::new(params.adx_period)?;

    let macd_warmup = params.macd_slow_period - 1;
    let macd_signal_warmup = params.macd_slow_period + params.macd_signal_period - 2;

    let mut snapshots = Vec::with_capacity(candles.len());
    let mut prev_time = None;

    for (index, candle) in candles.iter().enumerate() {
        if candle.high < candle.low {
            return Err(SignalError::InvalidCandle {
                index,
                reason: format!("high {} below low {}", candle.high, candle.low),
            });
        }
        if candle.close > candle.high || candle.close < candle.low {
            return Err(SignalError::InvalidCandle {
                index,
                reason: format!("close {} outside range", candle.close),
            });
        }
        if prev_time.is_some_and(|t| candle.open_time <= t) {
            return Err(SignalError::InvalidCandle {
                index,
                reason: "candles are not in ascending time order".to_string(),
            });
        }
        prev_time = Some(candle.open_time);

        let bar = Bar {
            high: to_f64(candle.high, index, "high")?,
            low: to_f64(candle.low, index, "low")?,
            close: to_f64(candle.close, index, "close")?,
        };
        let volume = to_f64(candle.volume, index, "volume")?;

        let ema_value = ema.next(bar.close);
        let rsi_value = rsi.next(bar.close);
        let macd_value = macd.next(bar.close);
        let bands = bb.next(bar.close);
        let atr_value = atr.next(&bar);
        let volume_baseline = volume_ma.next(volume);
        let adx_value = adx.next(&bar);

        let volume_baseline = defined(volume_baseline, index, params.volume_ma_period - 1);
        let volume_spike_flag =
            volume_baseline.map(|base| candle.volume > base * params.volume_spike_multiplier);

        snapshots.push(IndicatorSnapshot {
            open_time: candle.open_time,
            close: candle.close,
            volume: candle.volume,
            trend_average: defined(ema_value, index, params.ema_period - 1),
            oscillator: defined(rsi_value, index, params.rsi_period),
            momentum_line: defined(macd_value.macd, index, macd_warmup),
            momentum_signal_line: defined(macd_value.signal, index, macd_signal_warmup),
            band_upper: defined(bands.upper, index, params.bb_period - 1),
            band_lower: defined(bands.lower, index, params.bb_period - 1),
            directional_strength: adx_value.and_then(|v| defined(v, index, 0)),
            volatility_range: defined(atr_value, index, params.atr_period - 1),
            volume_baseline,
            volume_spike_flag,
        });
    }

    Ok(snapshots)
}

/// RSI over `candles` with `price` standing in for the last close.
///
/// Used while a candle is still forming: the live price replaces the provisional
/// close. Returns `None` when there is not enough history.
pub fn oscillator_at_price(candles: &[Candle], price: Decimal, period: usize) -> Option<Decimal> {
    if period == 0 || candles.len() <= period {
        return None;
    }
    let mut rsi = Rsi::new(period).ok()?;
    let last = candles.len() - 1;
    let mut value = f64::NAN;
    for (index, candle) in candles.iter().enumerate() {
        let close = if index == last { price } else { candle.close };
        value = rsi.next(close.to_f64()?);
    }
    defined(value, last, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn candle(i: i64, close: Decimal, volume: Decimal) -> Candle {
        let open_time = Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap();
        Candle {
            open_time,
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume,
            close_time: open_time + Duration::seconds(59),
        }
    }

    fn series(len: i64) -> Vec<Candle> {
        (0..len)
            .map(|i| candle(i, dec!(100) + Decimal::from(i % 5), dec!(10)))
            .collect()
    }

    #[test]
    fn one_snapshot_per_candle() {
        let candles = series(40);
        let snapshots = compute_snapshots(&candles, &SignalParams::default()).unwrap();
        assert_eq!(snapshots.len(), 40);
        assert_eq!(snapshots[39].close, candles[39].close);
    }

    #[test]
    fn fields_stay_undefined_during_warmup() {
        let params = SignalParams::default();
        let snapshots = compute_snapshots(&series(40), &params).unwrap();

        assert!(snapshots[18].trend_average.is_none());
        assert!(snapshots[19].trend_average.is_some());
        assert!(snapshots[13].oscillator.is_none());
        assert!(snapshots[14].oscillator.is_some());
        assert!(snapshots[24].momentum_line.is_none());
        assert!(snapshots[25].momentum_line.is_some());
        assert!(snapshots[32].momentum_signal_line.is_none());
        assert!(snapshots[33].momentum_signal_line.is_some());
        assert!(snapshots[26].directional_strength.is_none());
        assert!(snapshots[27].directional_strength.is_some());
        assert!(snapshots[19].volume_spike_flag.is_some());
    }

    #[test]
    fn volume_spike_requires_twice_the_baseline() {
        let mut candles = series(25);
        let last = candles.len() - 1;
        candles[last].volume = dec!(40);

        let snapshots = compute_snapshots(&candles, &SignalParams::default()).unwrap();
        assert_eq!(snapshots[last].volume_spike_flag, Some(true));
        assert_eq!(snapshots[last - 1].volume_spike_flag, Some(false));
    }

    #[test]
    fn inverted_candle_is_rejected() {
        let mut candles = series(25);
        candles[3].high = dec!(50);

        let err = compute_snapshots(&candles, &SignalParams::default()).unwrap_err();
        assert!(matches!(err, SignalError::InvalidCandle { index: 3, .. }));
    }

    #[test]
    fn unordered_candles_are_rejected() {
        let mut candles = series(25);
        candles.swap(4, 5);
        assert!(compute_snapshots(&candles, &SignalParams::default()).is_err());
    }

    #[test]
    fn zero_period_is_rejected() {
        let params = SignalParams {
            ema_period: 0,
            ..SignalParams::default()
        };
        assert!(matches!(
            compute_snapshots(&series(25), &params),
            Err(SignalError::InvalidParameters(_))
        ));
    }

    #[test]
    fn live_price_moves_the_oscillator() {
        let candles = series(30);
        let high = oscillator_at_price(&candles, dec!(130), 14).unwrap();
        let low = oscillator_at_price(&candles, dec!(70), 14).unwrap();

        assert!(high > dec!(70));
        assert!(low < dec!(30));
    }

    #[test]
    fn oscillator_needs_history() {
        assert_eq!(oscillator_at_price(&series(14), dec!(100), 14), None);
        assert_eq!(oscillator_at_price(&[], dec!(100), 14), None);
    }
}
