use crate::error::SignalError;
use crate::indicators::{IndicatorSnapshot, compute_snapshots};
use configuration::settings::SignalParams;
use core_types::{Candle, Signal};
use rust_decimal::Decimal;
use serde::Serialize;

/// The six conditions counted for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub momentum_cross: bool,
    pub trend: bool,
    pub oscillator: bool,
    pub band_breakout: bool,
    pub volume_spike: bool,
    pub directional_strength: bool,
}

impl VoteTally {
    pub fn count(&self) -> usize {
        self.as_array().iter().filter(|(_, vote)| *vote).count()
    }

    /// Condition names paired with their votes, in a fixed order.
    pub fn as_array(&self) -> [(&'static str, bool); 6] {
        [
            ("momentum cross", self.momentum_cross),
            ("trend", self.trend),
            ("oscillator", self.oscillator),
            ("band breakout", self.band_breakout),
            ("volume spike", self.volume_spike),
            ("directional strength", self.directional_strength),
        ]
    }
}

/// The evaluator's verdict for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Evaluation {
    /// Fewer candles than the evaluator requires.
    InsufficientData { candles: usize },
    /// At least one indicator the votes need is still undefined.
    Undefined,
    Voted {
        signal: Signal,
        long: VoteTally,
        short: VoteTally,
    },
}

impl Evaluation {
    pub fn signal(&self) -> Signal {
        match self {
            Evaluation::Voted { signal, .. } => *signal,
            _ => Signal::None,
        }
    }
}

/// The values both directions vote on, all known to be defined.
struct Inputs {
    close: Decimal,
    prev_macd: Decimal,
    prev_macd_signal: Decimal,
    macd: Decimal,
    macd_signal: Decimal,
    trend_average: Decimal,
    oscillator: Decimal,
    band_upper: Decimal,
    band_lower: Decimal,
    volume_spike: bool,
    directional_strength: Decimal,
}

impl Inputs {
    fn gather(current: &IndicatorSnapshot, previous: &IndicatorSnapshot) -> Option<Self> {
        Some(Self {
            close: current.close,
            prev_macd: previous.momentum_line?,
            prev_macd_signal: previous.momentum_signal_line?,
            macd: current.momentum_line?,
            macd_signal: current.momentum_signal_line?,
            trend_average: current.trend_average?,
            oscillator: current.oscillator?,
            band_upper: current.band_upper?,
            band_lower: current.band_lower?,
            volume_spike: current.volume_spike_flag?,
            directional_strength: current.directional_strength?,
        })
    }
}

/// Weighted-vote signal evaluator.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    params: SignalParams,
}

impl SignalEvaluator {
    pub fn new(params: SignalParams) -> Result<Self, SignalError> {
        if params.quorum == 0 || params.quorum > 6 {
            return Err(SignalError::InvalidParameters(format!(
                "quorum must be between 1 and 6, got {}",
                params.quorum
            )));
        }
        if params.rsi_short_threshold < Decimal::ZERO || params.rsi_long_threshold > Decimal::ONE_HUNDRED {
            return Err(SignalError::InvalidParameters(
                "oscillator thresholds must lie within 0..=100".to_string(),
            ));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// Votes on the latest snapshot against its predecessor.
    ///
    /// `candle_count` is the size of the window the snapshots were computed from.
    pub fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
        candle_count: usize,
    ) -> Evaluation {
        if candle_count < self.params.min_candles {
            tracing::trace!(candle_count, min = self.params.min_candles, "Not enough candles to vote.");
            return Evaluation::InsufficientData {
                candles: candle_count,
            };
        }
        let Some(v) = Inputs::gather(current, previous) else {
            return Evaluation::Undefined;
        };
        let p = &self.params;

        let long = VoteTally {
            momentum_cross: v.prev_macd < v.prev_macd_signal && v.macd > v.macd_signal,
            trend: v.close > v.trend_average,
            oscillator: v.oscillator > p.rsi_long_threshold,
            band_breakout: v.close > v.band_upper,
            volume_spike: v.volume_spike,
            directional_strength: v.directional_strength > p.adx_floor,
        };
        let short = VoteTally {
            momentum_cross: v.prev_macd > v.prev_macd_signal && v.macd < v.macd_signal,
            trend: v.close < v.trend_average,
            oscillator: v.oscillator < p.rsi_short_threshold,
            band_breakout: v.close < v.band_lower,
            volume_spike: v.volume_spike,
            directional_strength: v.directional_strength > p.adx_floor,
        };

        let long_ready = long.count() >= p.quorum;
        let short_ready = short.count() >= p.quorum;
        let signal = match (long_ready, short_ready) {
            (true, false) => Signal::Long,
            (false, true) => Signal::Short,
            // Both at quorum is ambiguous.
            _ => Signal::None,
        };
        tracing::debug!(
            long = long.count(),
            short = short.count(),
            quorum = p.quorum,
            %signal,
            "Vote tally."
        );

        Evaluation::Voted {
            signal,
            long,
            short,
        }
    }

    /// Computes snapshots for `candles` and evaluates the last two.
    pub fn evaluate_candles(&self, candles: &[Candle]) -> Result<Evaluation, SignalError> {
        if candles.len() < self.params.min_candles {
            return Ok(Evaluation::InsufficientData {
                candles: candles.len(),
            });
        }
        let snapshots = compute_snapshots(candles, &self.params)?;
        Ok(self.evaluate_snapshots(&snapshots))
    }

    pub fn evaluate_snapshots(&self, snapshots: &[IndicatorSnapshot]) -> Evaluation {
        match snapshots {
            [.., previous, current] => self.evaluate(current, previous, snapshots.len()),
            _ => Evaluation::InsufficientData {
                candles: snapshots.len(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn evaluator() -> SignalEvaluator {
        SignalEvaluator::new(SignalParams::default()).unwrap()
    }

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            open_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            close: dec!(100),
            volume: dec!(10),
            trend_average: Some(dec!(100)),
            oscillator: Some(dec!(50)),
            momentum_line: Some(dec!(0)),
            momentum_signal_line: Some(dec!(0)),
            band_upper: Some(dec!(105)),
            band_lower: Some(dec!(95)),
            directional_strength: Some(dec!(10)),
            volatility_range: Some(dec!(1)),
            volume_baseline: Some(dec!(10)),
            volume_spike_flag: Some(false),
        }
    }

    #[test]
    fn bullish_window_votes_long() {
        let previous = IndicatorSnapshot {
            momentum_line: Some(dec!(-0.2)),
            ..snapshot()
        };
        let current = IndicatorSnapshot {
            close: dec!(106),
            oscillator: Some(dec!(60)),
            momentum_line: Some(dec!(0.3)),
            momentum_signal_line: Some(dec!(0.1)),
            ..snapshot()
        };

        let evaluation = evaluator().evaluate(&current, &previous, 50);
        let Evaluation::Voted { signal, long, short } = evaluation else {
            panic!("expected a vote");
        };
        assert_eq!(signal, Signal::Long);
        assert_eq!(long.count(), 4);
        assert_eq!(short.count(), 0);
    }

    #[test]
    fn bearish_window_votes_short() {
        let current = IndicatorSnapshot {
            close: dec!(94),
            oscillator: Some(dec!(40)),
            directional_strength: Some(dec!(25)),
            ..snapshot()
        };

        let evaluation = evaluator().evaluate(&current, &snapshot(), 50);
        assert_eq!(evaluation.signal(), Signal::Short);
    }

    #[test]
    fn both_sides_at_quorum_is_ambiguous() {
        // Spike and strength vote for both sides; the oscillator sits in the overlap band.
        let current = IndicatorSnapshot {
            oscillator: Some(dec!(50)),
            volume_spike_flag: Some(true),
            directional_strength: Some(dec!(30)),
            ..snapshot()
        };

        let Evaluation::Voted { signal, long, short } =
            evaluator().evaluate(&current, &snapshot(), 50)
        else {
            panic!("expected a vote");
        };
        assert_eq!(long.count(), 3);
        assert_eq!(short.count(), 3);
        assert_eq!(signal, Signal::None);
    }

    #[test]
    fn quorum_is_configurable() {
        let strict = SignalEvaluator::new(SignalParams {
            quorum: 5,
            ..SignalParams::default()
        })
        .unwrap();
        let current = IndicatorSnapshot {
            close: dec!(94),
            oscillator: Some(dec!(40)),
            directional_strength: Some(dec!(25)),
            ..snapshot()
        };

        assert_eq!(strict.evaluate(&current, &snapshot(), 50).signal(), Signal::None);
    }

    #[test]
    fn short_history_is_insufficient() {
        let evaluation = evaluator().evaluate(&snapshot(), &snapshot(), 19);
        assert_eq!(evaluation, Evaluation::InsufficientData { candles: 19 });
        assert_eq!(evaluation.signal(), Signal::None);
    }

    #[test]
    fn undefined_indicator_yields_no_signal() {
        let current = IndicatorSnapshot {
            directional_strength: None,
            close: dec!(120),
            ..snapshot()
        };
        assert_eq!(
            evaluator().evaluate(&current, &snapshot(), 50),
            Evaluation::Undefined
        );
    }

    #[test]
    fn invalid_quorum_is_rejected() {
        let params = SignalParams {
            quorum: 0,
            ..SignalParams::default()
        };
        assert!(SignalEvaluator::new(params).is_err());
    }

    #[test]
    fn fewer_than_twenty_candles_never_signal() {
        let candles: Vec<Candle> = (0..19)
            .map(|i| {
                let open_time = Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap();
                let close = dec!(100) + Decimal::from(i);
                Candle {
                    open_time,
                    open: close,
                    high: close + dec!(1),
                    low: close - dec!(1),
                    close,
                    volume: dec!(10),
                    close_time: open_time + Duration::seconds(59),
                }
            })
            .collect();

        let evaluation = evaluator().evaluate_candles(&candles).unwrap();
        assert_eq!(evaluation.signal(), Signal::None);
        assert!(matches!(evaluation, Evaluation::InsufficientData { candles: 19 }));
    }

    #[test]
    fn breakout_after_steady_climb_is_long() {
        let mut candles: Vec<Candle> = (0..100i64)
            .map(|i| {
                let open_time = Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap();
                let wiggle = if i % 2 == 0 { dec!(0.1) } else { dec!(-0.1) };
                let close = dec!(100) + Decimal::from(i) * dec!(0.5) + wiggle;
                Candle {
                    open_time,
                    open: close - dec!(0.2),
                    high: close + dec!(0.4),
                    low: close - dec!(0.6),
                    close,
                    volume: dec!(100),
                    close_time: open_time + Duration::seconds(59),
                }
            })
            .collect();
        let last = candles.last_mut().unwrap();
        last.close = last.open * dec!(1.03);
        last.high = last.close + dec!(0.2);
        last.volume = dec!(500);

        let evaluation = evaluator().evaluate_candles(&candles).unwrap();
        let Evaluation::Voted { signal, long, short } = evaluation else {
            panic!("expected a vote, got {evaluation:?}");
        };
        assert_eq!(signal, Signal::Long);
        assert!(long.count() >= 4);
        assert!(short.count() <= 2);
    }
}
