use crate::error::SignalError;
use ta::{Close, High, Low, Next};

/// Wilder's Average Directional Index.
///
/// Emits `None` until `2 * period` bars have been seen: `period` bars to seed the
/// smoothed true range and directional movement, then `period` DX values to seed
/// the average itself.
#[derive(Debug, Clone)]
pub struct AverageDirectionalIndex {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    seeded: usize,
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    dx_seed: Vec<f64>,
    adx: Option<f64>,
}

impl AverageDirectionalIndex {
    pub fn new(period: usize) -> Result<Self, SignalError> {
        if period == 0 {
            return Err(SignalError::InvalidParameters(
                "ADX period cannot be zero".to_string(),
            ));
        }
        Ok(Self {
            period,
            prev: None,
            seeded: 0,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            dx_seed: Vec::with_capacity(period),
            adx: None,
        })
    }

    fn directional_index(&self) -> f64 {
        if self.tr_sum <= 0.0 {
            return 0.0;
        }
        let plus_di = 100.0 * self.plus_dm_sum / self.tr_sum;
        let minus_di = 100.0 * self.minus_dm_sum / self.tr_sum;
        let di_sum = plus_di + minus_di;
        if di_sum <= 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        }
    }
}

impl<T: High + Low + Close> Next<&T> for AverageDirectionalIndex {
    type Output = Option<f64>;

    fn next(&mut self, bar: &T) -> Self::Output {
        let (high, low, close) = (bar.high(), bar.low(), bar.close());
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return None;
        };

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
        let true_range = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        let n = self.period as f64;
        if self.seeded < self.period {
            self.tr_sum += true_range;
            self.plus_dm_sum += plus_dm;
            self.minus_dm_sum += minus_dm;
            self.seeded += 1;
            if self.seeded < self.period {
                return None;
            }
        } else {
            self.tr_sum = self.tr_sum - self.tr_sum / n + true_range;
            self.plus_dm_sum = self.plus_dm_sum - self.plus_dm_sum / n + plus_dm;
            self.minus_dm_sum = self.minus_dm_sum - self.minus_dm_sum / n + minus_dm;
        }

        let dx = self.directional_index();
        match self.adx {
            Some(prev_adx) => {
                let adx = (prev_adx * (n - 1.0) + dx) / n;
                self.adx = Some(adx);
            }
            None => {
                self.dx_seed.push(dx);
                if self.dx_seed.len() == self.period {
                    self.adx = Some(self.dx_seed.iter().sum::<f64>() / n);
                }
            }
        }
        self.adx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn trending(len: usize) -> Vec<Bar> {
        (0..len)
            .map(|i| {
                let base = 100.0 + i as f64;
                Bar {
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.5,
                }
            })
            .collect()
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(AverageDirectionalIndex::new(0).is_err());
    }

    #[test]
    fn first_value_appears_after_two_periods() {
        let mut adx = AverageDirectionalIndex::new(3).unwrap();
        let outputs: Vec<_> = trending(8).iter().map(|b| adx.next(b)).collect();

        // Index 2p - 1 = 5 is the first defined value.
        assert!(outputs[..5].iter().all(Option::is_none));
        assert!(outputs[5..].iter().all(Option::is_some));
    }

    #[test]
    fn steady_trend_has_maximal_strength() {
        let mut adx = AverageDirectionalIndex::new(5).unwrap();
        let last = trending(30).iter().map(|b| adx.next(b)).last().flatten().unwrap();

        // Only +DM is ever positive, so every DX is 100.
        assert!((last - 100.0).abs() < 1e-9);
    }

    #[test]
    fn flat_market_has_no_strength() {
        let mut adx = AverageDirectionalIndex::new(3).unwrap();
        let bar = Bar {
            high: 10.0,
            low: 10.0,
            close: 10.0,
        };
        let last = (0..10).map(|_| adx.next(&bar)).last().flatten().unwrap();
        assert_eq!(last, 0.0);
    }
}
