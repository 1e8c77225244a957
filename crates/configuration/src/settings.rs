use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub bots: Vec<BotConfig>,
    #[serde(default)]
    pub risk_management: RiskManagement,
    #[serde(default)]
    pub signal: SignalParams,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection behaviour towards the futures exchange.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// `true` routes orders to production, `false` to the testnet.
    pub live_trading_enabled: bool,
    pub request_timeout_secs: u64,
    /// Attempts for idempotent reads that fail with a network, timeout or rate-limit error.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            live_trading_enabled: false,
            request_timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ExchangeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// A single API key pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
}

/// Key pairs for both exchange environments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub production: ApiKeys,
    #[serde(default)]
    pub testnet: ApiKeys,
}

/// Control loop settings shared by every bot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_secs: u64,
    /// How many candles are fetched per tick and per interval.
    pub candle_limit: u16,
    /// The margin asset whose available balance funds the risk budget.
    pub quote_asset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            candle_limit: 100,
            quote_asset: "USDT".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// One traded (symbol, interval) pair.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub symbol: String,
    pub interval: String,
    /// A higher timeframe whose signal must agree before the primary signal is acted on.
    #[serde(default)]
    pub confirmation_interval: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Contains parameters for trade-level risk management.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskManagement {
    /// Percent of the balance put at risk per trade (e.g. `3` for 3%).
    /// When absent, the percentage follows the balance tiers.
    pub risk_pct: Option<Decimal>,
    /// Fixed leverage. When absent, the leverage follows the balance tiers.
    pub leverage: Option<u8>,
    /// Stop distance expressed in ATRs.
    pub stop_atr_multiplier: Decimal,
    /// Target distance expressed in ATRs.
    pub target_atr_multiplier: Decimal,
    /// Stop distance as a fraction of entry when ATR is unavailable (0.02 = 2%).
    pub fallback_stop_pct: Decimal,
    /// Target distance as a fraction of entry when ATR is unavailable.
    pub fallback_target_pct: Decimal,
    /// Fraction of the balance above which used margin is flagged as a warning.
    pub margin_warning_ratio: Decimal,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            risk_pct: None,
            leverage: None,
            stop_atr_multiplier: dec!(1.5),
            target_atr_multiplier: dec!(2.5),
            fallback_stop_pct: dec!(0.02),
            fallback_target_pct: dec!(0.02),
            margin_warning_ratio: dec!(0.9),
        }
    }
}

/// Indicator periods and vote thresholds for the signal evaluator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    pub ema_period: usize,
    pub rsi_period: usize,
    pub macd_fast_period: usize,
    pub macd_slow_period: usize,
    pub macd_signal_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: Decimal,
    pub adx_period: usize,
    pub atr_period: usize,
    pub volume_ma_period: usize,
    /// Volume above `baseline * multiplier` counts as a spike.
    pub volume_spike_multiplier: Decimal,
    pub rsi_long_threshold: Decimal,
    pub rsi_short_threshold: Decimal,
    pub adx_floor: Decimal,
    /// Votes (out of six) a direction needs before it is emitted.
    pub quorum: usize,
    /// Candles required before any signal is emitted.
    pub min_candles: usize,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            ema_period: 20,
            rsi_period: 14,
            macd_fast_period: 12,
            macd_slow_period: 26,
            macd_signal_period: 9,
            bb_period: 20,
            bb_std_dev: dec!(2),
            adx_period: 14,
            atr_period: 14,
            volume_ma_period: 20,
            volume_spike_multiplier: dec!(2),
            rsi_long_threshold: dec!(48),
            rsi_short_threshold: dec!(52),
            adx_floor: dec!(15),
            quorum: 3,
            min_candles: 20,
        }
    }
}

/// Exit-order settings applied when a position is opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub trailing_enabled: bool,
    /// Exchange callback rate in percent (1.0 = 1%).
    pub trailing_callback_rate: Decimal,
    /// Favourable move, as a fraction of entry, before the trailing order activates.
    pub trailing_activation_pct: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            trailing_enabled: true,
            trailing_callback_rate: dec!(1.0),
            trailing_activation_pct: dec!(0.01),
        }
    }
}

/// Supervision of freshly opened positions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Run each monitor as its own task instead of blocking the tick.
    pub detached: bool,
    /// Re-enter the opposite side when the stop is touched.
    pub auto_reversal: bool,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
    /// Retracement from the best price, as a fraction, that closes the position.
    pub trailing_retrace_pct: Decimal,
    /// Favourable move, as a fraction of entry, before the retracement rule applies.
    pub trailing_activation_pct: Decimal,
    pub oscillator_overbought: Decimal,
    pub oscillator_oversold: Decimal,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detached: true,
            auto_reversal: true,
            poll_interval_secs: 2,
            timeout_secs: 300,
            trailing_retrace_pct: dec!(0.01),
            trailing_activation_pct: dec!(0.02),
            oscillator_overbought: dec!(70),
            oscillator_oversold: dec!(30),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Telegram bot credentials. Empty values disable alerting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: String,
}

/// Where the duplicate-action memory is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PersistenceBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "apex.log".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// The bots that will actually be traded.
    pub fn enabled_bots(&self) -> impl Iterator<Item = &BotConfig> {
        self.bots.iter().filter(|bot| bot.enabled)
    }

    /// Rejects configurations the engine cannot run safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled_bots().next().is_none() {
            return Err(ConfigError::ValidationError(
                "at least one enabled bot is required".to_string(),
            ));
        }

        let mut symbols = HashSet::new();
        for bot in self.enabled_bots() {
            if bot.symbol.trim().is_empty() || bot.interval.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "every bot needs a symbol and an interval".to_string(),
                ));
            }
            // Positions are one-way per symbol on the exchange.
            if !symbols.insert(bot.symbol.to_uppercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "symbol {} is traded by more than one bot",
                    bot.symbol
                )));
            }
        }

        if self.signal.quorum == 0 || self.signal.quorum > 6 {
            return Err(ConfigError::ValidationError(
                "signal.quorum must be between 1 and 6".to_string(),
            ));
        }
        if self.signal.min_candles < 20 {
            return Err(ConfigError::ValidationError(
                "signal.min_candles cannot be below 20".to_string(),
            ));
        }
        if usize::from(self.engine.candle_limit) < self.signal.min_candles {
            return Err(ConfigError::ValidationError(
                "engine.candle_limit must cover signal.min_candles".to_string(),
            ));
        }

        let risk = &self.risk_management;
        if let Some(pct) = risk.risk_pct {
            if pct <= Decimal::ZERO || pct > dec!(100) {
                return Err(ConfigError::ValidationError(
                    "risk_management.risk_pct must be in (0, 100]".to_string(),
                ));
            }
        }
        if risk.leverage == Some(0) {
            return Err(ConfigError::ValidationError(
                "risk_management.leverage must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("stop_atr_multiplier", risk.stop_atr_multiplier),
            ("target_atr_multiplier", risk.target_atr_multiplier),
            ("fallback_stop_pct", risk.fallback_stop_pct),
            ("fallback_target_pct", risk.fallback_target_pct),
            ("margin_warning_ratio", risk.margin_warning_ratio),
        ] {
            if value <= Decimal::ZERO {
                return Err(ConfigError::ValidationError(format!(
                    "risk_management.{name} must be positive"
                )));
            }
        }

        if self.monitor.poll_interval_secs == 0
            || self.monitor.poll_interval_secs >= self.monitor.timeout_secs
        {
            return Err(ConfigError::ValidationError(
                "monitor.poll_interval_secs must be positive and below monitor.timeout_secs"
                    .to_string(),
            ));
        }
        if self.engine.tick_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.tick_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
