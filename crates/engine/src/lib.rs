//! # Apex Engine Crate
//!
//! The live control loop. On every tick each configured bot fetches its candle
//! window, evaluates a signal, sizes it, and hands it to the executor; freshly opened
//! positions get a short-lived monitor.

use alerter::AlertSender;
use api_client::ApiClient;
use chrono::Utc;
use configuration::{BotConfig, Config};
use core_types::{
    Candle, MarginLevel, Position, PositionKey, PositionStatus, Signal, SignalRecord,
};
use database::SignalStore;
use events::TradeEvent;
use executor::{EntryOutcome, EntryPlan, ExecutionEngine, ExecutionError, PositionLedger};
use risk::{BracketPolicy, RiskEngine};
use signals::{Evaluation, SignalEvaluator, compute_snapshots};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::Instrument;

pub mod error;
pub mod monitor;
pub mod reconciler;
pub mod state;

pub use error::EngineError;
pub use monitor::{ExitTrigger, MonitorOutcome, MonitorTask, check_exit};
pub use reconciler::{ReconciliationReport, StateReconciler};
pub use state::{BotState, BotStateMachine, is_duplicate};

/// What a single tick did for one bot.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A detached monitor still supervises this key.
    MonitorActive,
    /// Exit legs are still missing after a repair attempt; signals wait.
    Degraded,
    InsufficientData { candles: usize },
    NoSignal,
    /// The confirmation interval disagreed with the primary signal.
    Unconfirmed { primary: Signal, confirmation: Signal },
    Duplicate(Signal),
    /// Sizing or the exchange refused the entry.
    Rejected(String),
    /// The margin check refused the entry.
    Blocked,
    AlreadyOpen(Position),
    /// A position was opened. It may be `Degraded` if some exits were not accepted.
    Entered(Position),
}

type MonitorHandle = JoinHandle<Result<MonitorOutcome, EngineError>>;

/// A container for the components related to a single (symbol, interval).
pub struct Bot {
    pub key: PositionKey,
    pub confirmation_interval: Option<String>,
    state: BotStateMachine,
    monitor: Option<MonitorHandle>,
}

impl Bot {
    fn from_config(config: &BotConfig) -> Self {
        Self {
            key: PositionKey::new(config.symbol.to_uppercase(), config.interval.clone()),
            confirmation_interval: config.confirmation_interval.clone(),
            state: BotStateMachine::default(),
            monitor: None,
        }
    }

    pub fn state(&self) -> BotState {
        self.state.state()
    }

    /// Collects a finished monitor, returning `true` while one is still running.
    async fn poll_monitor(&mut self) -> bool {
        let Some(handle) = &self.monitor else {
            return false;
        };
        if !handle.is_finished() {
            return true;
        }
        if let Some(handle) = self.monitor.take() {
            match handle.await {
                Ok(Ok(outcome)) => tracing::info!(key = %self.key, ?outcome, "Monitor finished."),
                Ok(Err(e)) => tracing::error!(key = %self.key, error = %e, "Monitor failed."),
                Err(e) => tracing::error!(key = %self.key, error = %e, "Monitor task panicked or was aborted."),
            }
        }
        self.state.reset();
        false
    }
}

/// Everything a tick needs besides the bot itself.
struct Pipeline {
    config: Config,
    api: Arc<dyn ApiClient>,
    executor: Arc<ExecutionEngine>,
    evaluator: SignalEvaluator,
    risk: RiskEngine,
    signals: Arc<dyn SignalStore>,
    alerts: AlertSender,
}

/// The central orchestrator for the live trading application.
pub struct LiveEngine {
    pipeline: Pipeline,
    bots: Vec<Bot>,
}

impl LiveEngine {
    /// Creates a new `LiveEngine` instance with all its required components.
    pub fn new(
        config: Config,
        api: Arc<dyn ApiClient>,
        signals: Arc<dyn SignalStore>,
        alerts: AlertSender,
    ) -> Result<Self, EngineError> {
        let evaluator = SignalEvaluator::new(config.signal.clone())?;
        let risk = RiskEngine::new(config.risk_management.clone())?;
        let executor = Arc::new(ExecutionEngine::new(
            api.clone(),
            Arc::new(PositionLedger::new()),
            alerts.clone(),
            config.execution.clone(),
            BracketPolicy::from(&config.risk_management),
        ));
        let bots: Vec<Bot> = config.enabled_bots().map(Bot::from_config).collect();
        if bots.is_empty() {
            return Err(EngineError::Configuration("no enabled bots".to_string()));
        }

        Ok(Self {
            pipeline: Pipeline {
                config,
                api,
                executor,
                evaluator,
                risk,
                signals,
                alerts,
            },
            bots,
        })
    }

    pub fn executor(&self) -> &Arc<ExecutionEngine> {
        &self.pipeline.executor
    }

    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    fn keys(&self) -> Vec<PositionKey> {
        self.bots.iter().map(|b| b.key.clone()).collect()
    }

    /// Adopts or drops positions so the ledger starts out matching the exchange.
    pub async fn init(&self) -> ReconciliationReport {
        tracing::info!(bots = self.bots.len(), "Initializing trading engine...");
        StateReconciler::new(self.pipeline.executor.clone())
            .run_reconciliation(&self.keys())
            .await
    }

    /// The main loop: one tick per interval until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        self.init().await;

        let mut timer = interval(self.pipeline.config.engine.tick_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            every = ?self.pipeline.config.engine.tick_interval(),
            "--- Engine is running. ---"
        );

        loop {
            tokio::select! {
                _ = timer.tick() => self.tick_all().await,
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C.");
                    }
                    tracing::info!("Shutdown requested. Open positions keep their exchange exits.");
                    break;
                }
            }
        }

        for bot in &mut self.bots {
            if let Some(handle) = bot.monitor.take() {
                handle.abort();
            }
        }
        Ok(())
    }

    /// Ticks every bot in order. Errors are logged and never stop the loop.
    pub async fn tick_all(&mut self) {
        for bot in &mut self.bots {
            let span = tracing::info_span!("tick", key = %bot.key);
            match self.pipeline.tick(bot).instrument(span).await {
                Ok(outcome) => tracing::info!(?outcome, "Tick complete."),
                Err(e) => {
                    bot.state.reset();
                    tracing::error!(error = %e, "Tick failed.");
                }
            }
        }
    }

    /// Ticks the bot trading `key`.
    pub async fn tick(&mut self, key: &PositionKey) -> Result<TickOutcome, EngineError> {
        let bot = self
            .bots
            .iter_mut()
            .find(|b| &b.key == key)
            .ok_or_else(|| EngineError::BotNotFound(key.to_string()))?;
        let outcome = self.pipeline.tick(bot).await;
        if outcome.is_err() {
            bot.state.reset();
        }
        outcome
    }

    /// Waits for the monitor on `key`, if one is running, and returns its outcome.
    pub async fn join_monitor(&mut self, key: &PositionKey) -> Result<Option<MonitorOutcome>, EngineError> {
        let bot = self
            .bots
            .iter_mut()
            .find(|b| &b.key == key)
            .ok_or_else(|| EngineError::BotNotFound(key.to_string()))?;
        let Some(handle) = bot.monitor.take() else {
            return Ok(None);
        };
        let outcome = handle.await??;
        bot.state.reset();
        Ok(Some(outcome))
    }
}

impl Pipeline {
    async fn tick(&self, bot: &mut Bot) -> Result<TickOutcome, EngineError> {
        if bot.poll_monitor().await {
            return Ok(TickOutcome::MonitorActive);
        }
        let key = bot.key.clone();

        self.executor.sync_with_exchange(&key).await?;
        if self
            .executor
            .ledger()
            .get(&key)
            .await
            .is_some_and(|p| p.is_degraded())
        {
            match self.executor.repair_exits(&key).await {
                Ok(_) => {}
                Err(ExecutionError::PartialFire { missing_legs, .. }) => {
                    tracing::warn!(%key, ?missing_legs, "Exit legs still missing; holding signals.");
                    return Ok(TickOutcome::Degraded);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let limit = self.config.engine.candle_limit;
        let candles = self.api.fetch_candles(&key.symbol, &key.interval, limit).await?;
        if candles.len() < self.config.signal.min_candles {
            return Ok(TickOutcome::InsufficientData {
                candles: candles.len(),
            });
        }
        let snapshots = compute_snapshots(&candles, self.evaluator.params())?;
        let evaluation = self.evaluator.evaluate_snapshots(&snapshots);
        if let Evaluation::Voted { long, short, .. } = &evaluation {
            tracing::debug!(long = long.count(), short = short.count(), "Vote tally.");
        }
        let signal = match evaluation {
            Evaluation::InsufficientData { candles } => {
                return Ok(TickOutcome::InsufficientData { candles });
            }
            Evaluation::Undefined => return Ok(TickOutcome::NoSignal),
            Evaluation::Voted { signal, .. } => signal,
        };
        let Some(side) = signal.side() else {
            return Ok(TickOutcome::NoSignal);
        };

        if let Some(interval) = &bot.confirmation_interval {
            let confirmation = self.confirm(&key.symbol, interval).await?;
            if confirmation != signal {
                return Ok(TickOutcome::Unconfirmed {
                    primary: signal,
                    confirmation,
                });
            }
        }

        let (Some(latest), Some(snapshot)) = (candles.last(), snapshots.last()) else {
            return Ok(TickOutcome::InsufficientData { candles: 0 });
        };
        let last_record = self.signals.load(&key).await?;
        let open = self.executor.ledger().get(&key).await;
        if is_duplicate(last_record.as_ref(), signal, latest.open_time, open.as_ref()) {
            tracing::debug!(%signal, "Duplicate signal skipped.");
            return Ok(TickOutcome::Duplicate(signal));
        }
        tracing::info!(%signal, close = %latest.close, "Actionable signal.");

        bot.state.advance(BotState::Sizing)?;
        let balance = self
            .api
            .get_available_balance(&self.config.engine.quote_asset)
            .await?;
        let rules = self.executor.rules().get(&key.symbol).await?;
        let assessment = match self.risk.assess(
            side,
            balance,
            latest.close,
            snapshot.volatility_range,
            rules.max_leverage,
        ) {
            Ok(assessment) => assessment,
            Err(e) => {
                bot.state.advance(BotState::Idle)?;
                self.alerts
                    .notify(TradeEvent::rejected(&key.symbol, &key.interval, signal, e.to_string()));
                return Ok(TickOutcome::Rejected(e.to_string()));
            }
        };
        if assessment.margin_warning_level == MarginLevel::Blocked {
            bot.state.advance(BotState::Idle)?;
            let reason = format!(
                "margin {} exceeds available balance {}",
                assessment.margin_used.round_dp(2),
                balance.round_dp(2)
            );
            tracing::warn!(%reason, "Entry blocked.");
            self.alerts
                .notify(TradeEvent::rejected(&key.symbol, &key.interval, signal, reason));
            return Ok(TickOutcome::Blocked);
        }

        bot.state.advance(BotState::Entering)?;
        let plan = EntryPlan::from(&assessment);
        let position = match self.executor.enter(&key, side, &plan).await {
            Ok(EntryOutcome::Opened(position)) => position,
            Ok(EntryOutcome::AlreadyOpen(position)) => {
                self.remember(&key, signal, latest).await?;
                bot.state.advance(BotState::Idle)?;
                return Ok(TickOutcome::AlreadyOpen(position));
            }
            Err(ExecutionError::PartialFire { position, .. }) => *position,
            Err(ExecutionError::Rejected(rejection)) => {
                bot.state.advance(BotState::Idle)?;
                self.alerts.notify(TradeEvent::rejected(
                    &key.symbol,
                    &key.interval,
                    signal,
                    rejection.to_string(),
                ));
                return Ok(TickOutcome::Rejected(rejection.to_string()));
            }
            Err(ExecutionError::Api(e)) if !e.is_transient() => {
                bot.state.advance(BotState::Idle)?;
                self.alerts
                    .notify(TradeEvent::rejected(&key.symbol, &key.interval, signal, e.to_string()));
                return Ok(TickOutcome::Rejected(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        self.remember(&key, signal, latest).await?;

        if !self.config.monitor.enabled {
            bot.state.advance(BotState::Idle)?;
            return Ok(TickOutcome::Entered(position));
        }
        bot.state.advance(BotState::Monitoring)?;
        let task = MonitorTask::new(
            self.executor.clone(),
            self.config.monitor.clone(),
            &position,
            assessment.leverage,
            candles,
            self.config.signal.rsi_period,
        );
        if self.config.monitor.detached {
            bot.monitor = Some(tokio::spawn(task.run()));
        } else {
            match task.run().await {
                Ok(outcome) => tracing::info!(?outcome, "Monitor finished."),
                Err(e) => tracing::error!(error = %e, "Monitor failed."),
            }
            bot.state.advance(BotState::Idle)?;
        }

        if let PositionStatus::Degraded { missing_legs } = &position.status {
            tracing::warn!(?missing_legs, "Entered with exit legs missing.");
        }
        Ok(TickOutcome::Entered(position))
    }

    /// The signal on the confirmation interval's own window.
    async fn confirm(&self, symbol: &str, interval: &str) -> Result<Signal, EngineError> {
        let candles = self
            .api
            .fetch_candles(symbol, interval, self.config.engine.candle_limit)
            .await?;
        let evaluation = self.evaluator.evaluate_candles(&candles)?;
        tracing::debug!(interval, signal = %evaluation.signal(), "Confirmation signal.");
        Ok(evaluation.signal())
    }

    async fn remember(&self, key: &PositionKey, signal: Signal, candle: &Candle) -> Result<(), EngineError> {
        let record = SignalRecord {
            signal,
            candle_time: candle.open_time,
            acted_at: Utc::now(),
        };
        self.signals.save(key, &record).await?;
        Ok(())
    }
}
