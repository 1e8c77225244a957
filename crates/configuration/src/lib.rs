use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    ApiConfig, ApiKeys, BotConfig, Config, EngineConfig, ExchangeConfig, ExecutionConfig,
    LoggingConfig, MonitorConfig, PersistenceBackend, PersistenceConfig, RiskManagement,
    SignalParams, TelegramConfig,
};

/// Prefix of the environment variables that override file values,
/// e.g. `APEX__API__PRODUCTION__KEY` or `APEX__ENGINE__TICK_INTERVAL_SECS`.
pub const ENV_PREFIX: &str = "APEX";

/// Loads and validates the application configuration.
///
/// The TOML file at `path` is the base layer; environment variables prefixed with `APEX`
/// (nested keys separated by `__`) are layered on top of it.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_file_falls_back_to_defaults() {
        let file = write_config(
            r#"
            [[bots]]
            symbol = "BTCUSDT"
            interval = "15m"
            "#,
        );

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.bots.len(), 1);
        assert!(config.bots[0].enabled);
        assert_eq!(config.signal.quorum, 3);
        assert_eq!(config.engine.candle_limit, 100);
        assert_eq!(config.monitor.poll_interval_secs, 2);
        assert_eq!(config.monitor.timeout_secs, 300);
        assert_eq!(config.risk_management.stop_atr_multiplier, dec!(1.5));
        assert_eq!(config.persistence.backend, PersistenceBackend::Memory);
        assert!(!config.exchange.live_trading_enabled);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let file = write_config(
            r#"
            [engine]
            tick_interval_secs = 30

            [risk_management]
            risk_pct = 2.5
            leverage = 20

            [signal]
            quorum = 4

            [persistence]
            backend = "postgres"

            [[bots]]
            symbol = "ETHUSDT"
            interval = "1h"
            confirmation_interval = "4h"
            "#,
        );

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.engine.tick_interval_secs, 30);
        assert_eq!(config.risk_management.risk_pct, Some(dec!(2.5)));
        assert_eq!(config.risk_management.leverage, Some(20));
        assert_eq!(config.signal.quorum, 4);
        assert_eq!(config.persistence.backend, PersistenceBackend::Postgres);
        assert_eq!(config.bots[0].confirmation_interval.as_deref(), Some("4h"));
    }

    #[test]
    fn two_bots_on_one_symbol_are_rejected() {
        let file = write_config(
            r#"
            [[bots]]
            symbol = "BTCUSDT"
            interval = "15m"

            [[bots]]
            symbol = "btcusdt"
            interval = "1h"
            "#,
        );

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn disabled_duplicate_is_allowed() {
        let file = write_config(
            r#"
            [[bots]]
            symbol = "BTCUSDT"
            interval = "15m"

            [[bots]]
            symbol = "BTCUSDT"
            interval = "1h"
            enabled = false
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.enabled_bots().count(), 1);
    }

    #[test]
    fn out_of_range_quorum_is_rejected() {
        let file = write_config(
            r#"
            [signal]
            quorum = 7

            [[bots]]
            symbol = "BTCUSDT"
            interval = "15m"
            "#,
        );

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn poll_interval_must_be_below_timeout() {
        let file = write_config(
            r#"
            [monitor]
            poll_interval_secs = 10
            timeout_secs = 10

            [[bots]]
            symbol = "BTCUSDT"
            interval = "15m"
            "#,
        );

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn config_without_bots_is_rejected() {
        let file = write_config("[engine]\ntick_interval_secs = 60\n");
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_config("/definitely/not/here/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
