use crate::error::DbError;
use crate::store::SignalStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{PositionKey, Signal, SignalRecord};
use sqlx::FromRow;
use sqlx::postgres::PgPool;

/// PostgreSQL-backed signal memory; survives restarts.
#[derive(Debug, Clone)]
pub struct PgSignalStore {
    pool: PgPool,
}

/// Represents a row from the `signal_records` table.
#[derive(Debug, Clone, FromRow)]
struct SignalRow {
    signal: String,
    candle_time: DateTime<Utc>,
    acted_at: DateTime<Utc>,
}

impl TryFrom<SignalRow> for SignalRecord {
    type Error = DbError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        let signal: Signal = row
            .signal
            .parse()
            .map_err(|e| DbError::Decode(format!("{e}")))?;
        Ok(SignalRecord {
            signal,
            candle_time: row.candle_time,
            acted_at: row.acted_at,
        })
    }
}

impl PgSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for PgSignalStore {
    async fn load(&self, key: &PositionKey) -> Result<Option<SignalRecord>, DbError> {
        let row = sqlx::query_as::<_, SignalRow>(
            "SELECT signal, candle_time, acted_at FROM signal_records WHERE symbol = $1 AND interval = $2",
        )
        .bind(&key.symbol)
        .bind(&key.interval)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SignalRecord::try_from).transpose()
    }

    async fn save(&self, key: &PositionKey, record: &SignalRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO signal_records (symbol, interval, signal, candle_time, acted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (symbol, interval) DO UPDATE
            SET signal = EXCLUDED.signal,
                candle_time = EXCLUDED.candle_time,
                acted_at = EXCLUDED.acted_at
            "#,
        )
        .bind(&key.symbol)
        .bind(&key.interval)
        .bind(record.signal.as_str())
        .bind(record.candle_time)
        .bind(record.acted_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(%key, signal = %record.signal, "Signal record saved.");
        Ok(())
    }
}
