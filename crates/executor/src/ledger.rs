//! The in-process record of live positions.
//!
//! Each key owns its own async mutex. Holding a [`LedgerEntry`] makes the holder the
//! only writer for that key until it is dropped; other keys are unaffected.

use core_types::{Position, PositionKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<Option<Position>>>;

#[derive(Default)]
pub struct PositionLedger {
    slots: Mutex<HashMap<PositionKey, Slot>>,
}

/// Exclusive access to one key's slot.
pub struct LedgerEntry {
    key: PositionKey,
    guard: OwnedMutexGuard<Option<Position>>,
}

impl LedgerEntry {
    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    pub fn get(&self) -> Option<&Position> {
        self.guard.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Position> {
        self.guard.as_mut()
    }

    /// Stores `position`, returning whatever it replaced.
    pub fn put(&mut self, position: Position) -> Option<Position> {
        debug_assert_eq!(position.key(), self.key);
        self.guard.replace(position)
    }

    pub fn remove(&mut self) -> Option<Position> {
        self.guard.take()
    }
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &PositionKey) -> Slot {
        self.slots
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &PositionKey) -> LedgerEntry {
        let guard = self.slot(key).await.lock_owned().await;
        LedgerEntry {
            key: key.clone(),
            guard,
        }
    }

    pub async fn get(&self, key: &PositionKey) -> Option<Position> {
        self.lock(key).await.get().cloned()
    }

    pub async fn put(&self, position: Position) -> Option<Position> {
        self.lock(&position.key()).await.put(position)
    }

    pub async fn remove(&self, key: &PositionKey) -> Option<Position> {
        self.lock(key).await.remove()
    }

    /// Every live position, ordered by key. Must not be called while holding an entry.
    pub async fn open_positions(&self) -> Vec<Position> {
        let mut slots: Vec<(PositionKey, Slot)> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut positions = Vec::new();
        for (_, slot) in slots {
            if let Some(position) = slot.lock().await.as_ref() {
                positions.push(position.clone());
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{PositionSide, PositionStatus};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    fn position(symbol: &str) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            interval: "15m".to_string(),
            side: PositionSide::Long,
            entry_price: dec!(100),
            quantity: dec!(1),
            stop_price: dec!(98),
            target_price: dec!(105),
            opened_at: Utc::now(),
            highest_price_seen: dec!(100),
            lowest_price_seen: dec!(100),
            status: PositionStatus::Open,
        }
    }

    #[tokio::test]
    async fn put_get_remove() {
        let ledger = PositionLedger::new();
        let p = position("BTCUSDT");
        let key = p.key();

        assert!(ledger.put(p.clone()).await.is_none());
        assert_eq!(ledger.get(&key).await, Some(p.clone()));
        assert_eq!(ledger.remove(&key).await, Some(p));
        assert!(ledger.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn open_positions_skips_empty_slots() {
        let ledger = PositionLedger::new();
        ledger.put(position("ETHUSDT")).await;
        ledger.put(position("BTCUSDT")).await;
        ledger.remove(&PositionKey::new("ETHUSDT", "15m")).await;
        ledger.lock(&PositionKey::new("SOLUSDT", "15m")).await;

        let open = ledger.open_positions().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "BTCUSDT");
    }

    #[tokio::test(start_paused = true)]
    async fn entry_lock_serializes_writers() {
        let ledger = Arc::new(PositionLedger::new());
        let key = PositionKey::new("BTCUSDT", "15m");
        let mut entry = ledger.lock(&key).await;

        let waiter = {
            let ledger = ledger.clone();
            let key = key.clone();
            tokio::spawn(async move { ledger.get(&key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        entry.put(position("BTCUSDT"));
        drop(entry);

        let seen = waiter.await.unwrap();
        assert_eq!(seen.map(|p| p.symbol), Some("BTCUSDT".to_string()));
    }

    #[tokio::test]
    async fn other_keys_are_not_blocked() {
        let ledger = PositionLedger::new();
        let _held = ledger.lock(&PositionKey::new("BTCUSDT", "15m")).await;

        ledger.put(position("ETHUSDT")).await;
        assert!(ledger.get(&PositionKey::new("ETHUSDT", "15m")).await.is_some());
    }
}
