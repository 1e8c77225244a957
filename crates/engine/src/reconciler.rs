use core_types::PositionKey;
use executor::{ExecutionEngine, SyncOutcome};
use std::sync::Arc;

/// Counts of what a reconciliation pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub in_sync: usize,
    pub flat: usize,
    pub adopted: usize,
    pub closed_on_exchange: usize,
    pub failed: usize,
}

/// The "Source of Truth Auditor" for the live engine.
///
/// Compares the ledger against the exchange for every configured key: positions the
/// exchange no longer holds are dropped, positions the ledger does not know about are
/// adopted as degraded so the next tick re-establishes their exits.
pub struct StateReconciler {
    executor: Arc<ExecutionEngine>,
}

impl StateReconciler {
    pub fn new(executor: Arc<ExecutionEngine>) -> Self {
        Self { executor }
    }

    /// Reconciles every key. A failure on one key is logged and does not stop the pass.
    pub async fn run_reconciliation(&self, keys: &[PositionKey]) -> ReconciliationReport {
        tracing::info!(keys = keys.len(), "Running state reconciliation check...");
        let mut report = ReconciliationReport::default();

        for key in keys {
            match self.executor.sync_with_exchange(key).await {
                Ok(SyncOutcome::InSync(_)) => report.in_sync += 1,
                Ok(SyncOutcome::Flat) => report.flat += 1,
                Ok(SyncOutcome::Adopted(position)) => {
                    tracing::warn!(
                        %key,
                        side = %position.side,
                        quantity = %position.quantity,
                        "Un-tracked position found on the exchange and adopted."
                    );
                    report.adopted += 1;
                }
                Ok(SyncOutcome::ClosedOnExchange(closed)) => {
                    tracing::warn!(%key, exit = %closed.exit_price, "Ghost position removed from the ledger.");
                    report.closed_on_exchange += 1;
                }
                Err(e) => {
                    tracing::error!(%key, error = %e, "Reconciliation failed for key.");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(?report, "Reconciliation check complete.");
        report
    }
}
