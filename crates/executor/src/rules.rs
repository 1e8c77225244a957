use api_client::{ApiClient, ApiError};
use core_types::ExchangeSymbolRules;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Symbol rules fetched on first use and kept for the life of the process.
pub struct SymbolRulesCache {
    api: Arc<dyn ApiClient>,
    rules: RwLock<HashMap<String, ExchangeSymbolRules>>,
}

impl SymbolRulesCache {
    pub fn new(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            rules: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, symbol: &str) -> Result<ExchangeSymbolRules, ApiError> {
        if let Some(rules) = self.rules.read().await.get(symbol) {
            return Ok(rules.clone());
        }

        let fetched = self.api.get_symbol_rules(symbol).await?;
        tracing::debug!(
            symbol,
            step = %fetched.quantity_step,
            tick = %fetched.price_tick,
            min_notional = %fetched.minimum_notional,
            "Cached symbol rules."
        );
        self.rules
            .write()
            .await
            .insert(symbol.to_string(), fetched.clone());
        Ok(fetched)
    }
}
