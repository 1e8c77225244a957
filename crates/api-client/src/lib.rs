use crate::auth::sign_request;
use crate::responses::{
    ApiErrorResponse, BalanceResponse, ExchangeInfoResponse, LeverageBracketResponse,
    LeverageResponse, OneOrMany, OrderResponse, PositionResponse, PremiumIndexResponse,
    SymbolFilter,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use configuration::settings::{ApiConfig, ExchangeConfig};
use core_types::{
    Candle, ExchangePosition, ExchangeSymbolRules, OrderAck, OrderRequest, PositionSide,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::str::FromStr;

mod auth;
pub mod error;
pub mod mock;
pub mod responses;
pub mod retry;

// --- Public API ---
pub use error::ApiError;
pub use mock::{MockExchange, MockOp};
pub use retry::RetryPolicy;

/// The generic, abstract interface for a futures exchange.
/// This trait is the contract the executor and engine use, allowing the
/// underlying implementation (live or mock) to be swapped out.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetches the most recent `limit` candles, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ApiError>;

    /// Sets the leverage for a given symbol. (Authenticated)
    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<(), ApiError>;

    /// The leverage currently configured for a symbol, if the exchange reports one. (Authenticated)
    async fn get_leverage(&self, symbol: &str) -> Result<Option<u8>, ApiError>;

    /// Precision and size constraints for a symbol.
    async fn get_symbol_rules(&self, symbol: &str) -> Result<ExchangeSymbolRules, ApiError>;

    /// Places a new order on the exchange. Never retried. (Authenticated)
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError>;

    /// Cancels every resting order on a symbol. (Authenticated)
    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ApiError>;

    /// The open position on a symbol, or `None` when flat. (Authenticated)
    async fn get_open_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ApiError>;

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ApiError>;

    /// Balance of `asset` available for new margin. (Authenticated)
    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, ApiError>;
}

/// A concrete implementation of the `ApiClient` for Binance USDⓈ-M futures.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
    retry: RetryPolicy,
}

const RECV_WINDOW_MS: &str = "5000";

impl BinanceClient {
    pub fn new(
        live_mode: bool,
        api_config: &ApiConfig,
        exchange: &ExchangeConfig,
    ) -> Result<Self, ApiError> {
        let (base_url, keys) = if live_mode {
            ("https://fapi.binance.com", &api_config.production)
        } else {
            ("https://testnet.binancefuture.com", &api_config.testnet)
        };
        Self::with_base_url(base_url, &keys.key, &keys.secret, exchange)
    }

    /// Builds a client against an arbitrary endpoint.
    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
        api_secret: &str,
        exchange: &ExchangeConfig,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-MBX-APIKEY",
            HeaderValue::from_str(api_key)
                .map_err(|e| ApiError::Signing(format!("invalid API key header: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(exchange.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_secret: api_secret.to_string(),
            retry: RetryPolicy::new(exchange.max_retries, exchange.retry_backoff()),
        })
    }

    async fn send_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(params).send().await?;
        Self::decode(response).await
    }

    /// Signs `params` with a fresh timestamp and sends them as the query string.
    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        params.insert("timestamp", Utc::now().timestamp_millis().to_string());
        params.insert("recvWindow", RECV_WINDOW_MS.to_string());

        let query_string =
            serde_qs::to_string(&params).map_err(|e| ApiError::Signing(e.to_string()))?;
        let signature = sign_request(&self.api_secret, &query_string)?;

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self.client.request(method, &url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return Err(ApiError::RateLimited(text));
        }

        if status.is_success() {
            serde_json::from_str::<T>(&text).map_err(|e| ApiError::Parse(e.to_string()))
        } else {
            let api_error: ApiErrorResponse = serde_json::from_str(&text).map_err(|e| {
                ApiError::Parse(format!(
                    "Failed to deserialize error response: {e}. Original text: {text}"
                ))
            })?;
            Err(ApiError::from_exchange(api_error.code, api_error.msg))
        }
    }

    async fn fetch_candles_once(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ApiError> {
        let raw: Vec<RawKline> = self
            .send_public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        raw.into_iter().map(RawKline::into_candle).collect()
    }

    async fn position_rows(&self, symbol: &str) -> Result<Vec<PositionResponse>, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        self.send_signed(Method::GET, "/fapi/v2/positionRisk", params)
            .await
    }

    async fn symbol_rules_once(&self, symbol: &str) -> Result<ExchangeSymbolRules, ApiError> {
        let info: ExchangeInfoResponse = self.send_public("/fapi/v1/exchangeInfo", &[]).await?;
        let symbol_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ApiError::UnknownSymbol(symbol.to_string()))?;

        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        let brackets: OneOrMany<LeverageBracketResponse> = self
            .send_signed(Method::GET, "/fapi/v1/leverageBracket", params)
            .await?;
        let max_leverage = brackets
            .into_vec()
            .into_iter()
            .filter(|b| b.symbol == symbol)
            .flat_map(|b| b.brackets)
            .map(|b| b.initial_leverage)
            .max()
            .ok_or_else(|| ApiError::Parse(format!("no leverage brackets for {symbol}")))?;

        rules_from_filters(symbol, &symbol_info.filters, max_leverage)
    }
}

/// Folds the exchange filters for one symbol into `ExchangeSymbolRules`.
fn rules_from_filters(
    symbol: &str,
    filters: &[SymbolFilter],
    max_leverage: u8,
) -> Result<ExchangeSymbolRules, ApiError> {
    let mut tick = None;
    let mut lot = None;
    let mut notional = Decimal::ZERO;

    for filter in filters {
        match filter {
            SymbolFilter::PriceFilter { tick_size } => tick = Some(*tick_size),
            SymbolFilter::LotSize { step_size, min_qty } => lot = Some((*step_size, *min_qty)),
            SymbolFilter::MinNotional { notional: n } => notional = *n,
            SymbolFilter::Other => {}
        }
    }

    let missing = |name: &str| ApiError::Parse(format!("{symbol} has no {name} filter"));
    let price_tick = tick.ok_or_else(|| missing("PRICE_FILTER"))?;
    let (quantity_step, quantity_min) = lot.ok_or_else(|| missing("LOT_SIZE"))?;

    Ok(ExchangeSymbolRules {
        quantity_step,
        quantity_min,
        price_tick,
        minimum_notional: notional,
        max_leverage,
    })
}

/// Query parameters for one order, keyed the way `/fapi/v1/order` expects.
fn order_params(order: &OrderRequest) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::new();
    params.insert("symbol", order.symbol().to_string());
    params.insert("side", order.side().as_str().to_string());
    params.insert("quantity", order.quantity().normalize().to_string());
    params.insert("newClientOrderId", order.client_order_id().simple().to_string());
    if order.is_reduce_only() {
        params.insert("reduceOnly", "true".to_string());
    }

    match order {
        OrderRequest::MarketEntry { .. } | OrderRequest::MarketExit { .. } => {
            params.insert("type", "MARKET".to_string());
            params.insert("newOrderRespType", "RESULT".to_string());
        }
        OrderRequest::StopExit { stop_price, .. } => {
            params.insert("type", "STOP_MARKET".to_string());
            params.insert("stopPrice", stop_price.normalize().to_string());
            params.insert("workingType", "MARK_PRICE".to_string());
        }
        OrderRequest::TargetExit { target_price, .. } => {
            params.insert("type", "TAKE_PROFIT_MARKET".to_string());
            params.insert("stopPrice", target_price.normalize().to_string());
            params.insert("workingType", "MARK_PRICE".to_string());
        }
        OrderRequest::TrailingExit {
            callback_rate,
            activation_price,
            ..
        } => {
            params.insert("type", "TRAILING_STOP_MARKET".to_string());
            params.insert("callbackRate", callback_rate.normalize().to_string());
            params.insert("activationPrice", activation_price.normalize().to_string());
            params.insert("workingType", "MARK_PRICE".to_string());
        }
    }
    params
}

fn position_from_row(row: PositionResponse) -> Result<Option<ExchangePosition>, ApiError> {
    if row.position_amt.is_zero() {
        return Ok(None);
    }
    let side = if row.position_amt.is_sign_positive() {
        PositionSide::Long
    } else {
        PositionSide::Short
    };
    let leverage = row
        .leverage
        .parse::<u8>()
        .map_err(|e| ApiError::Parse(format!("leverage {:?}: {e}", row.leverage)))?;

    Ok(Some(ExchangePosition {
        symbol: row.symbol,
        side,
        quantity: row.position_amt.abs(),
        entry_price: row.entry_price,
        mark_price: row.mark_price,
        unrealized_pnl: row.un_realized_profit,
        leverage,
    }))
}

// Intermediate struct for deserializing klines from Binance API
#[derive(Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

impl RawKline {
    fn into_candle(self) -> Result<Candle, ApiError> {
        let decimal = |field: &str, value: &str| {
            Decimal::from_str(value).map_err(|e| ApiError::Parse(format!("{field} {value:?}: {e}")))
        };
        let time = |field: &str, millis: i64| {
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| ApiError::Parse(format!("invalid {field}: {millis}")))
        };

        Ok(Candle {
            open_time: time("open_time", self.0)?,
            open: decimal("open", &self.1)?,
            high: decimal("high", &self.2)?,
            low: decimal("low", &self.3)?,
            close: decimal("close", &self.4)?,
            volume: decimal("volume", &self.5)?,
            close_time: time("close_time", self.6)?,
        })
    }
}

#[async_trait]
impl ApiClient for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>, ApiError> {
        self.retry
            .run("fetch_candles", || self.fetch_candles_once(symbol, interval, limit))
            .await
    }

    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<(), ApiError> {
        self.retry
            .run("set_leverage", || {
                let mut params = BTreeMap::new();
                params.insert("symbol", symbol.to_string());
                params.insert("leverage", leverage.to_string());
                self.send_signed::<LeverageResponse>(Method::POST, "/fapi/v1/leverage", params)
            })
            .await?;
        Ok(())
    }

    async fn get_leverage(&self, symbol: &str) -> Result<Option<u8>, ApiError> {
        let rows = self
            .retry
            .run("get_leverage", || self.position_rows(symbol))
            .await?;
        match rows.into_iter().find(|r| r.symbol == symbol) {
            Some(row) => row
                .leverage
                .parse::<u8>()
                .map(Some)
                .map_err(|e| ApiError::Parse(format!("leverage {:?}: {e}", row.leverage))),
            None => Ok(None),
        }
    }

    async fn get_symbol_rules(&self, symbol: &str) -> Result<ExchangeSymbolRules, ApiError> {
        self.retry
            .run("get_symbol_rules", || self.symbol_rules_once(symbol))
            .await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let response: OrderResponse = self
            .send_signed(Method::POST, "/fapi/v1/order", order_params(order))
            .await?;
        Ok(response.into())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        self.send_signed::<ApiErrorResponse>(Method::DELETE, "/fapi/v1/allOpenOrders", params)
            .await?;
        Ok(())
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Option<ExchangePosition>, ApiError> {
        let rows = self
            .retry
            .run("get_open_position", || self.position_rows(symbol))
            .await?;
        for row in rows.into_iter().filter(|r| r.symbol == symbol) {
            if let Some(position) = position_from_row(row)? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal, ApiError> {
        let index: PremiumIndexResponse = self
            .retry
            .run("get_mark_price", || async move {
                let params = [("symbol", symbol.to_string())];
                self.send_public("/fapi/v1/premiumIndex", &params).await
            })
            .await?;
        Ok(index.mark_price)
    }

    async fn get_available_balance(&self, asset: &str) -> Result<Decimal, ApiError> {
        let balances: Vec<BalanceResponse> = self
            .retry
            .run("get_available_balance", || {
                self.send_signed(Method::GET, "/fapi/v2/balance", BTreeMap::new())
            })
            .await?;
        Ok(balances
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| b.available_balance)
            .unwrap_or(Decimal::ZERO))
    }
}
