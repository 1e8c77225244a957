use core_types::OrderAck;
use rust_decimal::Decimal;
use serde::Deserialize;

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON camelCase to Rust snake_case.
// Binance encodes decimals as strings; `Decimal` deserializes from either form.

/// The response from a successful `POST /fapi/v1/order` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub client_order_id: String,
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub orig_qty: Decimal,
    #[serde(default)]
    pub reduce_only: bool,
}

impl From<OrderResponse> for OrderAck {
    fn from(response: OrderResponse) -> Self {
        OrderAck {
            order_id: response.order_id,
            client_order_id: response.client_order_id,
            status: response.status,
            avg_price: response.avg_price,
            executed_qty: response.executed_qty,
        }
    }
}

/// A single asset's balance from `GET /fapi/v2/balance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub asset: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
}

/// A single position row from `GET /fapi/v2/positionRisk`.
/// Rows with a zero `position_amt` are flat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub un_realized_profit: Decimal,
    pub leverage: String, // Comes as a string, e.g., "10"
}

/// `GET /fapi/v1/premiumIndex?symbol=...`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndexResponse {
    pub symbol: String,
    pub mark_price: Decimal,
}

/// `POST /fapi/v1/leverage`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageResponse {
    pub leverage: u8,
    pub symbol: String,
}

/// `GET /fapi/v1/exchangeInfo`, reduced to the fields used for order precision.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter { tick_size: Decimal },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: Decimal, min_qty: Decimal },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional { notional: Decimal },
    #[serde(other)]
    Other,
}

/// One entry of `GET /fapi/v1/leverageBracket`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageBracketResponse {
    pub symbol: String,
    pub brackets: Vec<LeverageBracket>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverageBracket {
    pub initial_leverage: u8,
}

/// The bracket endpoint answers with an object or a one-element array depending on the account.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn exchange_info_filters_are_decoded_and_unknown_ones_skipped() {
        let json = r#"{
            "symbols": [{
                "symbol": "BTCUSDT",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "556.80", "maxPrice": "4529764", "tickSize": "0.10"},
                    {"filterType": "LOT_SIZE", "maxQty": "1000", "minQty": "0.001", "stepSize": "0.001"},
                    {"filterType": "MARKET_LOT_SIZE", "maxQty": "120", "minQty": "0.001", "stepSize": "0.001"},
                    {"filterType": "MIN_NOTIONAL", "notional": "100"}
                ]
            }]
        }"#;

        let info: ExchangeInfoResponse = serde_json::from_str(json).unwrap();
        let filters = &info.symbols[0].filters;

        assert_eq!(filters.len(), 4);
        assert!(matches!(filters[0], SymbolFilter::PriceFilter { tick_size } if tick_size == dec!(0.10)));
        assert!(matches!(filters[2], SymbolFilter::Other));
        assert!(matches!(filters[3], SymbolFilter::MinNotional { notional } if notional == dec!(100)));
    }

    #[test]
    fn order_response_converts_to_ack() {
        let json = r#"{
            "clientOrderId": "abc", "orderId": 42, "symbol": "BTCUSDT", "status": "FILLED",
            "side": "BUY", "type": "MARKET", "avgPrice": "101.50", "executedQty": "0.010",
            "origQty": "0.010", "reduceOnly": false
        }"#;

        let ack: OrderAck = serde_json::from_str::<OrderResponse>(json).unwrap().into();

        assert_eq!(ack.order_id, 42);
        assert_eq!(ack.avg_price, dec!(101.50));
        assert_eq!(ack.executed_qty, dec!(0.010));
    }

    #[test]
    fn leverage_brackets_accept_both_shapes() {
        let single = r#"{"symbol": "BTCUSDT", "brackets": [{"bracket": 1, "initialLeverage": 125}]}"#;
        let many = format!("[{single}]");

        let a: OneOrMany<LeverageBracketResponse> = serde_json::from_str(single).unwrap();
        let b: OneOrMany<LeverageBracketResponse> = serde_json::from_str(&many).unwrap();

        assert_eq!(a.into_vec()[0].brackets[0].initial_leverage, 125);
        assert_eq!(b.into_vec().len(), 1);
    }
}
