//! Raw REST response envelopes
//!
//! Wire shapes returned by the Papertrade REST API, with converters into the
//! canonical `papertrade-core` types where the two differ.

use chrono::{DateTime, Utc};
use papertrade_core::{Order, OrderStatus, Position, Quote, SymbolInfo};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote as returned by `GET /market/quote/{symbol}`
///
/// The REST endpoint uses the `*_price` field names; the stream payload and
/// the canonical `Quote` use the short forms.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    pub symbol: String,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub last_price: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub open: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl QuoteResponse {
    pub fn to_quote(self) -> Quote {
        Quote {
            symbol: self.symbol,
            bid: self.bid_price,
            ask: self.ask_price,
            last: self.last_price,
            change: self.change,
            change_percent: self.change_percent,
            high: self.high,
            low: self.low,
            open: self.open,
            volume: self.volume,
            timestamp: self.timestamp,
        }
    }
}

/// Response for `GET /orders`
#[derive(Debug, Clone, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    #[serde(default)]
    pub total: usize,
}

/// Response for `GET /portfolio/positions`
#[derive(Debug, Clone, Deserialize)]
pub struct PositionListResponse {
    pub positions: Vec<Position>,
    #[serde(default)]
    pub total: usize,
}

/// Response for `DELETE /orders/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct CancelOrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub message: String,
}

/// Response for `GET /market/search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SymbolInfo>,
    #[serde(default)]
    pub total: usize,
}

/// Bearer token issued by `POST /auth/login`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

/// Registration request body for `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub password: String,
}

/// Authenticated user profile from `GET /auth/me`
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_response_converts_field_names() {
        let raw = r#"{
            "symbol": "AAPL",
            "bid_price": "150.00",
            "ask_price": "150.05",
            "last_price": "150.02",
            "change": "1.50",
            "change_percent": "1.01",
            "volume": 31200,
            "timestamp": "2024-01-15T10:30:00Z"
        }"#;

        let response: QuoteResponse = serde_json::from_str(raw).unwrap();
        let quote = response.to_quote();

        assert_eq!(quote.bid, dec!(150.00));
        assert_eq!(quote.ask, dec!(150.05));
        assert_eq!(quote.last, dec!(150.02));
        assert_eq!(quote.volume, Some(31200));
    }

    #[test]
    fn test_order_list_response_parses() {
        let raw = r#"{
            "orders": [{
                "id": "ord-1",
                "client_order_id": "c-1",
                "symbol": "AAPL",
                "side": "buy",
                "type": "limit",
                "quantity": "10",
                "filled_quantity": "0",
                "limit_price": "150.00",
                "time_in_force": "day",
                "status": "open",
                "created_at": "2024-01-15T10:30:00Z"
            }],
            "total": 1
        }"#;

        let response: OrderListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.orders.len(), 1);
        assert_eq!(response.orders[0].status, OrderStatus::Open);
        assert_eq!(response.orders[0].client_order_id.as_deref(), Some("c-1"));
    }
}
