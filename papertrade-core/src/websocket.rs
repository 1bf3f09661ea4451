//! WebSocket wire protocol for the market data stream
//!
//! These types define the messages exchanged between the client and the
//! streaming endpoint.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Order, Portfolio, Quote};

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Control frames sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to quote updates for a set of symbols
    Subscribe { symbols: Vec<String> },
    /// Unsubscribe from quote updates for a set of symbols
    Unsubscribe { symbols: Vec<String> },
    /// Ping to keep the connection alive
    Ping { timestamp: i64 },
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Events sent from server to client, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Quote tick for a subscribed symbol
    Quote { symbol: String, data: QuoteData },
    /// An order changed status (accepted, filled, cancelled, ...)
    OrderUpdate { order: Order },
    /// Full portfolio snapshot push
    PortfolioUpdate { portfolio: Portfolio },
    /// Subscription confirmed
    Subscribed { symbols: Vec<String> },
    /// Unsubscription confirmed
    Unsubscribed { symbols: Vec<String> },
    /// Pong response to a client ping
    Pong {
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Server-side error notice
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
}

/// Payload of a quote tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteData {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
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

impl QuoteData {
    /// Attach the symbol the tick was delivered under
    pub fn into_quote(self, symbol: impl Into<String>) -> Quote {
        Quote {
            symbol: symbol.into(),
            bid: self.bid,
            ask: self.ask,
            last: self.last,
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

// ============================================================================
// Connection state
// ============================================================================

/// State of the streaming connection, surfaced in the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connected and receiving data
    Connected,
    /// Attempting to connect
    Connecting,
    /// Disconnected, will attempt reconnect
    Disconnected,
    /// Connection failed, not retrying
    Failed,
}

impl ConnectionState {
    /// Whether streamed data should be treated as stale
    pub fn is_stale(&self) -> bool {
        !matches!(self, ConnectionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_frame_shape() {
        let msg = ClientMessage::Subscribe {
            symbols: vec!["AAPL".to_string(), "TSLA".to_string()],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["action"], "subscribe");
        assert_eq!(json["symbols"][1], "TSLA");
    }

    #[test]
    fn test_quote_event_parses() {
        let raw = r#"{
            "type": "quote",
            "symbol": "AAPL",
            "data": {
                "bid": 150.00,
                "ask": 150.05,
                "last": 150.02,
                "change": 1.5,
                "change_percent": 1.01,
                "volume": 1200,
                "timestamp": "2024-01-15T10:30:00Z"
            }
        }"#;

        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ServerMessage::Quote { symbol, data } => {
                assert_eq!(symbol, "AAPL");
                assert_eq!(data.volume, Some(1200));
                let quote = data.into_quote(symbol);
                assert_eq!(quote.symbol, "AAPL");
            }
            other => panic!("expected quote, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_a_parse_error() {
        let raw = r#"{"type": "research_update", "payload": {}}"#;
        assert!(serde_json::from_str::<ServerMessage>(raw).is_err());
    }

    #[test]
    fn test_stale_states() {
        assert!(!ConnectionState::Connected.is_stale());
        assert!(ConnectionState::Connecting.is_stale());
        assert!(ConnectionState::Disconnected.is_stale());
        assert!(ConnectionState::Failed.is_stale());
    }
}
