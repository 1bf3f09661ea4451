//! Market data structures

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Asset class of a tradable symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Crypto,
    Etf,
}

/// A real-time quote for a single symbol
///
/// Exactly one quote is held per symbol; conflicting updates for the same
/// symbol are resolved last-timestamp-wins (see `is_newer_than`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Trading symbol (e.g. "AAPL", "BTC/USD")
    pub symbol: String,

    /// Best bid price
    pub bid: Decimal,

    /// Best ask price
    pub ask: Decimal,

    /// Last traded price
    pub last: Decimal,

    /// Absolute change since previous close
    pub change: Decimal,

    /// Percentage change since previous close
    pub change_percent: Decimal,

    /// Session high
    #[serde(default)]
    pub high: Option<Decimal>,

    /// Session low
    #[serde(default)]
    pub low: Option<Decimal>,

    /// Session open
    #[serde(default)]
    pub open: Option<Decimal>,

    /// Session volume
    #[serde(default)]
    pub volume: Option<i64>,

    /// Server-side quote timestamp
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Midpoint between bid and ask
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    /// Whether this quote supersedes `other` under last-timestamp-wins.
    ///
    /// Equal timestamps count as newer so duplicate delivery is idempotent.
    pub fn is_newer_than(&self, other: &Quote) -> bool {
        self.timestamp >= other.timestamp
    }
}

/// A symbol search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    #[serde(default)]
    pub exchange: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote_at(ts: DateTime<Utc>) -> Quote {
        Quote {
            symbol: "AAPL".to_string(),
            bid: dec!(150.00),
            ask: dec!(150.05),
            last: dec!(150.02),
            change: dec!(1.50),
            change_percent: dec!(1.01),
            high: None,
            low: None,
            open: None,
            volume: None,
            timestamp: ts,
        }
    }

    #[test]
    fn test_newer_timestamp_wins() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        let older = quote_at(t0);
        let newer = quote_at(t1);

        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
    }

    #[test]
    fn test_equal_timestamp_counts_as_newer() {
        let t0 = Utc::now();
        assert!(quote_at(t0).is_newer_than(&quote_at(t0)));
    }

    #[test]
    fn test_mid_price() {
        let quote = quote_at(Utc::now());
        assert_eq!(quote.mid(), dec!(150.025));
    }
}
