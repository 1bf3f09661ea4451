//! Position and portfolio structures

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position in a single symbol
///
/// At most one position exists per symbol. `current_price` and the fields
/// derived from it are recomputed locally from the latest quote; they are
/// never pushed independently of the price that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Number of shares/units held
    pub quantity: Decimal,

    /// Average price paid per unit
    pub average_entry_price: Decimal,

    /// Latest known price for the symbol
    #[serde(default)]
    pub current_price: Decimal,

    /// quantity * current_price
    #[serde(default)]
    pub market_value: Decimal,

    /// Unrealized profit/loss at current_price
    #[serde(default)]
    pub unrealized_pnl: Decimal,

    /// Unrealized P&L as a percentage of cost basis
    #[serde(default)]
    pub unrealized_pnl_pct: Decimal,
}

impl Position {
    /// Cost basis of the position
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_entry_price
    }

    /// Recompute the derived fields from a new price
    pub fn apply_price(&mut self, price: Decimal) {
        self.current_price = price;
        self.market_value = self.quantity * price;
        self.unrealized_pnl = self.market_value - self.cost_basis();
        self.unrealized_pnl_pct = if self.cost_basis().is_zero() {
            Decimal::ZERO
        } else {
            (self.unrealized_pnl / self.cost_basis()) * Decimal::from(100)
        };
    }
}

/// Account-wide portfolio summary
///
/// A cross-position aggregate: always replaced wholesale by the latest
/// authoritative read or push, never field-merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash_balance: Decimal,

    /// Market value of all open positions
    #[serde(default)]
    pub position_value: Decimal,

    /// cash_balance + position_value
    pub total_equity: Decimal,

    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_pnl: Decimal,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apply_price_recomputes_derived_fields() {
        let mut position = Position {
            symbol: "AAPL".to_string(),
            quantity: dec!(10),
            average_entry_price: dec!(100),
            current_price: Decimal::ZERO,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
        };

        position.apply_price(dec!(110));

        assert_eq!(position.market_value, dec!(1100));
        assert_eq!(position.unrealized_pnl, dec!(100));
        assert_eq!(position.unrealized_pnl_pct, dec!(10));
    }

    #[test]
    fn test_apply_price_zero_cost_basis() {
        let mut position = Position {
            symbol: "FREE".to_string(),
            quantity: dec!(5),
            average_entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
        };

        position.apply_price(dec!(3));

        assert_eq!(position.market_value, dec!(15));
        assert_eq!(position.unrealized_pnl_pct, Decimal::ZERO);
    }
}
