//! Order types and the order status state machine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// Order duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Valid for the trading day
    Day,
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
}

impl Default for TimeInForce {
    fn default() -> Self {
        TimeInForce::Day
    }
}

/// Order lifecycle status
///
/// Allowed edges:
/// `PendingSubmission -> {Open, Rejected}`;
/// `Open <-> PartiallyFilled`;
/// `{Open, PartiallyFilled} -> {Filled, Cancelled, Expired}`.
/// `Filled`, `Cancelled`, `Rejected`, and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted locally; the server has not yet assigned an id
    PendingSubmission,
    /// Accepted by the server, resting
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Whether no further status changes are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Whether a cancel request is accepted in this status
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Whether the transition `self -> next` is a legal edge.
    ///
    /// `self -> self` is legal: re-applying the same status refreshes fill
    /// quantities and timestamps under duplicate delivery.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (*self, next),
            (PendingSubmission, Open)
                | (PendingSubmission, Rejected)
                | (Open, PartiallyFilled)
                | (PartiallyFilled, Open)
                | (Open, Filled)
                | (Open, Cancelled)
                | (Open, Expired)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
                | (PartiallyFilled, Expired)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::PendingSubmission => "pending_submission",
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// A single order
///
/// Keyed by the server-assigned `id` once known. An order submitted locally
/// but not yet confirmed carries a client-generated `client_order_id` and is
/// held under that correlation id until the server response or an
/// authoritative fetch resolves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Server-assigned id, stable once assigned
    pub id: String,

    /// Client-generated correlation id, echoed back by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,

    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(default)]
    pub filled_quantity: Decimal,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub filled_avg_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Quantity still unfilled
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_cancellable(&self) -> bool {
        self.status.is_cancellable()
    }
}

/// An order placement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    /// Create a market order request
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// Create a limit order request
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(limit_price),
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// Set the order duration
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_submission_edges() {
        let pending = OrderStatus::PendingSubmission;
        assert!(pending.can_advance_to(OrderStatus::Open));
        assert!(pending.can_advance_to(OrderStatus::Rejected));
        assert!(!pending.can_advance_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_partial_fill_round_trip() {
        assert!(OrderStatus::Open.can_advance_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_advance_to(OrderStatus::Open));
        assert!(OrderStatus::PartiallyFilled.can_advance_to(OrderStatus::Filled));
    }

    #[test]
    fn test_terminal_states_admit_no_edges() {
        for terminal in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_advance_to(OrderStatus::Open));
            assert!(!terminal.can_advance_to(OrderStatus::PendingSubmission));
            // Re-applying the same terminal status stays legal
            assert!(terminal.can_advance_to(terminal));
        }
    }

    #[test]
    fn test_filled_never_reopens_after_cancel_race() {
        // A fill that lands while a cancel is in flight wins: there is no
        // edge out of Filled, so the late cancelled push is rejected.
        assert!(!OrderStatus::Filled.can_advance_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_cancellable_states() {
        assert!(OrderStatus::Open.is_cancellable());
        assert!(OrderStatus::PartiallyFilled.is_cancellable());
        assert!(!OrderStatus::PendingSubmission.is_cancellable());
        assert!(!OrderStatus::Filled.is_cancellable());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"partially_filled\"");
    }
}
