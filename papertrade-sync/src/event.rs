//! Event normalization
//!
//! Converts raw inbound frames into typed domain events. Malformed input
//! from the network is dropped with a diagnostic, never propagated into the
//! state store.

use tracing::{debug, info, warn};

use papertrade_core::{Order, Portfolio, Quote, ServerMessage};

/// A normalized update ready for the state store
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A quote tick for a subscribed symbol
    QuoteTick(Quote),
    /// An order changed status
    OrderStatusChanged(Order),
    /// A full portfolio push
    PortfolioSnapshot(Portfolio),
}

/// Normalize one raw frame into a domain event
///
/// Subscription acks, pong, and server error notices are consumed here and
/// yield `None`; so does anything that fails to parse.
pub fn normalize(raw: &str) -> Option<DomainEvent> {
    let message = match serde_json::from_str::<ServerMessage>(raw) {
        Ok(message) => message,
        Err(e) => {
            debug!("[Stream] Dropping malformed message: {} (error: {})", raw, e);
            return None;
        }
    };

    match message {
        ServerMessage::Quote { symbol, data } => Some(DomainEvent::QuoteTick(data.into_quote(symbol))),
        ServerMessage::OrderUpdate { order } => Some(DomainEvent::OrderStatusChanged(order)),
        ServerMessage::PortfolioUpdate { portfolio } => {
            Some(DomainEvent::PortfolioSnapshot(portfolio))
        }
        ServerMessage::Subscribed { symbols } => {
            info!("[Stream] Subscribed to {:?}", symbols);
            None
        }
        ServerMessage::Unsubscribed { symbols } => {
            info!("[Stream] Unsubscribed from {:?}", symbols);
            None
        }
        ServerMessage::Pong { .. } => {
            debug!("[Stream] Pong received");
            None
        }
        ServerMessage::Error { message, code } => {
            warn!("[Stream] Server error: {:?} - {}", code, message);
            None
        }
    }
}
