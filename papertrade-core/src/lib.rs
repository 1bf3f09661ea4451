//! Core types for the Papertrade client
//!
//! This crate defines the shared data structures used across the client,
//! including quotes, orders, positions, portfolio state, and the WebSocket
//! wire protocol.

pub mod error;
pub mod market;
pub mod order;
pub mod portfolio;
pub mod websocket;

pub use error::{ClientError, ClientResult};
pub use market::{AssetType, Quote, SymbolInfo};
pub use order::{Order, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use portfolio::{Portfolio, Position};
pub use websocket::{ClientMessage, ConnectionState, QuoteData, ServerMessage};
