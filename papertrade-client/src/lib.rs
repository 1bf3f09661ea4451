//! REST API clients for the Papertrade platform
//!
//! Provides the order/portfolio/market client consumed by the sync layer,
//! the auth client, and the credential storage seam.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{AuthClient, CredentialStore, MemoryCredentialStore};
pub use client::{ApiClient, ClientConfig, TradingApi};
pub use types::{
    CancelOrderResponse, OrderListResponse, PositionListResponse, QuoteResponse, RegisterRequest,
    SearchResponse, TokenResponse, UserProfile,
};
