//! Papertrade REST API client
//!
//! Provides methods for the order, portfolio, and market data endpoints.
//! All authenticated calls attach the session bearer token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use papertrade_core::{
    ClientError, ClientResult, Order, OrderRequest, OrderStatus, Portfolio, Position, Quote,
    SymbolInfo,
};

use crate::types::{
    CancelOrderResponse, OrderListResponse, PositionListResponse, QuoteResponse, SearchResponse,
};

/// Default base URL for the Papertrade REST API
const DEFAULT_API_BASE: &str = "http://localhost:8000/api/v1";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the REST client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, without trailing slash
    pub base_url: String,
    /// Per-request timeout. A timed-out mutation is an unknown outcome,
    /// not a failure (see `ClientError::Timeout`).
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("PAPERTRADE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Order placement body: the request plus the client correlation id
#[derive(Serialize)]
struct PlaceOrderBody<'a> {
    #[serde(flatten)]
    request: &'a OrderRequest,
    client_order_id: &'a str,
}

/// Papertrade REST API client
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new client (unauthenticated, for public endpoints)
    pub fn new(config: ClientConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url,
            token: None,
        }
    }

    /// Create a new authenticated client
    pub fn with_auth(config: ClientConfig, token: impl Into<String>) -> Self {
        let mut client = Self::new(config);
        client.token = Some(token.into());
        client
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the client is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Helper to ensure authentication
    fn require_auth(&self) -> ClientResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| ClientError::auth("Papertrade authentication required"))
    }

    // ========================================================================
    // Order Methods
    // ========================================================================

    /// List orders, optionally filtered by status
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: Option<u32>,
    ) -> ClientResult<Vec<Order>> {
        let token = self.require_auth()?;
        let mut url = format!("{}/orders", self.base_url);

        // Build query params
        let mut params = Vec::new();
        if let Some(s) = status {
            params.push(format!("status={}", s));
        }
        if let Some(l) = limit {
            params.push(format!("limit={}", l));
        }

        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        debug!("Fetching orders from: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Order list request timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to fetch orders: {}", e))
                }
            })?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid or expired session token"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Papertrade API error ({}): {}",
                status, body
            )));
        }

        let orders_response: OrderListResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse orders response: {}", e)))?;

        Ok(orders_response.orders)
    }

    /// Place an order
    ///
    /// `client_order_id` is the caller-generated correlation id; the server
    /// echoes it back so pending submissions reconcile against later fetches.
    /// Never retried here: a duplicate submit must not happen silently.
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn place_order(
        &self,
        request: &OrderRequest,
        client_order_id: &str,
    ) -> ClientResult<Order> {
        let token = self.require_auth()?;
        let url = format!("{}/orders", self.base_url);

        debug!("Placing {:?} order for {}", request.side, request.symbol);

        let body = PlaceOrderBody {
            request,
            client_order_id,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Order submission timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to submit order: {}", e))
                }
            })?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid or expired session token"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Order rejected ({}): {}",
                status, body
            )));
        }

        let order: Order = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse order response: {}", e)))?;

        Ok(order)
    }

    /// Cancel an order by server id
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, id: &str) -> ClientResult<CancelOrderResponse> {
        let token = self.require_auth()?;
        let url = format!("{}/orders/{}", self.base_url, id);

        debug!("Cancelling order: {}", id);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Order cancel timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to cancel order: {}", e))
                }
            })?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid or expired session token"));
        }

        if response.status().as_u16() == 404 {
            return Err(ClientError::not_found(format!("Order not found: {}", id)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Cancel rejected ({}): {}",
                status, body
            )));
        }

        let cancel_response: CancelOrderResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse cancel response: {}", e)))?;

        Ok(cancel_response)
    }

    // ========================================================================
    // Portfolio Methods
    // ========================================================================

    /// Get the portfolio summary
    #[instrument(skip(self))]
    pub async fn get_portfolio(&self) -> ClientResult<Portfolio> {
        let token = self.require_auth()?;
        let url = format!("{}/portfolio", self.base_url);

        debug!("Fetching portfolio");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Portfolio request timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to fetch portfolio: {}", e))
                }
            })?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid or expired session token"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Papertrade API error ({}): {}",
                status, body
            )));
        }

        let portfolio: Portfolio = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse portfolio: {}", e)))?;

        Ok(portfolio)
    }

    /// Get all open positions
    #[instrument(skip(self))]
    pub async fn get_positions(&self) -> ClientResult<Vec<Position>> {
        let token = self.require_auth()?;
        let url = format!("{}/portfolio/positions", self.base_url);

        debug!("Fetching positions");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Positions request timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to fetch positions: {}", e))
                }
            })?;

        if response.status().as_u16() == 401 {
            return Err(ClientError::auth("Invalid or expired session token"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Papertrade API error ({}): {}",
                status, body
            )));
        }

        let positions_response: PositionListResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse positions: {}", e)))?;

        Ok(positions_response.positions)
    }

    // ========================================================================
    // Market Data Methods
    // ========================================================================

    /// Get a quote for a single symbol
    #[instrument(skip(self))]
    pub async fn get_quote(&self, symbol: &str) -> ClientResult<Quote> {
        let token = self.require_auth()?;
        let url = format!("{}/market/quote/{}", self.base_url, symbol);

        debug!("Fetching quote for: {}", symbol);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Quote request timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to fetch quote: {}", e))
                }
            })?;

        if response.status().as_u16() == 404 {
            return Err(ClientError::not_found(format!("Symbol not found: {}", symbol)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Papertrade API error ({}): {}",
                status, body
            )));
        }

        let quote_response: QuoteResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse quote: {}", e)))?;

        Ok(quote_response.to_quote())
    }

    /// Search tradable symbols
    #[instrument(skip(self))]
    pub async fn search_symbols(
        &self,
        query: &str,
        limit: Option<u32>,
    ) -> ClientResult<Vec<SymbolInfo>> {
        let token = self.require_auth()?;
        let mut url = format!("{}/market/search?query={}", self.base_url, query);
        if let Some(l) = limit {
            url.push_str(&format!("&limit={}", l));
        }

        debug!("Searching symbols: {}", query);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::timeout(format!("Search request timed out: {}", e))
                } else {
                    ClientError::network(format!("Failed to search symbols: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::api(format!(
                "Papertrade API error ({}): {}",
                status, body
            )));
        }

        let search_response: SearchResponse = response
            .json()
            .await
            .map_err(|e| ClientError::parse(format!("Failed to parse search results: {}", e)))?;

        Ok(search_response.results)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

// ============================================================================
// TradingApi trait
// ============================================================================

/// The REST surface the sync layer consumes
///
/// `ApiClient` is the production implementation; tests substitute stubs so
/// mutation and reconciliation flows run without a server.
#[async_trait]
pub trait TradingApi: Send + Sync {
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: Option<u32>,
    ) -> ClientResult<Vec<Order>>;

    async fn place_order(
        &self,
        request: &OrderRequest,
        client_order_id: &str,
    ) -> ClientResult<Order>;

    async fn cancel_order(&self, id: &str) -> ClientResult<CancelOrderResponse>;

    async fn get_portfolio(&self) -> ClientResult<Portfolio>;

    async fn get_positions(&self) -> ClientResult<Vec<Position>>;

    async fn get_quote(&self, symbol: &str) -> ClientResult<Quote>;
}

#[async_trait]
impl TradingApi for ApiClient {
    async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        limit: Option<u32>,
    ) -> ClientResult<Vec<Order>> {
        ApiClient::list_orders(self, status, limit).await
    }

    async fn place_order(
        &self,
        request: &OrderRequest,
        client_order_id: &str,
    ) -> ClientResult<Order> {
        ApiClient::place_order(self, request, client_order_id).await
    }

    async fn cancel_order(&self, id: &str) -> ClientResult<CancelOrderResponse> {
        ApiClient::cancel_order(self, id).await
    }

    async fn get_portfolio(&self) -> ClientResult<Portfolio> {
        ApiClient::get_portfolio(self).await
    }

    async fn get_positions(&self) -> ClientResult<Vec<Position>> {
        ApiClient::get_positions(self).await
    }

    async fn get_quote(&self, symbol: &str) -> ClientResult<Quote> {
        ApiClient::get_quote(self, symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papertrade_core::OrderSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_place_order_body_carries_correlation_id() {
        let request = OrderRequest::market("AAPL", OrderSide::Buy, dec!(10));
        let body = PlaceOrderBody {
            request: &request,
            client_order_id: "c-42",
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["client_order_id"], "c-42");
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["order_type"], "market");
    }

    #[test]
    fn test_unauthenticated_client_requires_auth() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:9"));
        assert!(!client.is_authenticated());
        assert!(client.require_auth().is_err());
    }
}
