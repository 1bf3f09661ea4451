//! Sync session: the composition root of the synchronization layer
//!
//! Wires the transport connection, subscription multiplexer, and state store
//! together, runs the single driver task that applies events in arrival
//! order, and coordinates optimistic mutations against their eventual
//! server-confirmed state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use papertrade_client::TradingApi;
use papertrade_core::{
    ClientError, ClientResult, ConnectionState, Order, OrderRequest, OrderStatus,
};

use crate::event::normalize;
use crate::store::{CancelEligibility, StateStore, StoreSnapshot};
use crate::subscription::InterestSet;
use crate::transport::{StreamConfig, StreamConnection, StreamEvent, StreamHandle};

/// Default interval between periodic authoritative REST reads
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for a sync session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub stream: StreamConfig,
    /// Interval between periodic authoritative REST reconciliations
    pub refresh_interval: Duration,
}

impl SessionConfig {
    pub fn new(stream: StreamConfig) -> Self {
        Self {
            stream,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }
}

/// A synchronized trading session
///
/// Constructed once at the application's composition root and passed by
/// reference to consumers. Each session owns one streaming connection and
/// one state store; tests construct as many isolated sessions as they need.
pub struct SyncSession {
    api: Arc<dyn TradingApi>,
    store: Arc<StateStore>,
    stream: Arc<StreamHandle>,
    interest: Arc<Mutex<InterestSet>>,
    driver: tokio::task::JoinHandle<()>,
}

impl SyncSession {
    /// Connect the stream, spawn the driver task, and perform the initial
    /// authoritative load
    pub async fn start(config: SessionConfig, api: Arc<dyn TradingApi>) -> Self {
        let store = Arc::new(StateStore::new());
        store.set_connection_state(ConnectionState::Connecting);

        let (stream, events_rx) = StreamConnection::connect(config.stream);
        let stream = Arc::new(stream);
        let interest = Arc::new(Mutex::new(InterestSet::new()));

        let driver = tokio::spawn(Self::drive(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&stream),
            Arc::clone(&interest),
            events_rx,
            config.refresh_interval,
        ));

        let session = Self {
            api,
            store,
            stream,
            interest,
            driver,
        };

        // Initial authoritative load, mirrored later by the periodic refresh
        session.refresh_portfolio().await;
        session.refresh_positions().await;
        session.refresh_orders().await;

        session
    }

    /// Driver task: the single writer applying stream events in arrival order
    async fn drive(
        api: Arc<dyn TradingApi>,
        store: Arc<StateStore>,
        stream: Arc<StreamHandle>,
        interest: Arc<Mutex<InterestSet>>,
        mut events_rx: broadcast::Receiver<StreamEvent>,
        refresh_interval: Duration,
    ) {
        let mut shutdown = stream.shutdown_signal();
        let mut refresh = tokio::time::interval(refresh_interval);
        // The first tick fires immediately; the session start already did
        // the initial load
        refresh.tick().await;

        loop {
            if *shutdown.borrow() {
                store.set_connection_state(ConnectionState::Disconnected);
                break;
            }

            tokio::select! {
                event = events_rx.recv() => match event {
                    Ok(StreamEvent::Opened) => {
                        store.set_connection_state(ConnectionState::Connected);
                        // A fresh connection has an empty server-side
                        // subscription set: re-issue the full interest set
                        let frames = {
                            let mut interest = interest.lock();
                            interest.on_reconnect();
                            interest.take_pending()
                        };
                        for frame in frames {
                            stream.send(frame).await;
                        }
                    }
                    Ok(StreamEvent::Message(raw)) => {
                        if let Some(event) = normalize(&raw) {
                            store.apply_event(event);
                        }
                    }
                    Ok(StreamEvent::Closed { reason }) => {
                        debug!("[Sync] Stream closed: {}", reason);
                        store.set_connection_state(ConnectionState::Disconnected);
                    }
                    Ok(StreamEvent::Failed { error }) => {
                        warn!("[Sync] Stream failed: {}", error);
                        store.set_connection_state(ConnectionState::Disconnected);
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(
                            "[Sync] Event stream lagged, {} events dropped; reconciling",
                            count
                        );
                        refresh_all(api.as_ref(), &store).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        store.set_connection_state(ConnectionState::Disconnected);
                        break;
                    }
                },

                _ = refresh.tick() => {
                    refresh_all(api.as_ref(), &store).await;
                }

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        store.set_connection_state(ConnectionState::Disconnected);
                        break;
                    }
                }
            }
        }
        debug!("[Sync] Driver task ended");
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    /// Current snapshot, cloned
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Reactive snapshot stream
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.store.watch()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.snapshot().connection
    }

    pub fn is_running(&self) -> bool {
        !self.driver.is_finished()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Declare the set of symbols the UI currently cares about
    ///
    /// Computes the delta against what is already on the wire and sends only
    /// the incremental frames.
    pub async fn set_interest<I, S>(&self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let frames = {
            let mut interest = self.interest.lock();
            interest.set_interest(symbols);
            interest.take_pending()
        };
        for frame in frames {
            self.stream.send(frame).await;
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Submit an order
    ///
    /// The order appears immediately as a pending submission; the server
    /// response (or, for a timed-out call, a reconciling fetch) resolves it.
    /// Never retried automatically: a duplicate submit must not happen
    /// silently.
    pub async fn submit_order(&self, request: OrderRequest) -> ClientResult<Order> {
        let client_order_id = Uuid::new_v4().to_string();
        let optimistic = Order {
            id: client_order_id.clone(),
            client_order_id: Some(client_order_id.clone()),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            filled_avg_price: None,
            time_in_force: request.time_in_force,
            status: OrderStatus::PendingSubmission,
            rejection_reason: None,
            created_at: Utc::now(),
            submitted_at: None,
            filled_at: None,
            cancelled_at: None,
        };
        self.store.insert_pending(optimistic);

        match self.api.place_order(&request, &client_order_id).await {
            Ok(order) => {
                info!("[Sync] Order {} confirmed as {}", client_order_id, order.id);
                self.store.resolve_pending(&client_order_id, order.clone());
                Ok(order)
            }
            Err(e) if e.is_unknown_outcome() => {
                // Unknown outcome: the entry stays and an authoritative fetch
                // decides whether the order exists
                warn!("[Sync] Order submission outcome unknown: {}", e);
                self.store.set_orders_error(Some(e.to_string()));
                refresh_orders(self.api.as_ref(), &self.store).await;
                Err(e)
            }
            Err(e) => {
                warn!("[Sync] Order submission failed: {}", e);
                self.store.remove_pending(&client_order_id);
                self.store.set_orders_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Request cancellation of a working order
    ///
    /// Accepted only while the order is open or partially filled. The order
    /// is flagged cancel-requested while the call is in flight; the terminal
    /// `cancelled` status arrives via push or fetch.
    pub async fn cancel_order(&self, id: &str) -> ClientResult<()> {
        match self.store.request_cancel(id) {
            CancelEligibility::Accepted => {}
            CancelEligibility::NotFound => {
                return Err(ClientError::not_found(format!("Order not found: {}", id)));
            }
            CancelEligibility::NotCancellable(status) => {
                return Err(ClientError::internal(format!(
                    "Order {} is {} and cannot be cancelled",
                    id, status
                )));
            }
        }

        match self.api.cancel_order(id).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_unknown_outcome() => {
                warn!("[Sync] Cancel outcome unknown for {}: {}", id, e);
                refresh_orders(self.api.as_ref(), &self.store).await;
                Err(e)
            }
            Err(e) => {
                self.store.clear_cancel_requested(id);
                // A fill that raced the cancel makes the rejection expected;
                // once the order is terminal the response is a no-op
                let terminal = self
                    .store
                    .snapshot()
                    .order(id)
                    .map(Order::is_terminal)
                    .unwrap_or(false);
                if terminal {
                    debug!("[Sync] Cancel of {} resolved after terminal state; ignoring", id);
                    Ok(())
                } else {
                    warn!("[Sync] Cancel of {} failed: {}", id, e);
                    self.store.set_orders_error(Some(e.to_string()));
                    Err(e)
                }
            }
        }
    }

    // ========================================================================
    // Authoritative refreshes
    // ========================================================================

    pub async fn refresh_portfolio(&self) {
        refresh_portfolio(self.api.as_ref(), &self.store).await;
    }

    pub async fn refresh_positions(&self) {
        refresh_positions(self.api.as_ref(), &self.store).await;
    }

    pub async fn refresh_orders(&self) {
        refresh_orders(self.api.as_ref(), &self.store).await;
    }

    pub async fn refresh_quote(&self, symbol: &str) {
        match self.api.get_quote(symbol).await {
            Ok(quote) => self.store.apply_quote_fetch(quote),
            Err(e) => {
                warn!("[Sync] Quote refresh for {} failed: {}", symbol, e);
                self.store.set_market_error(Some(e.to_string()));
            }
        }
    }

    /// Stop the streaming connection and the driver task
    ///
    /// Cancels pending reconnect attempts. In-flight REST mutations are not
    /// cancelled; they resolve independently and still update the store.
    pub fn shutdown(&self) {
        self.stream.disconnect();
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("store", &self.store)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn refresh_portfolio(api: &dyn TradingApi, store: &StateStore) {
    match api.get_portfolio().await {
        Ok(portfolio) => store.apply_portfolio(portfolio),
        Err(e) => {
            warn!("[Sync] Portfolio refresh failed: {}", e);
            store.set_portfolio_error(Some(e.to_string()));
        }
    }
}

async fn refresh_positions(api: &dyn TradingApi, store: &StateStore) {
    match api.get_positions().await {
        Ok(positions) => store.apply_positions(positions),
        Err(e) => {
            warn!("[Sync] Positions refresh failed: {}", e);
            store.set_portfolio_error(Some(e.to_string()));
        }
    }
}

async fn refresh_orders(api: &dyn TradingApi, store: &StateStore) {
    match api.list_orders(None, None).await {
        Ok(orders) => store.apply_orders(orders),
        Err(e) => {
            warn!("[Sync] Orders refresh failed: {}", e);
            store.set_orders_error(Some(e.to_string()));
        }
    }
}

async fn refresh_all(api: &dyn TradingApi, store: &StateStore) {
    refresh_portfolio(api, store).await;
    refresh_positions(api, store).await;
    refresh_orders(api, store).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DomainEvent;
    use async_trait::async_trait;
    use papertrade_client::CancelOrderResponse;
    use papertrade_core::{OrderSide, OrderType, Portfolio, Position, Quote, TimeInForce};
    use rust_decimal_macros::dec;

    fn empty_portfolio() -> Portfolio {
        Portfolio {
            cash_balance: dec!(100000),
            position_value: Decimal::ZERO,
            total_equity: dec!(100000),
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            updated_at: None,
        }
    }

    fn server_order(id: &str, client_order_id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.to_string(),
            client_order_id: Some(client_order_id.to_string()),
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: dec!(10),
            filled_quantity: Decimal::ZERO,
            limit_price: None,
            stop_price: None,
            filled_avg_price: None,
            time_in_force: TimeInForce::Day,
            status,
            rejection_reason: None,
            created_at: Utc::now(),
            submitted_at: Some(Utc::now()),
            filled_at: None,
            cancelled_at: None,
        }
    }

    /// Base stub: empty account, every mutation fails loudly if unconfigured
    struct StubApi {
        place_order_result: Box<dyn Fn(&str) -> ClientResult<Order> + Send + Sync>,
        cancel_order_result: Box<dyn Fn() -> ClientResult<CancelOrderResponse> + Send + Sync>,
        cancel_delay: Duration,
        listed_orders: Mutex<Vec<Order>>,
        last_client_order_id: Mutex<Option<String>>,
    }

    impl StubApi {
        fn accepting() -> Self {
            Self {
                place_order_result: Box::new(|cid| {
                    Ok(server_order("srv-1", cid, OrderStatus::Open))
                }),
                cancel_order_result: Box::new(|| {
                    Ok(CancelOrderResponse {
                        order_id: "srv-1".to_string(),
                        status: OrderStatus::Open,
                        message: "cancel accepted".to_string(),
                    })
                }),
                cancel_delay: Duration::ZERO,
                listed_orders: Mutex::new(Vec::new()),
                last_client_order_id: Mutex::new(None),
            }
        }

        fn rejecting(reason: &'static str) -> Self {
            let mut stub = Self::accepting();
            stub.place_order_result = Box::new(move |_| Err(ClientError::api(reason)));
            stub
        }

        fn timing_out() -> Self {
            let mut stub = Self::accepting();
            stub.place_order_result =
                Box::new(|_| Err(ClientError::timeout("order submission timed out")));
            stub
        }
    }

    #[async_trait]
    impl TradingApi for StubApi {
        async fn list_orders(
            &self,
            _status: Option<OrderStatus>,
            _limit: Option<u32>,
        ) -> ClientResult<Vec<Order>> {
            let mut orders = self.listed_orders.lock().clone();
            // Echo the correlation id of the last submission, as the server
            // would after persisting the order
            if let Some(cid) = self.last_client_order_id.lock().as_deref() {
                for order in &mut orders {
                    if order.client_order_id.is_none() {
                        order.client_order_id = Some(cid.to_string());
                    }
                }
            }
            Ok(orders)
        }

        async fn place_order(
            &self,
            _request: &OrderRequest,
            client_order_id: &str,
        ) -> ClientResult<Order> {
            *self.last_client_order_id.lock() = Some(client_order_id.to_string());
            (self.place_order_result)(client_order_id)
        }

        async fn cancel_order(&self, _id: &str) -> ClientResult<CancelOrderResponse> {
            if self.cancel_delay > Duration::ZERO {
                tokio::time::sleep(self.cancel_delay).await;
            }
            (self.cancel_order_result)()
        }

        async fn get_portfolio(&self) -> ClientResult<Portfolio> {
            Ok(empty_portfolio())
        }

        async fn get_positions(&self) -> ClientResult<Vec<Position>> {
            Ok(Vec::new())
        }

        async fn get_quote(&self, symbol: &str) -> ClientResult<Quote> {
            Err(ClientError::not_found(format!("Symbol not found: {}", symbol)))
        }
    }

    async fn test_session(api: Arc<dyn TradingApi>) -> SyncSession {
        let mut stream = StreamConfig::new("test-token").with_url("ws://127.0.0.1:9/ws/market");
        stream.auto_reconnect = false;
        let config =
            SessionConfig::new(stream).with_refresh_interval(Duration::from_secs(3600));
        SyncSession::start(config, api).await
    }

    #[tokio::test]
    async fn test_submit_replaces_pending_with_server_order() {
        let session = test_session(Arc::new(StubApi::accepting())).await;

        let order = session
            .submit_order(OrderRequest::market("AAPL", OrderSide::Buy, dec!(10)))
            .await
            .unwrap();

        assert_eq!(order.id, "srv-1");

        let snapshot = session.snapshot();
        assert_eq!(snapshot.orders.len(), 1);
        assert_eq!(snapshot.order("srv-1").unwrap().status, OrderStatus::Open);
        assert!(snapshot.orders_error.is_none());
    }

    #[tokio::test]
    async fn test_rejected_submit_rolls_back_and_surfaces_error() {
        let session =
            test_session(Arc::new(StubApi::rejecting("insufficient buying power"))).await;

        let result = session
            .submit_order(OrderRequest::market("AAPL", OrderSide::Buy, dec!(10)))
            .await;

        assert!(result.is_err());

        let snapshot = session.snapshot();
        assert!(
            snapshot.orders.values().all(|o| o.symbol != "AAPL"),
            "optimistic entry must be removed"
        );
        assert!(snapshot
            .orders_error
            .as_deref()
            .unwrap()
            .contains("insufficient buying power"));
    }

    #[tokio::test]
    async fn test_timed_out_submit_keeps_entry_and_reconciles() {
        let stub = StubApi::timing_out();
        // The server did create the order despite the timeout; its row will
        // echo the correlation id of the submission once one exists
        let mut created = server_order("srv-9", "ignored", OrderStatus::Open);
        created.client_order_id = None;
        stub.listed_orders.lock().push(created);

        let session = test_session(Arc::new(stub)).await;

        let result = session
            .submit_order(OrderRequest::market("AAPL", OrderSide::Buy, dec!(10)))
            .await;

        assert!(matches!(result, Err(ClientError::Timeout(_))));

        // The reconciling fetch resolved the pending entry against the
        // server's view: exactly one order under the server id
        let snapshot = session.snapshot();
        assert_eq!(snapshot.orders.len(), 1);
        assert_eq!(snapshot.order("srv-9").unwrap().status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn test_cancel_rejected_for_terminal_order() {
        let session = test_session(Arc::new(StubApi::accepting())).await;
        session.store.apply_event(DomainEvent::OrderStatusChanged(server_order(
            "srv-1",
            "c-1",
            OrderStatus::Filled,
        )));

        let result = session.cancel_order("srv-1").await;
        assert!(result.is_err());
        assert!(!session.snapshot().is_cancel_requested("srv-1"));
    }

    #[tokio::test]
    async fn test_cancel_flags_order_while_in_flight() {
        let session = test_session(Arc::new(StubApi::accepting())).await;
        session.store.apply_event(DomainEvent::OrderStatusChanged(server_order(
            "srv-1",
            "c-1",
            OrderStatus::Open,
        )));

        session.cancel_order("srv-1").await.unwrap();

        // The store still shows the order open with the cancel flag set;
        // the terminal status arrives via push or fetch
        let snapshot = session.snapshot();
        assert_eq!(snapshot.order("srv-1").unwrap().status, OrderStatus::Open);
        assert!(snapshot.is_cancel_requested("srv-1"));
    }

    #[tokio::test]
    async fn test_fill_racing_cancel_wins() {
        let mut stub = StubApi::accepting();
        stub.cancel_delay = Duration::from_millis(100);
        stub.cancel_order_result =
            Box::new(|| Err(ClientError::api("order already filled")));
        let session = test_session(Arc::new(stub)).await;

        session.store.apply_event(DomainEvent::OrderStatusChanged(server_order(
            "srv-1",
            "c-1",
            OrderStatus::Open,
        )));

        let fill_store = Arc::clone(&session.store);
        let (cancel_result, _) = tokio::join!(session.cancel_order("srv-1"), async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let mut filled = server_order("srv-1", "c-1", OrderStatus::Filled);
            filled.filled_quantity = dec!(10);
            fill_store.apply_event(DomainEvent::OrderStatusChanged(filled));
        });

        // The rejection of the late cancel is a no-op once the order is
        // terminal
        assert!(cancel_result.is_ok());

        let snapshot = session.snapshot();
        assert_eq!(snapshot.order("srv-1").unwrap().status, OrderStatus::Filled);
        assert!(!snapshot.is_cancel_requested("srv-1"));
        assert!(snapshot.orders_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_cancel_clears_flag_and_surfaces_error() {
        let mut stub = StubApi::accepting();
        stub.cancel_order_result = Box::new(|| Err(ClientError::api("cancel rejected")));
        let session = test_session(Arc::new(stub)).await;

        session.store.apply_event(DomainEvent::OrderStatusChanged(server_order(
            "srv-1",
            "c-1",
            OrderStatus::Open,
        )));

        let result = session.cancel_order("srv-1").await;
        assert!(result.is_err());

        let snapshot = session.snapshot();
        assert!(!snapshot.is_cancel_requested("srv-1"));
        assert_eq!(snapshot.order("srv-1").unwrap().status, OrderStatus::Open);
        assert!(snapshot.orders_error.is_some());
    }

    #[tokio::test]
    async fn test_initial_load_populates_portfolio() {
        let session = test_session(Arc::new(StubApi::accepting())).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.portfolio.unwrap().cash_balance, dec!(100000));
    }

    #[tokio::test]
    async fn test_shutdown_stops_driver() {
        let session = test_session(Arc::new(StubApi::accepting())).await;
        session.shutdown();
        // Second call is idempotent
        session.shutdown();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!session.is_running());
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }
}
