//! Authoritative in-memory state store
//!
//! Holds the snapshot of quotes, orders, positions, and portfolio that the
//! UI renders. Normalized stream events, REST snapshot fetches, and
//! optimistic mutations all merge into it under the rules below; readers only
//! ever see immutable clones, so no reader can observe a partially-applied
//! update or corrupt the state.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};

use papertrade_core::{ConnectionState, Order, OrderStatus, Portfolio, Position, Quote};

use crate::event::DomainEvent;

/// Immutable view of the synchronized state
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Latest quote per symbol
    pub quotes: HashMap<String, Quote>,
    /// Orders keyed by server id; pending submissions are keyed (and
    /// temporarily carry) their client correlation id until reconciled
    pub orders: HashMap<String, Order>,
    /// Open positions keyed by symbol
    pub positions: HashMap<String, Position>,
    /// Portfolio summary, absent until the first authoritative read
    pub portfolio: Option<Portfolio>,
    /// Order ids with a cancel in flight (UI sub-state, not a status)
    pub cancel_requested: HashSet<String>,
    /// Streaming connection state
    pub connection: ConnectionState,
    /// Latest market-data error surfaced to the UI
    pub market_error: Option<String>,
    /// Latest orders error (mutation failures, desync diagnostics)
    pub orders_error: Option<String>,
    /// Latest portfolio/positions error
    pub portfolio_error: Option<String>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            quotes: HashMap::new(),
            orders: HashMap::new(),
            positions: HashMap::new(),
            portfolio: None,
            cancel_requested: HashSet::new(),
            connection: ConnectionState::Disconnected,
            market_error: None,
            orders_error: None,
            portfolio_error: None,
        }
    }
}

impl StoreSnapshot {
    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Orders sorted newest first
    pub fn orders_by_recency(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.values().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// Orders still working on the server
    pub fn open_orders(&self) -> Vec<&Order> {
        self.orders.values().filter(|o| !o.is_terminal()).collect()
    }

    pub fn is_cancel_requested(&self, id: &str) -> bool {
        self.cancel_requested.contains(id)
    }

    /// Whether streamed data should carry a stale indicator
    pub fn is_stale(&self) -> bool {
        self.connection.is_stale()
    }
}

/// Outcome of marking an order for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelEligibility {
    Accepted,
    NotFound,
    NotCancellable(OrderStatus),
}

/// The single owner of the synchronized entities
///
/// All mutations serialize on one write lock; `snapshot()` clones under the
/// read lock. Every mutation publishes the new snapshot on a watch channel
/// for reactive readers.
pub struct StateStore {
    inner: RwLock<StoreSnapshot>,
    watch_tx: watch::Sender<StoreSnapshot>,
}

impl StateStore {
    pub fn new() -> Self {
        let snapshot = StoreSnapshot::default();
        let (watch_tx, _) = watch::channel(snapshot.clone());
        Self {
            inner: RwLock::new(snapshot),
            watch_tx,
        }
    }

    /// Current state, cloned
    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().clone()
    }

    /// Reactive read path: yields a new snapshot after every apply
    pub fn watch(&self) -> watch::Receiver<StoreSnapshot> {
        self.watch_tx.subscribe()
    }

    fn publish(&self, state: &StoreSnapshot) {
        self.watch_tx.send_replace(state.clone());
    }

    // ========================================================================
    // Stream events
    // ========================================================================

    /// Apply one normalized stream event
    pub fn apply_event(&self, event: DomainEvent) {
        let mut state = self.inner.write();
        match event {
            DomainEvent::QuoteTick(quote) => Self::apply_quote(&mut state, quote),
            DomainEvent::OrderStatusChanged(order) => Self::upsert_order(&mut state, order),
            DomainEvent::PortfolioSnapshot(portfolio) => {
                // Cross-position aggregate: wholesale replace, never merge
                state.portfolio = Some(portfolio);
                state.portfolio_error = None;
            }
        }
        self.publish(&state);
    }

    fn apply_quote(state: &mut StoreSnapshot, quote: Quote) {
        if let Some(existing) = state.quotes.get(&quote.symbol) {
            if !quote.is_newer_than(existing) {
                debug!(
                    "[Store] Dropping stale quote for {} ({} < {})",
                    quote.symbol, quote.timestamp, existing.timestamp
                );
                return;
            }
        }

        if let Some(position) = state.positions.get_mut(&quote.symbol) {
            position.apply_price(quote.last);
        }
        state.quotes.insert(quote.symbol.clone(), quote);
    }

    fn upsert_order(state: &mut StoreSnapshot, incoming: Order) {
        match state.orders.get(&incoming.id) {
            Some(existing) => {
                if existing.status.can_advance_to(incoming.status) {
                    let merged = Self::merge_order(existing, incoming);
                    if merged.is_terminal() {
                        state.cancel_requested.remove(&merged.id);
                    }
                    state.orders.insert(merged.id.clone(), merged);
                } else {
                    // A proposed edge the state machine forbids means the
                    // server and client views diverged; surface it.
                    warn!(
                        "[Store] Dropping invalid order transition {} -> {} for {}",
                        existing.status, incoming.status, incoming.id
                    );
                    state.orders_error = Some(format!(
                        "Ignored out-of-order update for order {}: {} -> {}",
                        incoming.id, existing.status, incoming.status
                    ));
                }
            }
            None => {
                // A push can arrive before the REST confirmation of a
                // locally-submitted order; insert whatever status it carries.
                state.orders.insert(incoming.id.clone(), incoming);
            }
        }
    }

    fn merge_order(existing: &Order, incoming: Order) -> Order {
        let mut merged = incoming;
        // Correlation id and lifecycle timestamps are set monotonically;
        // never lose one that is already known.
        merged.client_order_id = merged
            .client_order_id
            .or_else(|| existing.client_order_id.clone());
        merged.submitted_at = merged.submitted_at.or(existing.submitted_at);
        merged.filled_at = merged.filled_at.or(existing.filled_at);
        merged.cancelled_at = merged.cancelled_at.or(existing.cancelled_at);
        merged
    }

    // ========================================================================
    // REST snapshots
    // ========================================================================

    /// Apply a REST quote fetch (same last-timestamp-wins rule as a tick)
    pub fn apply_quote_fetch(&self, quote: Quote) {
        let mut state = self.inner.write();
        Self::apply_quote(&mut state, quote);
        state.market_error = None;
        self.publish(&state);
    }

    /// Merge an authoritative order list fetch
    ///
    /// The fetch may be paginated or filtered: it is authoritative only for
    /// the ids it returns. Locally terminal orders absent from it are
    /// retained, and a stale row can never regress a locally advanced order.
    pub fn apply_orders(&self, fetched: Vec<Order>) {
        let mut state = self.inner.write();
        for order in fetched {
            // A fetched order confirming an optimistic submission resolves
            // the pending entry keyed by its correlation id.
            if let Some(cid) = order.client_order_id.as_deref() {
                if cid != order.id {
                    let resolved = state
                        .orders
                        .get(cid)
                        .map(|pending| pending.status == OrderStatus::PendingSubmission)
                        .unwrap_or(false);
                    if resolved {
                        state.orders.remove(cid);
                    }
                }
            }

            match state.orders.get(&order.id) {
                Some(existing) if !existing.status.can_advance_to(order.status) => {
                    debug!(
                        "[Store] Fetched row for order {} is behind local status {}",
                        order.id, existing.status
                    );
                }
                _ => Self::upsert_order(&mut state, order),
            }
        }
        state.orders_error = None;
        self.publish(&state);
    }

    /// Wholesale-replace the position set
    ///
    /// Absence from the refreshed row-set implies closure. Derived fields are
    /// recomputed from the latest known quote so a stale fetch price cannot
    /// roll back a fresher tick.
    pub fn apply_positions(&self, positions: Vec<Position>) {
        let mut state = self.inner.write();
        let mut replaced = HashMap::with_capacity(positions.len());
        for mut position in positions {
            if let Some(quote) = state.quotes.get(&position.symbol) {
                position.apply_price(quote.last);
            }
            replaced.insert(position.symbol.clone(), position);
        }
        state.positions = replaced;
        state.portfolio_error = None;
        self.publish(&state);
    }

    /// Wholesale-replace the portfolio summary
    pub fn apply_portfolio(&self, portfolio: Portfolio) {
        let mut state = self.inner.write();
        state.portfolio = Some(portfolio);
        state.portfolio_error = None;
        self.publish(&state);
    }

    // ========================================================================
    // Optimistic mutations
    // ========================================================================

    /// Insert an optimistic pending-submission order, keyed by its
    /// correlation id
    pub fn insert_pending(&self, order: Order) {
        debug_assert_eq!(order.status, OrderStatus::PendingSubmission);
        let mut state = self.inner.write();
        state.orders.insert(order.id.clone(), order);
        self.publish(&state);
    }

    /// Replace a pending entry with the server-confirmed order
    ///
    /// If a push already advanced the server order past the confirmation
    /// response, the more advanced state wins; either way exactly one entry
    /// remains.
    pub fn resolve_pending(&self, correlation_id: &str, server_order: Order) {
        let mut state = self.inner.write();
        state.orders.remove(correlation_id);

        match state.orders.get(&server_order.id) {
            Some(existing) if !existing.status.can_advance_to(server_order.status) => {
                debug!(
                    "[Store] Confirmation for order {} arrived after a {} push; keeping push state",
                    server_order.id, existing.status
                );
            }
            _ => Self::upsert_order(&mut state, server_order),
        }
        state.orders_error = None;
        self.publish(&state);
    }

    /// Roll back an optimistic entry after a rejected submission
    pub fn remove_pending(&self, correlation_id: &str) {
        let mut state = self.inner.write();
        state.orders.remove(correlation_id);
        self.publish(&state);
    }

    /// Mark an order as cancel-requested if its status allows it
    pub fn request_cancel(&self, id: &str) -> CancelEligibility {
        let mut state = self.inner.write();
        let eligibility = match state.orders.get(id) {
            None => CancelEligibility::NotFound,
            Some(order) if order.is_cancellable() => {
                state.cancel_requested.insert(id.to_string());
                CancelEligibility::Accepted
            }
            Some(order) => CancelEligibility::NotCancellable(order.status),
        };
        if eligibility == CancelEligibility::Accepted {
            self.publish(&state);
        }
        eligibility
    }

    /// Clear the cancel-requested flag after a failed cancel call
    pub fn clear_cancel_requested(&self, id: &str) {
        let mut state = self.inner.write();
        if state.cancel_requested.remove(id) {
            self.publish(&state);
        }
    }

    // ========================================================================
    // Connection and error surfaces
    // ========================================================================

    pub fn set_connection_state(&self, connection: ConnectionState) {
        let mut state = self.inner.write();
        if state.connection != connection {
            state.connection = connection;
            self.publish(&state);
        }
    }

    pub fn set_market_error(&self, error: Option<String>) {
        let mut state = self.inner.write();
        state.market_error = error;
        self.publish(&state);
    }

    pub fn set_orders_error(&self, error: Option<String>) {
        let mut state = self.inner.write();
        state.orders_error = error;
        self.publish(&state);
    }

    pub fn set_portfolio_error(&self, error: Option<String>) {
        let mut state = self.inner.write();
        state.portfolio_error = error;
        self.publish(&state);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read();
        f.debug_struct("StateStore")
            .field("quotes", &state.quotes.len())
            .field("orders", &state.orders.len())
            .field("positions", &state.positions.len())
            .field("connection", &state.connection)
            .finish()
    }
}
