//! Subscription multiplexer
//!
//! Tracks the set of symbols the UI currently cares about and computes the
//! incremental subscribe/unsubscribe frames needed to materialize it on the
//! wire. Pure state, no I/O: the session task owns the sending.

use std::collections::HashSet;

use papertrade_core::ClientMessage;

/// Declarative per-symbol interest registration
///
/// `set_interest` records the desired set; `take_pending` computes the delta
/// against the set last put on the wire and marks it sent. Rapid interest
/// changes coalesce: a symbol added and removed again before `take_pending`
/// produces no frame at all.
#[derive(Debug, Default)]
pub struct InterestSet {
    /// Symbols the UI currently wants
    desired: HashSet<String>,
    /// Symbols materialized on the wire for the current connection
    subscribed: HashSet<String>,
}

impl InterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the desired symbol set
    pub fn set_interest<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.desired = symbols.into_iter().map(Into::into).collect();
    }

    /// The currently desired symbols
    pub fn desired(&self) -> &HashSet<String> {
        &self.desired
    }

    /// Forget what the server knows about us
    ///
    /// Called on every fresh `Opened` event: a new connection starts with an
    /// empty server-side subscription set, so the next `take_pending`
    /// re-issues one subscribe for the full interest set.
    pub fn on_reconnect(&mut self) {
        self.subscribed.clear();
    }

    /// Compute the control frames needed to reach the desired set, and mark
    /// the desired set as materialized
    pub fn take_pending(&mut self) -> Vec<ClientMessage> {
        let mut to_subscribe: Vec<String> = self
            .desired
            .difference(&self.subscribed)
            .cloned()
            .collect();
        let mut to_unsubscribe: Vec<String> = self
            .subscribed
            .difference(&self.desired)
            .cloned()
            .collect();

        // Deterministic frame contents
        to_subscribe.sort();
        to_unsubscribe.sort();

        self.subscribed = self.desired.clone();

        let mut frames = Vec::new();
        if !to_unsubscribe.is_empty() {
            frames.push(ClientMessage::Unsubscribe {
                symbols: to_unsubscribe,
            });
        }
        if !to_subscribe.is_empty() {
            frames.push(ClientMessage::Subscribe {
                symbols: to_subscribe,
            });
        }
        frames
    }
}
