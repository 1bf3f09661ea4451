//! Smoke test against a live Papertrade server: log in, start a sync
//! session, subscribe to a few symbols, and print snapshot updates.

use std::sync::Arc;
use std::time::Duration;

use papertrade_client::{ApiClient, AuthClient, ClientConfig, CredentialStore, MemoryCredentialStore};
use papertrade_sync::{SessionConfig, StreamConfig, SyncSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let username = std::env::var("PAPERTRADE_USERNAME").unwrap_or_else(|_| "demo".to_string());
    let password = std::env::var("PAPERTRADE_PASSWORD").unwrap_or_else(|_| "demo".to_string());

    println!("1. Logging in as {}...", username);
    let auth = AuthClient::new(ClientConfig::default());
    let token = auth.login(&username, &password).await?;
    println!("✓ Logged in");

    let credentials = MemoryCredentialStore::new();
    credentials.store(&token.access_token);

    println!("2. Starting sync session...");
    let api = Arc::new(ApiClient::with_auth(
        ClientConfig::default(),
        token.access_token.clone(),
    ));
    let config = SessionConfig::new(StreamConfig::new(token.access_token));
    let session = SyncSession::start(config, api).await;
    println!("✓ Session started, connection: {:?}", session.connection_state());

    println!("3. Subscribing to AAPL, TSLA, BTC/USD...");
    session.set_interest(["AAPL", "TSLA", "BTC/USD"]).await;

    println!("4. Watching snapshots for 60 seconds...\n");
    let mut updates = session.watch();
    let started = std::time::Instant::now();

    while started.elapsed() < Duration::from_secs(60) {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow().clone();
                println!(
                    "[{:>5.1}s] connection={:?} stale={} quotes={} orders={} positions={}",
                    started.elapsed().as_secs_f64(),
                    snapshot.connection,
                    snapshot.is_stale(),
                    snapshot.quotes.len(),
                    snapshot.orders.len(),
                    snapshot.positions.len(),
                );
                for quote in snapshot.quotes.values() {
                    println!(
                        "    {} last={} bid={} ask={} ({}%)",
                        quote.symbol, quote.last, quote.bid, quote.ask, quote.change_percent
                    );
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(10)) => {
                println!(
                    "[{:>5.1}s] (quiet, connection={:?})",
                    started.elapsed().as_secs_f64(),
                    session.connection_state()
                );
            }
        }
    }

    println!("\nShutting down.");
    session.shutdown();
    Ok(())
}
