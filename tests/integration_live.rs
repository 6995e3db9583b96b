//! Integration tests against the live Coincatch public stream.
//!
//! These tests need network access and are skipped unless
//! `MARKET_SYNC_LIVE` is set.
//!
//! # Running
//!
//! ```bash
//! MARKET_SYNC_LIVE=1 cargo test --test integration_live
//! ```

use std::sync::Arc;
use std::time::Duration;

use market_sync::venue::{coincatch, CoincatchProtocol};
use market_sync::{Config, StreamClient, StreamEvent, SubscriptionState, Topic};
use tokio::time::timeout;

/// Skip test if live testing is not enabled
macro_rules! require_live {
    () => {
        if std::env::var("MARKET_SYNC_LIVE").is_err() {
            eprintln!("Skipping test: MARKET_SYNC_LIVE not set");
            return;
        }
    };
}

async fn connect() -> StreamClient {
    let config = Config::new(coincatch::PUBLIC_URL).unwrap();
    let result = StreamClient::connect(config, Arc::new(CoincatchProtocol::new()), None).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result);
    result.unwrap()
}

#[tokio::test]
async fn test_live_order_book() {
    require_live!();
    let client = connect().await;

    let mut book = client.watch_order_book("BTC/USDT", None).await.unwrap();
    let event = timeout(Duration::from_secs(15), book.recv())
        .await
        .expect("no book within 15s")
        .expect("stream ended");

    match event {
        StreamEvent::OrderBook(view) => {
            println!("bid {:?} ask {:?}", view.best_bid(), view.best_ask());
            assert!(!view.bids.is_empty());
            assert!(!view.asks.is_empty());
            assert!(view.best_bid().unwrap().0 < view.best_ask().unwrap().0);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    client.unsubscribe(book).await.unwrap();
    assert_eq!(
        client
            .subscription_state(&Topic::order_book("BTC/USDT", None))
            .await
            .unwrap(),
        SubscriptionState::Unsubscribed
    );
    client.shutdown().await;
}

#[tokio::test]
async fn test_live_ticker() {
    require_live!();
    let client = connect().await;

    let mut ticker = client.watch_ticker("ETH/USDT").await.unwrap();
    let event = timeout(Duration::from_secs(15), ticker.recv())
        .await
        .expect("no ticker within 15s")
        .expect("stream ended");
    assert!(matches!(event, StreamEvent::Data(_)), "got {:?}", event);

    client.shutdown().await;
}
