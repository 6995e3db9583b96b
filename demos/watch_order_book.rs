//! Stream the BTC/USDT order book from Coincatch and print the top of book.
//!
//! Run with:
//!
//! ```bash
//! RUST_LOG=market_sync=info cargo run --example watch_order_book -- BTC/USDT
//! ```

use std::sync::Arc;

use market_sync::venue::{coincatch, CoincatchProtocol};
use market_sync::{Config, StreamClient, StreamEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), market_sync::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let symbol = std::env::args().nth(1).unwrap_or_else(|| "BTC/USDT".to_string());

    let config = Config::new(coincatch::PUBLIC_URL)?;
    let client = StreamClient::connect(config, Arc::new(CoincatchProtocol::new()), None).await?;
    let mut book = client.watch_order_book(&symbol, None).await?;

    let mut updates = 0u64;
    while let Some(event) = book.recv().await {
        match event {
            StreamEvent::OrderBook(view) => {
                updates += 1;
                if let (Some((bid, bid_amount)), Some((ask, ask_amount))) =
                    (view.best_bid(), view.best_ask())
                {
                    println!(
                        "#{:<6} {} bid {} x {} | ask {} x {} | spread {}",
                        updates,
                        symbol,
                        bid,
                        bid_amount,
                        ask,
                        ask_amount,
                        ask - bid
                    );
                }
                if updates >= 50 {
                    break;
                }
            }
            StreamEvent::Error(e) => eprintln!("stream error: {}", e),
            StreamEvent::Data(_) => {}
        }
    }

    if book.lagged() > 0 {
        println!("{} updates dropped while printing", book.lagged());
    }
    client.unsubscribe(book).await?;
    client.shutdown().await;
    Ok(())
}
