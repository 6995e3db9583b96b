//! Topic keys.
//!
//! A [`Topic`] identifies one logical stream multiplexed over the connection:
//! a channel plus either a market symbol or an account scope. Account scopes
//! are split by [`MarketType`] because venues keep separate private streams
//! for spot, linear and inverse contracts. Topics are the
//! key for the subscription registry, the pending-request table and the
//! replica engine, so they are immutable and cheap to hash.

use std::fmt;

/// Logical channel of a stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Order book; `depth` selects a fixed-depth snapshot channel when the venue has one
    OrderBook {
        /// Fixed depth (e.g. 5 or 15), `None` for the full incremental book
        depth: Option<u16>,
    },
    /// Ticker updates
    Ticker,
    /// Public trades
    Trades,
    /// Candles for the given timeframe (e.g. "1m")
    Ohlcv(String),
    /// Account balances (private)
    Balance,
    /// Own order updates (private)
    Orders,
    /// Own position updates (private)
    Positions,
}

impl Channel {
    /// Whether subscribing requires an authenticated session
    pub fn is_private(&self) -> bool {
        matches!(self, Channel::Balance | Channel::Orders | Channel::Positions)
    }

    /// Whether frames on this channel go through the replica engine
    pub fn is_order_book(&self) -> bool {
        matches!(self, Channel::OrderBook { .. })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::OrderBook { depth: None } => write!(f, "orderbook"),
            Channel::OrderBook { depth: Some(d) } => write!(f, "orderbook{}", d),
            Channel::Ticker => write!(f, "ticker"),
            Channel::Trades => write!(f, "trades"),
            Channel::Ohlcv(tf) => write!(f, "ohlcv.{}", tf),
            Channel::Balance => write!(f, "balance"),
            Channel::Orders => write!(f, "orders"),
            Channel::Positions => write!(f, "positions"),
        }
    }
}

/// Kind of market an account stream covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MarketType {
    /// Spot markets
    #[default]
    Spot,
    /// Contracts margined and settled in the quote currency (`BTC/USDT:USDT`)
    Linear,
    /// Contracts margined and settled in the base currency (`BTC/USD:BTC`)
    Inverse,
}

impl MarketType {
    /// Classify a unified symbol: `BASE/QUOTE` is spot, `BASE/QUOTE:SETTLE`
    /// is linear unless it settles in the base currency.
    pub fn from_symbol(symbol: &str) -> Self {
        let Some((pair, settle)) = symbol.split_once(':') else {
            return MarketType::Spot;
        };
        let base = pair.split_once('/').map_or(pair, |(base, _)| base);
        // Expiry suffixes such as `BTC/USD:BTC-240628` do not change the margin currency
        let settle = settle.split_once('-').map_or(settle, |(settle, _)| settle);
        if settle == base {
            MarketType::Inverse
        } else {
            MarketType::Linear
        }
    }

    /// Whether this is a contract market
    pub fn is_contract(self) -> bool {
        self != MarketType::Spot
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Spot => f.write_str("spot"),
            MarketType::Linear => f.write_str("linear"),
            MarketType::Inverse => f.write_str("inverse"),
        }
    }
}

/// What a topic is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A single market, by unified symbol (e.g. "BTC/USDT")
    Symbol(String),
    /// The account's streams for one market type
    Account(MarketType),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Symbol(s) => f.write_str(s),
            Scope::Account(market) => write!(f, "account.{}", market),
        }
    }
}

/// Dispatch and deduplication key for one logical stream
///
/// # Example
///
/// ```rust
/// use market_sync::types::Topic;
///
/// let topic = Topic::order_book("BTC/USDT", None);
/// assert_eq!(topic.to_string(), "orderbook:BTC/USDT");
/// assert!(!topic.is_private());
/// assert!(Topic::orders().is_private());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    channel: Channel,
    scope: Scope,
}

impl Topic {
    /// Create a topic from its parts
    pub fn new(channel: Channel, scope: Scope) -> Self {
        Self { channel, scope }
    }

    /// Order book for a symbol
    pub fn order_book(symbol: impl Into<String>, depth: Option<u16>) -> Self {
        Self::new(Channel::OrderBook { depth }, Scope::Symbol(symbol.into()))
    }

    /// Ticker for a symbol
    pub fn ticker(symbol: impl Into<String>) -> Self {
        Self::new(Channel::Ticker, Scope::Symbol(symbol.into()))
    }

    /// Public trades for a symbol
    pub fn trades(symbol: impl Into<String>) -> Self {
        Self::new(Channel::Trades, Scope::Symbol(symbol.into()))
    }

    /// Candles for a symbol and timeframe
    pub fn ohlcv(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self::new(
            Channel::Ohlcv(timeframe.into()),
            Scope::Symbol(symbol.into()),
        )
    }

    /// Spot account balances
    pub fn balance() -> Self {
        Self::balance_for(MarketType::Spot)
    }

    /// Account balances of one market type
    pub fn balance_for(market: MarketType) -> Self {
        Self::new(Channel::Balance, Scope::Account(market))
    }

    /// Own spot orders
    pub fn orders() -> Self {
        Self::orders_for(MarketType::Spot)
    }

    /// Own orders on one market type
    pub fn orders_for(market: MarketType) -> Self {
        Self::new(Channel::Orders, Scope::Account(market))
    }

    /// Own positions on linear contracts
    pub fn positions() -> Self {
        Self::positions_for(MarketType::Linear)
    }

    /// Own positions on one market type. Spot has no positions, so it maps
    /// to linear contracts.
    pub fn positions_for(market: MarketType) -> Self {
        let market = match market {
            MarketType::Spot => MarketType::Linear,
            other => other,
        };
        Self::new(Channel::Positions, Scope::Account(market))
    }

    /// Get the channel
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Get the scope
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Symbol, if the topic is market-scoped
    pub fn symbol(&self) -> Option<&str> {
        match &self.scope {
            Scope::Symbol(s) => Some(s),
            Scope::Account(_) => None,
        }
    }

    /// Market type of an account-scoped topic
    pub fn market_type(&self) -> Option<MarketType> {
        match self.scope {
            Scope::Account(market) => Some(market),
            Scope::Symbol(_) => None,
        }
    }

    /// Whether an authenticated session is required
    pub fn is_private(&self) -> bool {
        self.channel.is_private()
    }

    /// Whether this is an order book topic
    pub fn is_order_book(&self) -> bool {
        self.channel.is_order_book()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_topic_display() {
        assert_eq!(Topic::order_book("BTC/USDT", Some(5)).to_string(), "orderbook5:BTC/USDT");
        assert_eq!(Topic::ohlcv("ETH/USDT", "1m").to_string(), "ohlcv.1m:ETH/USDT");
        assert_eq!(Topic::balance().to_string(), "balance:account.spot");
        assert_eq!(
            Topic::orders_for(MarketType::Inverse).to_string(),
            "orders:account.inverse"
        );
    }

    #[test]
    fn test_topic_identity() {
        let mut set = HashSet::new();
        set.insert(Topic::order_book("BTC/USDT", None));
        set.insert(Topic::order_book("BTC/USDT", None));
        set.insert(Topic::order_book("BTC/USDT", Some(5)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_private_channels() {
        assert!(Topic::balance().is_private());
        assert!(Topic::positions().is_private());
        assert!(!Topic::trades("BTC/USDT").is_private());
        assert_eq!(Topic::orders().symbol(), None);
        assert_eq!(Topic::ticker("BTC/USDT").symbol(), Some("BTC/USDT"));
    }

    #[test]
    fn test_market_type_from_symbol() {
        assert_eq!(MarketType::from_symbol("BTC/USDT"), MarketType::Spot);
        assert_eq!(MarketType::from_symbol("BTC/USDT:USDT"), MarketType::Linear);
        assert_eq!(MarketType::from_symbol("BTC/USD:BTC"), MarketType::Inverse);
        assert_eq!(MarketType::from_symbol("ETH/USD:ETH-240628"), MarketType::Inverse);
        assert!(!MarketType::Spot.is_contract());
    }

    #[test]
    fn test_account_streams_split_by_market() {
        assert_ne!(Topic::orders(), Topic::orders_for(MarketType::Linear));
        assert_eq!(Topic::positions_for(MarketType::Spot), Topic::positions());
        assert_eq!(
            Topic::positions_for(MarketType::Inverse).market_type(),
            Some(MarketType::Inverse)
        );
        assert_eq!(Topic::ticker("BTC/USDT").market_type(), None);
    }
}
