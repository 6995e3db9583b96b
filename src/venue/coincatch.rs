//! Coincatch websocket protocol.
//!
//! # Wire format
//!
//! Requests are `op`/`args` envelopes, one channel argument per topic:
//!
//! ```json
//! {"op":"subscribe","args":[{"instType":"SP","channel":"books","instId":"BTCUSDT"}]}
//! ```
//!
//! Responses carry either an `event` (`subscribe`, `unsubscribe`, `login`,
//! `error`) or an `action` (`snapshot`, `update`) with the channel argument
//! echoed in `arg` and the payload in `data`. The full-depth `books` channel
//! sends a CRC32 checksum over the top 25 levels. Keepalive is the plain text
//! `ping`, answered by `pong`.
//!
//! Public markets are addressed by `instType` (`SP` spot, `MC` swap) and an
//! `instId` of base and quote ids concatenated. The protocol remembers the
//! mapping of every topic it encodes so acknowledgments and data frames can be
//! mapped back to unified symbols; markets can also be registered up front.

use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::auth::Signer;
use crate::config::Credentials;
use crate::error::Error;
use crate::orderbook::{BookChecksum, InterleavedCrc32};
use crate::types::{
    Amount, BookAction, BookUpdate, Channel, InboundFrame, MarketType, OutboundFrame, Price, Scope,
    Topic,
};

use super::{FrameClassifier, ResyncStrategy};

/// Public stream endpoint
pub const PUBLIC_URL: &str = "wss://ws.coincatch.com/public/v1/stream";

/// Levels per side covered by the `books` checksum
pub const CHECKSUM_DEPTH: usize = 25;

/// Login path signed together with the timestamp
const VERIFY_PATH: &str = "/user/verify";

/// Error codes that mean the login handshake failed
const AUTH_ERROR_CODES: [i64; 9] = [30002, 30004, 30005, 30010, 30011, 30012, 30013, 30014, 30015];

/// Unified timeframe to the suffix of the `candle` channel
const TIMEFRAMES: [(&str, &str); 9] = [
    ("1m", "1m"),
    ("5m", "5m"),
    ("15m", "15m"),
    ("30m", "30m"),
    ("1h", "1H"),
    ("4h", "4H"),
    ("12h", "12H"),
    ("1d", "1D"),
    ("1w", "1W"),
];

/// Channel argument echoed in every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelArg {
    inst_type: String,
    channel: String,
    inst_id: String,
}

impl ChannelArg {
    fn new(inst_type: &str, channel: impl Into<String>, inst_id: &str) -> Self {
        Self {
            inst_type: inst_type.to_string(),
            channel: channel.into(),
            inst_id: inst_id.to_string(),
        }
    }

    /// Recover the argument from an error text such as
    /// `instType:SP,channel:candle1D,instId:BTCUSDT doesn't exist`
    fn from_error_text(text: &str) -> Option<Self> {
        let (mut inst_type, mut channel, mut inst_id) = (None, None, None);
        for part in text.split(',') {
            let Some((key, value)) = part.trim().split_once(':') else {
                continue;
            };
            let value = value.split_whitespace().next().unwrap_or_default();
            match key {
                "instType" => inst_type = Some(value),
                "channel" => channel = Some(value),
                "instId" => inst_id = Some(value),
                _ => {}
            }
        }
        Some(Self::new(inst_type?, channel?, inst_id?))
    }
}

#[derive(Debug, Serialize)]
struct Request<T> {
    op: &'static str,
    args: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginArg<'a> {
    api_key: &'a str,
    passphrase: &'a str,
    timestamp: String,
    sign: String,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    arg: Option<ChannelArg>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(default)]
    asks: Vec<Vec<Value>>,
    #[serde(default)]
    bids: Vec<Vec<Value>>,
    #[serde(default)]
    checksum: Option<i64>,
    #[serde(default)]
    seq: Option<u64>,
    #[serde(default)]
    ts: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MarketKey {
    inst_type: String,
    inst_id: String,
}

impl MarketKey {
    fn new(inst_type: &str, inst_id: &str) -> Self {
        Self {
            inst_type: inst_type.to_ascii_uppercase(),
            inst_id: inst_id.to_string(),
        }
    }

    /// Derive the key from a unified symbol: `BTC/USDT` is spot,
    /// `BTC/USDT:USDT` is a swap
    fn derive(symbol: &str) -> Self {
        let (pair, inst_type) = match symbol.split_once(':') {
            Some((pair, _settle)) => (pair, "MC"),
            None => (symbol, "SP"),
        };
        Self::new(inst_type, &pair.replace('/', ""))
    }
}

#[derive(Debug, Default)]
struct Markets {
    by_symbol: FxHashMap<String, MarketKey>,
    by_key: FxHashMap<MarketKey, String>,
}

/// Coincatch protocol adapter
#[derive(Debug)]
pub struct CoincatchProtocol {
    markets: RwLock<Markets>,
    checksum: Arc<dyn BookChecksum>,
}

impl Default for CoincatchProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl CoincatchProtocol {
    /// Create the adapter with no pre-registered markets
    pub fn new() -> Self {
        Self {
            markets: RwLock::new(Markets::default()),
            checksum: Arc::new(InterleavedCrc32::new(CHECKSUM_DEPTH)),
        }
    }

    /// Register a market explicitly (builder form)
    pub fn with_market(self, symbol: &str, inst_type: &str, inst_id: &str) -> Self {
        self.register_market(symbol, inst_type, inst_id);
        self
    }

    /// Register the venue identifiers of a unified symbol
    pub fn register_market(&self, symbol: &str, inst_type: &str, inst_id: &str) {
        let key = MarketKey::new(inst_type, inst_id);
        let mut markets = self.markets.write();
        markets.by_key.insert(key.clone(), symbol.to_string());
        markets.by_symbol.insert(symbol.to_string(), key);
    }

    fn market_key(&self, symbol: &str) -> MarketKey {
        if let Some(key) = self.markets.read().by_symbol.get(symbol) {
            return key.clone();
        }
        let key = MarketKey::derive(symbol);
        self.register_market(symbol, &key.inst_type, &key.inst_id);
        key
    }

    fn symbol_for(&self, inst_type: &str, inst_id: &str) -> Option<String> {
        self.markets
            .read()
            .by_key
            .get(&MarketKey::new(inst_type, inst_id))
            .cloned()
    }

    fn topic_to_arg(&self, topic: &Topic) -> Result<ChannelArg, Error> {
        let symbol = match (topic.channel(), topic.scope()) {
            (Channel::Balance, Scope::Account(market)) => {
                return Ok(ChannelArg::new(private_inst_type(*market), "account", "default"));
            }
            (Channel::Orders, Scope::Account(market)) => {
                return Ok(ChannelArg::new(private_inst_type(*market), "orders", "default"));
            }
            (Channel::Positions, Scope::Account(market)) => {
                // Positions only exist on contract accounts
                let market = match market {
                    MarketType::Inverse => MarketType::Inverse,
                    _ => MarketType::Linear,
                };
                return Ok(ChannelArg::new(private_inst_type(market), "positions", "default"));
            }
            (_, Scope::Symbol(symbol)) => symbol,
            (_, Scope::Account(_)) => {
                return Err(Error::Protocol(format!("{} needs a symbol", topic)));
            }
        };

        let channel = match topic.channel() {
            Channel::OrderBook { depth: None } => "books".to_string(),
            Channel::OrderBook { depth: Some(d @ (5 | 15)) } => format!("books{}", d),
            Channel::OrderBook { depth: Some(d) } => {
                return Err(Error::Protocol(format!("unsupported order book depth {}", d)));
            }
            Channel::Ticker => "ticker".to_string(),
            Channel::Trades => "trade".to_string(),
            Channel::Ohlcv(timeframe) => {
                let interval = TIMEFRAMES
                    .iter()
                    .find(|(unified, _)| *unified == timeframe.as_str())
                    .map(|(_, venue)| *venue)
                    .ok_or_else(|| Error::Protocol(format!("unsupported timeframe {}", timeframe)))?;
                format!("candle{}", interval)
            }
            Channel::Balance | Channel::Orders | Channel::Positions => {
                return Err(Error::Protocol(format!("{} is account scoped", topic)));
            }
        };

        let key = self.market_key(symbol);
        Ok(ChannelArg::new(&key.inst_type, channel, &key.inst_id))
    }

    fn arg_to_topic(&self, arg: &ChannelArg) -> Option<Topic> {
        match arg.channel.as_str() {
            "account" => return Some(Topic::balance_for(private_market(&arg.inst_type)?)),
            "orders" => return Some(Topic::orders_for(private_market(&arg.inst_type)?)),
            "positions" => return Some(Topic::positions_for(private_market(&arg.inst_type)?)),
            _ => {}
        }

        let channel = match arg.channel.as_str() {
            "books" => Channel::OrderBook { depth: None },
            "books5" => Channel::OrderBook { depth: Some(5) },
            "books15" => Channel::OrderBook { depth: Some(15) },
            "ticker" => Channel::Ticker,
            "trade" => Channel::Trades,
            other => {
                let interval = other.strip_prefix("candle")?;
                let (unified, _) = TIMEFRAMES.iter().find(|(_, venue)| *venue == interval)?;
                Channel::Ohlcv((*unified).to_string())
            }
        };

        let symbol = self.symbol_for(&arg.inst_type, &arg.inst_id)?;
        Some(Topic::new(channel, Scope::Symbol(symbol)))
    }

    fn classify_event(&self, event: &str, response: Response) -> InboundFrame {
        let code = response.code.as_ref().and_then(code_value);
        match event {
            "subscribe" | "unsubscribe" => {
                let Some(topic) = response.arg.as_ref().and_then(|a| self.arg_to_topic(a)) else {
                    debug!(event, arg = ?response.arg, "acknowledgment for unknown channel");
                    return InboundFrame::Ignored;
                };
                if event == "subscribe" {
                    InboundFrame::SubscribeAck(topic)
                } else {
                    InboundFrame::UnsubscribeAck(topic)
                }
            }
            "login" => InboundFrame::AuthResult {
                success: code.unwrap_or(0) == 0,
                message: response.msg,
            },
            "error" => {
                let message = response.msg.unwrap_or_default();
                let arg = response
                    .arg
                    .or_else(|| ChannelArg::from_error_text(&message));
                let topic = arg.as_ref().and_then(|a| self.arg_to_topic(a));

                if topic.is_none() && code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c)) {
                    return InboundFrame::AuthResult {
                        success: false,
                        message: Some(message),
                    };
                }
                InboundFrame::Error {
                    topic,
                    code,
                    message,
                }
            }
            other => {
                debug!(event = other, "ignoring event");
                InboundFrame::Ignored
            }
        }
    }
}

impl FrameClassifier for CoincatchProtocol {
    fn classify(&self, text: &str) -> Result<Vec<InboundFrame>, Error> {
        match text {
            "pong" => return Ok(vec![InboundFrame::Pong]),
            "ping" => return Ok(vec![InboundFrame::Ignored]),
            _ => {}
        }

        let response: Response = serde_json::from_str(text)?;
        if let Some(event) = response.event.clone() {
            return Ok(vec![self.classify_event(&event, response)]);
        }

        let (Some(arg), Some(data)) = (response.arg, response.data) else {
            return Ok(vec![InboundFrame::Ignored]);
        };
        let Some(topic) = self.arg_to_topic(&arg) else {
            debug!(?arg, "data for unknown channel");
            return Ok(vec![InboundFrame::Ignored]);
        };

        if !topic.is_order_book() {
            return Ok(vec![InboundFrame::Data {
                topic,
                payload: data,
            }]);
        }

        let action = match response.action.as_deref() {
            Some("snapshot") => BookAction::Snapshot,
            _ => BookAction::Delta,
        };
        let entries: Vec<BookData> = serde_json::from_value(data)?;
        entries
            .into_iter()
            .map(|entry| {
                Ok(InboundFrame::OrderBook {
                    topic: topic.clone(),
                    action,
                    update: book_update(entry)?,
                })
            })
            .collect()
    }

    fn encode(&self, frame: &OutboundFrame) -> Result<String, Error> {
        let (op, topics) = match frame {
            OutboundFrame::Subscribe(topic) => ("subscribe", std::slice::from_ref(topic)),
            OutboundFrame::SubscribeMany(topics) => ("subscribe", topics.as_slice()),
            OutboundFrame::Unsubscribe(topic) => ("unsubscribe", std::slice::from_ref(topic)),
            OutboundFrame::Ping => return Ok("ping".to_string()),
            OutboundFrame::ResendSnapshot(topic) => {
                return Err(Error::Protocol(format!(
                    "snapshot request for {} is not supported",
                    topic
                )));
            }
        };
        let request = Request {
            op,
            args: topics
                .iter()
                .map(|topic| self.topic_to_arg(topic))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(serde_json::to_string(&request)?)
    }

    fn login_frame(
        &self,
        credentials: &Credentials,
        signer: &dyn Signer,
        timestamp_ms: u64,
    ) -> Result<String, Error> {
        let timestamp = (timestamp_ms / 1000).to_string();
        let sign = signer.sign(&format!("{}GET{}", timestamp, VERIFY_PATH))?;
        let request = Request {
            op: "login",
            args: vec![LoginArg {
                api_key: credentials.api_key(),
                passphrase: credentials.passphrase().unwrap_or_default(),
                timestamp,
                sign,
            }],
        };
        Ok(serde_json::to_string(&request)?)
    }

    fn checksum(&self) -> Option<Arc<dyn BookChecksum>> {
        Some(Arc::clone(&self.checksum))
    }

    fn resync_strategy(&self) -> ResyncStrategy {
        ResyncStrategy::Resubscribe
    }
}

/// `instType` of the private channels: spot accounts are `spbl`, USDT
/// margined contracts `umcbl`, coin margined contracts `dmcbl`
fn private_inst_type(market: MarketType) -> &'static str {
    match market {
        MarketType::Spot => "spbl",
        MarketType::Linear => "umcbl",
        MarketType::Inverse => "dmcbl",
    }
}

fn private_market(inst_type: &str) -> Option<MarketType> {
    match inst_type.to_ascii_lowercase().as_str() {
        "spbl" => Some(MarketType::Spot),
        "umcbl" => Some(MarketType::Linear),
        "dmcbl" => Some(MarketType::Inverse),
        _ => None,
    }
}

fn code_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn decimal_value(value: &Value) -> Result<Decimal, Error> {
    let parsed = match value {
        Value::String(s) => s.parse::<Decimal>(),
        Value::Number(n) => n.to_string().parse::<Decimal>(),
        other => return Err(Error::Protocol(format!("invalid level value {}", other))),
    };
    parsed.map_err(|e| Error::Protocol(format!("invalid decimal {}: {}", value, e)))
}

fn levels(raw: &[Vec<Value>]) -> Result<Vec<(Price, Amount)>, Error> {
    raw.iter()
        .map(|level| match level.as_slice() {
            [price, amount, ..] => Ok((decimal_value(price)?, decimal_value(amount)?)),
            _ => Err(Error::Protocol(format!("malformed level {:?}", level))),
        })
        .collect()
}

fn book_update(entry: BookData) -> Result<BookUpdate, Error> {
    Ok(BookUpdate {
        bids: levels(&entry.bids)?,
        asks: levels(&entry.asks)?,
        sequence: entry.seq,
        prev_sequence: None,
        checksum: entry.checksum,
        timestamp: entry.ts.as_ref().and_then(code_value).and_then(|t| u64::try_from(t).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::auth::HmacSha256Signer;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_encode_subscribe() {
        let protocol = CoincatchProtocol::new();
        let frame = protocol
            .encode(&OutboundFrame::Subscribe(Topic::order_book("BTC/USDT", None)))
            .unwrap();
        assert_eq!(
            frame,
            r#"{"op":"subscribe","args":[{"instType":"SP","channel":"books","instId":"BTCUSDT"}]}"#
        );
    }

    #[test]
    fn test_encode_channels() {
        let protocol = CoincatchProtocol::new();
        let encode = |topic: Topic| -> Value {
            let text = protocol.encode(&OutboundFrame::Unsubscribe(topic)).unwrap();
            serde_json::from_str::<Value>(&text).unwrap()["args"][0].clone()
        };

        assert_eq!(encode(Topic::ohlcv("ETH/USDT", "1h"))["channel"], "candle1H");
        assert_eq!(encode(Topic::order_book("ETH/USDT", Some(15)))["channel"], "books15");
        let swap = encode(Topic::ticker("BTC/USDT:USDT"));
        assert_eq!(swap["instType"], "MC");
        assert_eq!(swap["instId"], "BTCUSDT");
        let balance = encode(Topic::balance());
        assert_eq!(balance["instType"], "spbl");
        assert_eq!(balance["channel"], "account");
        assert_eq!(balance["instId"], "default");
    }

    #[test]
    fn test_encode_subscribe_many_in_one_frame() {
        let protocol = CoincatchProtocol::new();
        let frame = protocol
            .encode(&OutboundFrame::SubscribeMany(vec![
                Topic::ticker("BTC/USDT"),
                Topic::ticker("ETH/USDT:USDT"),
            ]))
            .unwrap();
        assert_eq!(
            frame,
            r#"{"op":"subscribe","args":[{"instType":"SP","channel":"ticker","instId":"BTCUSDT"},{"instType":"MC","channel":"ticker","instId":"ETHUSDT"}]}"#
        );

        // One bad topic spoils the frame
        assert!(protocol
            .encode(&OutboundFrame::SubscribeMany(vec![
                Topic::ticker("BTC/USDT"),
                Topic::ohlcv("BTC/USDT", "7m"),
            ]))
            .is_err());
    }

    #[test]
    fn test_private_channels_follow_market_type() {
        let protocol = CoincatchProtocol::new();
        let arg = |topic: Topic| -> (String, String) {
            let text = protocol.encode(&OutboundFrame::Subscribe(topic)).unwrap();
            let arg = serde_json::from_str::<Value>(&text).unwrap()["args"][0].clone();
            (
                arg["instType"].as_str().unwrap().to_string(),
                arg["channel"].as_str().unwrap().to_string(),
            )
        };

        assert_eq!(arg(Topic::orders()), ("spbl".into(), "orders".into()));
        assert_eq!(
            arg(Topic::orders_for(MarketType::from_symbol("BTC/USDT:USDT"))),
            ("umcbl".into(), "orders".into())
        );
        assert_eq!(
            arg(Topic::orders_for(MarketType::from_symbol("BTC/USD:BTC"))),
            ("dmcbl".into(), "orders".into())
        );
        assert_eq!(arg(Topic::positions()), ("umcbl".into(), "positions".into()));
        assert_eq!(
            arg(Topic::positions_for(MarketType::Inverse)),
            ("dmcbl".into(), "positions".into())
        );
        assert_eq!(
            arg(Topic::balance_for(MarketType::Linear)),
            ("umcbl".into(), "account".into())
        );

        let frames = protocol
            .classify(r#"{"event":"subscribe","arg":{"instType":"dmcbl","channel":"orders","instId":"default"}}"#)
            .unwrap();
        assert_eq!(
            frames,
            vec![InboundFrame::SubscribeAck(Topic::orders_for(MarketType::Inverse))]
        );
        let frames = protocol
            .classify(r#"{"event":"subscribe","arg":{"instType":"xyz","channel":"orders","instId":"default"}}"#)
            .unwrap();
        assert_eq!(frames, vec![InboundFrame::Ignored]);
    }

    #[test]
    fn test_encode_rejects_unsupported() {
        let protocol = CoincatchProtocol::new();
        assert!(protocol
            .encode(&OutboundFrame::Subscribe(Topic::order_book("BTC/USDT", Some(20))))
            .is_err());
        assert!(protocol
            .encode(&OutboundFrame::Subscribe(Topic::ohlcv("BTC/USDT", "7m")))
            .is_err());
        assert!(protocol
            .encode(&OutboundFrame::ResendSnapshot(Topic::order_book("BTC/USDT", None)))
            .is_err());
        assert_eq!(protocol.encode(&OutboundFrame::Ping).unwrap(), "ping");
    }

    #[test]
    fn test_classify_acks() {
        let protocol = CoincatchProtocol::new().with_market("BTC/USDT", "SP", "BTCUSDT");

        let frames = protocol
            .classify(r#"{"event":"subscribe","arg":{"instType":"sp","channel":"books","instId":"BTCUSDT"}}"#)
            .unwrap();
        assert_eq!(frames, vec![InboundFrame::SubscribeAck(Topic::order_book("BTC/USDT", None))]);

        let frames = protocol
            .classify(r#"{"event":"unsubscribe","arg":{"instType":"spbl","channel":"account","instId":"default"}}"#)
            .unwrap();
        assert_eq!(frames, vec![InboundFrame::UnsubscribeAck(Topic::balance())]);
    }

    #[test]
    fn test_classify_unknown_market_is_ignored() {
        let protocol = CoincatchProtocol::new();
        let frames = protocol
            .classify(r#"{"event":"subscribe","arg":{"instType":"SP","channel":"ticker","instId":"XYZUSDT"}}"#)
            .unwrap();
        assert_eq!(frames, vec![InboundFrame::Ignored]);
    }

    #[test]
    fn test_classify_book_snapshot() {
        let protocol = CoincatchProtocol::new().with_market("BTC/USDT", "SP", "BTCUSDT");
        let text = r#"{
            "action":"snapshot",
            "arg":{"instType":"SP","channel":"books","instId":"BTCUSDT"},
            "data":[{"asks":[["27001","0.5"]],"bids":[["27000.5","8.76"]],"checksum":-1227149943,"ts":"1700000000000"}]
        }"#;

        let frames = protocol.classify(text).unwrap();
        let [InboundFrame::OrderBook { topic, action, update }] = frames.as_slice() else {
            panic!("unexpected {:?}", frames);
        };
        assert_eq!(topic, &Topic::order_book("BTC/USDT", None));
        assert_eq!(*action, BookAction::Snapshot);
        assert_eq!(update.bids, vec![(d("27000.5"), d("8.76"))]);
        assert_eq!(update.asks, vec![(d("27001"), d("0.5"))]);
        assert_eq!(update.checksum, Some(-1227149943));
        assert_eq!(update.timestamp, Some(1700000000000));
        assert_eq!(update.sequence, None);
    }

    #[test]
    fn test_venue_checksum_matches_replica() {
        let protocol = CoincatchProtocol::new();
        let mut replica = crate::orderbook::OrderBookReplica::new("BTC/USDT");
        replica.apply_snapshot(&BookUpdate {
            bids: vec![(d("27000.5"), d("8.76")), (d("26999"), d("1.2"))],
            asks: vec![(d("27001"), d("0.5"))],
            ..Default::default()
        });
        assert_eq!(protocol.checksum().unwrap().compute(&replica), 1695693851);
    }

    #[test]
    fn test_classify_data_frame() {
        let protocol = CoincatchProtocol::new().with_market("ETH/USDT", "SP", "ETHUSDT");
        let text = r#"{"action":"snapshot","arg":{"instType":"SP","channel":"ticker","instId":"ETHUSDT"},"data":[{"last":"1800.5"}]}"#;

        match protocol.classify(text).unwrap().as_slice() {
            [InboundFrame::Data { topic, payload }] => {
                assert_eq!(topic, &Topic::ticker("ETH/USDT"));
                assert_eq!(payload[0]["last"], "1800.5");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_errors() {
        let protocol = CoincatchProtocol::new().with_market("BTC/USDT", "SP", "BTCUSDT");

        let frames = protocol
            .classify(r#"{"event":"error","code":30001,"msg":"instType:SP,channel:candle1D,instId:BTCUSDT doesn't exist"}"#)
            .unwrap();
        assert_eq!(
            frames,
            vec![InboundFrame::Error {
                topic: Some(Topic::ohlcv("BTC/USDT", "1d")),
                code: Some(30001),
                message: "instType:SP,channel:candle1D,instId:BTCUSDT doesn't exist".to_string(),
            }]
        );

        let frames = protocol
            .classify(r#"{"event":"error","code":30005,"msg":"login failed"}"#)
            .unwrap();
        assert_eq!(
            frames,
            vec![InboundFrame::AuthResult {
                success: false,
                message: Some("login failed".to_string()),
            }]
        );
    }

    #[test]
    fn test_classify_login_and_pong() {
        let protocol = CoincatchProtocol::new();
        assert_eq!(
            protocol.classify(r#"{"event":"login","code":0}"#).unwrap(),
            vec![InboundFrame::AuthResult {
                success: true,
                message: None
            }]
        );
        assert_eq!(protocol.classify("pong").unwrap(), vec![InboundFrame::Pong]);
        assert!(protocol.classify("not json").is_err());
    }

    #[test]
    fn test_login_frame() {
        let protocol = CoincatchProtocol::new();
        let credentials = Credentials::new("my-key", Some("my-pass".to_string()));
        let signer = HmacSha256Signer::new("secret");

        let frame = protocol
            .login_frame(&credentials, &signer, 1_700_000_000_123)
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], "login");
        assert_eq!(value["args"][0]["apiKey"], "my-key");
        assert_eq!(value["args"][0]["passphrase"], "my-pass");
        assert_eq!(value["args"][0]["timestamp"], "1700000000");
        assert_eq!(
            value["args"][0]["sign"],
            "asp8h2LSGzNFWF9BshQJj0WiZA5uDIWsAk9FCfz2Ilk="
        );
    }
}
