use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kline interval in the exchange's wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1s")]
    Seconds1,

    #[serde(rename = "1m")]
    Minutes1,
    #[serde(rename = "3m")]
    Minutes3,
    #[serde(rename = "5m")]
    Minutes5,
    #[serde(rename = "15m")]
    Minutes15,
    #[serde(rename = "30m")]
    Minutes30,

    #[serde(rename = "1h")]
    Hours1,
    #[serde(rename = "2h")]
    Hours2,
    #[serde(rename = "4h")]
    Hours4,
    #[serde(rename = "6h")]
    Hours6,
    #[serde(rename = "8h")]
    Hours8,
    #[serde(rename = "12h")]
    Hours12,

    #[serde(rename = "1d")]
    Days1,
    #[serde(rename = "3d")]
    Days3,

    #[serde(rename = "1w")]
    Weeks1,

    #[serde(rename = "1M")]
    Months1,
}

impl KlineInterval {
    /// Wire format, e.g. "1m", "1h", "1M"
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds1 => "1s",
            Self::Minutes1 => "1m",
            Self::Minutes3 => "3m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hours1 => "1h",
            Self::Hours2 => "2h",
            Self::Hours4 => "4h",
            Self::Hours6 => "6h",
            Self::Hours8 => "8h",
            Self::Hours12 => "12h",
            Self::Days1 => "1d",
            Self::Days3 => "3d",
            Self::Weeks1 => "1w",
            Self::Months1 => "1M",
        }
    }

    pub const fn all() -> [Self; 16] {
        [
            Self::Seconds1,
            Self::Minutes1,
            Self::Minutes3,
            Self::Minutes5,
            Self::Minutes15,
            Self::Minutes30,
            Self::Hours1,
            Self::Hours2,
            Self::Hours4,
            Self::Hours6,
            Self::Hours8,
            Self::Hours12,
            Self::Days1,
            Self::Days3,
            Self::Weeks1,
            Self::Months1,
        ]
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KlineInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| format!("Unknown kline interval: {}", s))
    }
}

/// Market data stream kinds, rendered as `<symbol>@<kind>` stream names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionType {
    Trades,
    AggTrades,
    Klines { interval: KlineInterval },
    /// Diff depth when `depth` is `None`, partial book otherwise
    OrderBook { depth: Option<u32> },
    BookTicker,
    Ticker,
    /// Futures only
    MarkPrice,
}

impl SubscriptionType {
    /// Stream name for `symbol`; symbols are lowercased on the wire
    pub fn stream_name(&self, symbol: &str) -> String {
        let symbol = symbol.to_lowercase();
        match self {
            Self::Trades => format!("{}@trade", symbol),
            Self::AggTrades => format!("{}@aggTrade", symbol),
            Self::Klines { interval } => format!("{}@kline_{}", symbol, interval),
            Self::OrderBook { depth: Some(depth) } => format!("{}@depth{}@100ms", symbol, depth),
            Self::OrderBook { depth: None } => format!("{}@depth@100ms", symbol),
            Self::BookTicker => format!("{}@bookTicker", symbol),
            Self::Ticker => format!("{}@ticker", symbol),
            Self::MarkPrice => format!("{}@markPrice", symbol),
        }
    }
}
