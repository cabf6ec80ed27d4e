use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{decode_payload, EventHeader, StreamCodec};
use crate::core::types::SubscriptionType;
use crate::exchanges::binance::types::{
    BinanceAccountPosition, BinanceAggTrade, BinanceBalanceUpdate, BinanceBookTicker,
    BinanceDepthUpdate, BinanceEventStreamTerminated, BinanceExecutionReport, BinanceKline,
    BinanceListStatus, BinanceListenKeyExpired, BinancePartialDepth, BinanceTicker, BinanceTrade,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub enum BinanceMarketEvent {
    Trade(BinanceTrade),
    AggTrade(BinanceAggTrade),
    Kline(BinanceKline),
    DepthUpdate(BinanceDepthUpdate),
    PartialDepth(BinancePartialDepth),
    BookTicker(BinanceBookTicker),
    Ticker(BinanceTicker),
    Unknown(EventHeader),
}

// book ticker and partial depth payloads carry no `e` field
#[derive(Deserialize)]
#[serde(untagged)]
enum UntaggedMarketPayload {
    BookTicker(BinanceBookTicker),
    PartialDepth(BinancePartialDepth),
}

/// Codec for spot market streams, dispatching on the `e` field
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceMarketCodec;

impl StreamCodec for BinanceMarketCodec {
    type Event = BinanceMarketEvent;

    fn decode(&self, payload: &[u8]) -> Result<Self::Event, ExchangeError> {
        let Ok(header) = EventHeader::peek(payload) else {
            return match decode_payload::<UntaggedMarketPayload>(payload)? {
                UntaggedMarketPayload::BookTicker(ticker) => {
                    Ok(BinanceMarketEvent::BookTicker(ticker))
                }
                UntaggedMarketPayload::PartialDepth(depth) => {
                    Ok(BinanceMarketEvent::PartialDepth(depth))
                }
            };
        };

        match header.event_type.as_str() {
            "trade" => decode_payload(payload).map(BinanceMarketEvent::Trade),
            "aggTrade" => decode_payload(payload).map(BinanceMarketEvent::AggTrade),
            "kline" => decode_payload(payload).map(BinanceMarketEvent::Kline),
            "depthUpdate" => decode_payload(payload).map(BinanceMarketEvent::DepthUpdate),
            "bookTicker" => decode_payload(payload).map(BinanceMarketEvent::BookTicker),
            "24hrTicker" => decode_payload(payload).map(BinanceMarketEvent::Ticker),
            _ => Ok(BinanceMarketEvent::Unknown(header)),
        }
    }
}

/// Spot user data stream events, keyed by their `e` discriminant
#[derive(Debug, Clone, PartialEq)]
pub enum BinanceUserDataEvent {
    /// `outboundAccountPosition`
    AccountPosition(BinanceAccountPosition),
    /// `balanceUpdate`
    BalanceUpdate(BinanceBalanceUpdate),
    /// `executionReport`
    ExecutionReport(Box<BinanceExecutionReport>),
    /// `listStatus`
    ListStatus(BinanceListStatus),
    /// `listenKeyExpired`
    ListenKeyExpired(BinanceListenKeyExpired),
    /// `eventStreamTerminated`
    EventStreamTerminated(BinanceEventStreamTerminated),
    /// Any discriminant this crate does not model; not an error
    Unknown(EventHeader),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceUserDataCodec;

impl StreamCodec for BinanceUserDataCodec {
    type Event = BinanceUserDataEvent;

    fn decode(&self, payload: &[u8]) -> Result<Self::Event, ExchangeError> {
        let header = EventHeader::peek(payload)?;
        match header.event_type.as_str() {
            "outboundAccountPosition" => {
                decode_payload(payload).map(BinanceUserDataEvent::AccountPosition)
            }
            "balanceUpdate" => decode_payload(payload).map(BinanceUserDataEvent::BalanceUpdate),
            "executionReport" => decode_payload(payload)
                .map(|report| BinanceUserDataEvent::ExecutionReport(Box::new(report))),
            "listStatus" => decode_payload(payload).map(BinanceUserDataEvent::ListStatus),
            "listenKeyExpired" => {
                decode_payload(payload).map(BinanceUserDataEvent::ListenKeyExpired)
            }
            "eventStreamTerminated" => {
                decode_payload(payload).map(BinanceUserDataEvent::EventStreamTerminated)
            }
            _ => Ok(BinanceUserDataEvent::Unknown(header)),
        }
    }
}

/// Create Binance stream identifiers for every symbol and subscription type
pub fn create_binance_stream_identifiers(
    symbols: &[String],
    subscription_types: &[SubscriptionType],
) -> Vec<String> {
    symbols
        .iter()
        .flat_map(|symbol| {
            subscription_types
                .iter()
                .map(move |sub_type| sub_type.stream_name(symbol))
        })
        .collect()
}
