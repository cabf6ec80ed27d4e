use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{decode_payload, EventHeader, StreamCodec};
use crate::exchanges::binance::types::{
    BinanceAggTrade, BinanceBookTicker, BinanceDepthUpdate, BinanceKline, BinanceListenKeyExpired,
    BinanceTicker, BinanceTrade,
};
use crate::exchanges::binance_perp::types::{
    BinancePerpAccountConfigUpdate, BinancePerpAccountUpdate, BinancePerpMarginCall,
    BinancePerpMarkPrice, BinancePerpOrderTradeUpdate, BinancePerpTradeLite,
};

/// USDⓈ-M futures market stream events; payload shapes shared with spot reuse spot types
#[derive(Debug, Clone, PartialEq)]
pub enum BinancePerpMarketEvent {
    Trade(BinanceTrade),
    AggTrade(BinanceAggTrade),
    Kline(BinanceKline),
    DepthUpdate(BinanceDepthUpdate),
    BookTicker(BinanceBookTicker),
    Ticker(BinanceTicker),
    MarkPrice(BinancePerpMarkPrice),
    Unknown(EventHeader),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinancePerpMarketCodec;

impl StreamCodec for BinancePerpMarketCodec {
    type Event = BinancePerpMarketEvent;

    fn decode(&self, payload: &[u8]) -> Result<Self::Event, ExchangeError> {
        let header = EventHeader::peek(payload)?;
        match header.event_type.as_str() {
            "trade" => decode_payload(payload).map(BinancePerpMarketEvent::Trade),
            "aggTrade" => decode_payload(payload).map(BinancePerpMarketEvent::AggTrade),
            "kline" => decode_payload(payload).map(BinancePerpMarketEvent::Kline),
            "depthUpdate" => decode_payload(payload).map(BinancePerpMarketEvent::DepthUpdate),
            "bookTicker" => decode_payload(payload).map(BinancePerpMarketEvent::BookTicker),
            "24hrTicker" => decode_payload(payload).map(BinancePerpMarketEvent::Ticker),
            "markPriceUpdate" => decode_payload(payload).map(BinancePerpMarketEvent::MarkPrice),
            _ => Ok(BinancePerpMarketEvent::Unknown(header)),
        }
    }
}

/// Futures user data stream events, keyed by their `e` discriminant
#[derive(Debug, Clone, PartialEq)]
pub enum BinancePerpUserDataEvent {
    /// `ACCOUNT_UPDATE`
    AccountUpdate(BinancePerpAccountUpdate),
    /// `ORDER_TRADE_UPDATE`
    OrderTradeUpdate(Box<BinancePerpOrderTradeUpdate>),
    /// `MARGIN_CALL`
    MarginCall(BinancePerpMarginCall),
    /// `ACCOUNT_CONFIG_UPDATE`
    AccountConfigUpdate(BinancePerpAccountConfigUpdate),
    /// `TRADE_LITE`
    TradeLite(BinancePerpTradeLite),
    /// `listenKeyExpired`
    ListenKeyExpired(BinanceListenKeyExpired),
    /// Any discriminant this crate does not model; not an error
    Unknown(EventHeader),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinancePerpUserDataCodec;

impl StreamCodec for BinancePerpUserDataCodec {
    type Event = BinancePerpUserDataEvent;

    fn decode(&self, payload: &[u8]) -> Result<Self::Event, ExchangeError> {
        let header = EventHeader::peek(payload)?;
        match header.event_type.as_str() {
            "ACCOUNT_UPDATE" => decode_payload(payload).map(BinancePerpUserDataEvent::AccountUpdate),
            "ORDER_TRADE_UPDATE" => decode_payload(payload)
                .map(|update| BinancePerpUserDataEvent::OrderTradeUpdate(Box::new(update))),
            "MARGIN_CALL" => decode_payload(payload).map(BinancePerpUserDataEvent::MarginCall),
            "ACCOUNT_CONFIG_UPDATE" => {
                decode_payload(payload).map(BinancePerpUserDataEvent::AccountConfigUpdate)
            }
            "TRADE_LITE" => decode_payload(payload).map(BinancePerpUserDataEvent::TradeLite),
            "listenKeyExpired" => {
                decode_payload(payload).map(BinancePerpUserDataEvent::ListenKeyExpired)
            }
            _ => Ok(BinancePerpUserDataEvent::Unknown(header)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const ACCOUNT_UPDATE: &str = r#"{
        "e":"ACCOUNT_UPDATE","E":1564745798939,"T":1564745798938,
        "a":{
            "m":"ORDER",
            "B":[{"a":"USDT","wb":"122624.12345678","cw":"100.12345678","bc":"50.12345678"}],
            "P":[{"s":"BTCUSDT","pa":"0","ep":"0.00000","bep":"0","cr":"200","up":"0","mt":"isolated","iw":"0.00000000","ps":"BOTH"}]
        }
    }"#;

    #[test]
    fn test_decode_account_update() {
        let event = BinancePerpUserDataCodec
            .decode(ACCOUNT_UPDATE.as_bytes())
            .unwrap();
        let BinancePerpUserDataEvent::AccountUpdate(update) = event else {
            panic!("expected account update, got {:?}", event);
        };
        assert_eq!(update.event_time, 1_564_745_798_939);
        assert_eq!(update.update.reason, "ORDER");
        assert_eq!(
            update.update.balances[0].wallet_balance,
            Decimal::from_str("122624.12345678").unwrap()
        );
        assert_eq!(update.update.positions[0].position_side, "BOTH");
    }

    #[test]
    fn test_decode_order_trade_update() {
        let payload = br#"{
            "e":"ORDER_TRADE_UPDATE","E":1568879465651,"T":1568879465650,
            "o":{
                "s":"BTCUSDT","c":"TEST","S":"SELL","o":"TRAILING_STOP_MARKET","f":"GTC",
                "q":"0.001","p":"0","ap":"0","sp":"7103.04","x":"NEW","X":"NEW","i":8886774,
                "l":"0","z":"0","L":"0","N":"USDT","n":"0","T":1568879465650,"t":0,
                "b":"0","a":"9.91","m":false,"R":false,"wt":"CONTRACT_PRICE","ot":"TRAILING_STOP_MARKET",
                "ps":"LONG","cp":false,"AP":"7476.89","cr":"5.0","rp":"0"
            }
        }"#;
        let event = BinancePerpUserDataCodec.decode(payload).unwrap();
        let BinancePerpUserDataEvent::OrderTradeUpdate(update) = event else {
            panic!("expected order trade update, got {:?}", event);
        };
        assert_eq!(update.order.order_id, 8_886_774);
        assert_eq!(update.order.stop_price, Decimal::from_str("7103.04").unwrap());
        assert_eq!(update.order.commission_asset.as_deref(), Some("USDT"));
    }

    #[test]
    fn test_decode_margin_call() {
        let payload = br#"{
            "e":"MARGIN_CALL","E":1587727187525,"cw":"3.16812045",
            "p":[{"s":"ETHUSDT","ps":"LONG","pa":"1.327","mt":"CROSSED","iw":"0","mp":"187.17127","up":"-1.166074","mm":"1.614445"}]
        }"#;
        let event = BinancePerpUserDataCodec.decode(payload).unwrap();
        assert!(
            matches!(event, BinancePerpUserDataEvent::MarginCall(call) if call.positions[0].symbol == "ETHUSDT")
        );
    }

    #[test]
    fn test_decode_account_config_update() {
        let payload = br#"{"e":"ACCOUNT_CONFIG_UPDATE","E":1611646737479,"T":1611646737476,"ac":{"s":"BTCUSDT","l":25}}"#;
        let event = BinancePerpUserDataCodec.decode(payload).unwrap();
        let BinancePerpUserDataEvent::AccountConfigUpdate(update) = event else {
            panic!("expected account config update, got {:?}", event);
        };
        assert_eq!(update.leverage.map(|l| l.leverage), Some(25));
        assert!(update.multi_assets.is_none());
    }

    #[test]
    fn test_decode_listen_key_expired() {
        let payload = br#"{"e":"listenKeyExpired","E":1576653824250,"listenKey":"WsCMN0a4KHUPTQuX6IUnqEZfB1inxmv1qR4kbf1LuEjur5VdbzqvyxqG9TSjVVxv"}"#;
        let event = BinancePerpUserDataCodec.decode(payload).unwrap();
        assert!(matches!(event, BinancePerpUserDataEvent::ListenKeyExpired(e) if e.listen_key.starts_with("WsCMN")));
    }

    #[test]
    fn test_unknown_event_keeps_header() {
        let payload = br#"{"e":"STRATEGY_UPDATE","E":1669311519000,"T":1669311518000,"su":{}}"#;
        let event = BinancePerpUserDataCodec.decode(payload).unwrap();
        assert_eq!(
            event,
            BinancePerpUserDataEvent::Unknown(EventHeader {
                event_type: "STRATEGY_UPDATE".to_string(),
                event_time: Some(1_669_311_519_000),
            })
        );
    }

    #[test]
    fn test_decode_mark_price() {
        let payload = br#"{"e":"markPriceUpdate","E":1562305380000,"s":"BTCUSDT","p":"11794.15000000","i":"11784.62659091","P":"11784.25641265","r":"0.00038167","T":1562306400000}"#;
        let event = BinancePerpMarketCodec.decode(payload).unwrap();
        let BinancePerpMarketEvent::MarkPrice(mark) = event else {
            panic!("expected mark price, got {:?}", event);
        };
        assert_eq!(mark.funding_rate, Decimal::from_str("0.00038167").unwrap());
        assert_eq!(mark.next_funding_time, 1_562_306_400_000);
    }
}
