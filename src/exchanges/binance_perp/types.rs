use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpMarkPrice {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: Decimal,
    #[serde(rename = "i", default)]
    pub index_price: Option<Decimal>,
    #[serde(rename = "P", default)]
    pub estimated_settle_price: Option<Decimal>,
    #[serde(rename = "r")]
    pub funding_rate: Decimal,
    #[serde(rename = "T")]
    pub next_funding_time: u64,
}

// User data stream types

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpAccountUpdate {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "T")]
    pub transaction_time: u64,
    #[serde(rename = "a")]
    pub update: BinancePerpAccountUpdateData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpAccountUpdateData {
    /// Reason type, e.g. `ORDER`, `FUNDING_FEE`, `DEPOSIT`
    #[serde(rename = "m")]
    pub reason: String,
    #[serde(rename = "B", default)]
    pub balances: Vec<BinancePerpBalanceUpdate>,
    #[serde(rename = "P", default)]
    pub positions: Vec<BinancePerpPositionUpdate>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpBalanceUpdate {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    pub wallet_balance: Decimal,
    #[serde(rename = "cw")]
    pub cross_wallet_balance: Decimal,
    #[serde(rename = "bc", default)]
    pub balance_change: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpPositionUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    pub position_amount: Decimal,
    #[serde(rename = "ep")]
    pub entry_price: Decimal,
    #[serde(rename = "cr", default)]
    pub accumulated_realized: Decimal,
    #[serde(rename = "up")]
    pub unrealized_pnl: Decimal,
    #[serde(rename = "mt")]
    pub margin_type: String,
    #[serde(rename = "iw", default)]
    pub isolated_wallet: Decimal,
    #[serde(rename = "ps")]
    pub position_side: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpOrderTradeUpdate {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "T")]
    pub transaction_time: u64,
    #[serde(rename = "o")]
    pub order: BinancePerpOrderUpdate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpOrderUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "ap")]
    pub average_price: Decimal,
    #[serde(rename = "sp", default)]
    pub stop_price: Decimal,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub order_status: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "l")]
    pub last_filled_quantity: Decimal,
    #[serde(rename = "z")]
    pub cumulative_filled_quantity: Decimal,
    #[serde(rename = "L")]
    pub last_filled_price: Decimal,
    #[serde(rename = "N", default)]
    pub commission_asset: Option<String>,
    #[serde(rename = "n", default)]
    pub commission: Option<Decimal>,
    #[serde(rename = "T")]
    pub trade_time: u64,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "m")]
    pub is_maker: bool,
    #[serde(rename = "R")]
    pub reduce_only: bool,
    #[serde(rename = "ps")]
    pub position_side: String,
    #[serde(rename = "rp", default)]
    pub realized_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpMarginCall {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "cw", default)]
    pub cross_wallet_balance: Option<Decimal>,
    #[serde(rename = "p")]
    pub positions: Vec<BinancePerpMarginCallPosition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpMarginCallPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "ps")]
    pub position_side: String,
    #[serde(rename = "pa")]
    pub position_amount: Decimal,
    #[serde(rename = "mt")]
    pub margin_type: String,
    #[serde(rename = "iw", default)]
    pub isolated_wallet: Decimal,
    #[serde(rename = "mp")]
    pub mark_price: Decimal,
    #[serde(rename = "up")]
    pub unrealized_pnl: Decimal,
    #[serde(rename = "mm")]
    pub maintenance_margin: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpAccountConfigUpdate {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "T")]
    pub transaction_time: u64,
    /// Leverage change for one symbol
    #[serde(rename = "ac", default)]
    pub leverage: Option<BinancePerpLeverageUpdate>,
    /// Multi-assets margin mode change
    #[serde(rename = "ai", default)]
    pub multi_assets: Option<BinancePerpMultiAssetsUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BinancePerpLeverageUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "l")]
    pub leverage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BinancePerpMultiAssetsUpdate {
    #[serde(rename = "j")]
    pub multi_assets_margin: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinancePerpTradeLite {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "T")]
    pub transaction_time: u64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "m")]
    pub is_maker: bool,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "L")]
    pub last_filled_price: Decimal,
    #[serde(rename = "l")]
    pub last_filled_quantity: Decimal,
    #[serde(rename = "t")]
    pub trade_id: i64,
    #[serde(rename = "i")]
    pub order_id: u64,
}
