pub mod builder; // config → connector, endpoint defaults
pub mod codec; // StreamCodec impls for market and user data streams
pub mod connector;
pub mod rest; // typed wrapper around RestClient
pub mod types; // serde structs ← raw JSON

pub use builder::build_connector;
pub use codec::{
    create_binance_stream_identifiers, BinanceMarketCodec, BinanceMarketEvent,
    BinanceUserDataCodec, BinanceUserDataEvent,
};
pub use connector::BinanceConnector;
pub use rest::BinanceRestClient;
pub use types::*;
