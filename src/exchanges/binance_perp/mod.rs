// Core modules - one responsibility per file
pub mod builder; // config → connector, endpoint defaults
pub mod codec; // StreamCodec impls (market, user data)
pub mod connector;
pub mod rest; // thin typed wrapper around RestClient
pub mod types; // serde structs ← raw JSON

pub use builder::build_connector;
pub use codec::{
    BinancePerpMarketCodec, BinancePerpMarketEvent, BinancePerpUserDataCodec,
    BinancePerpUserDataEvent,
};
pub use connector::BinancePerpConnector;
pub use rest::BinancePerpRestClient;
pub use types::*;
