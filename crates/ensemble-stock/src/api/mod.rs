//! Upstream API clients

pub mod marketaux;
pub mod yahoo;

pub use marketaux::MarketAuxClient;
pub use yahoo::YahooFinanceClient;
