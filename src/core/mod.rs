//! Core business logic abstractions

pub mod cache;
pub mod calendar;
pub mod config;
pub mod currency;
pub mod earnings_calendar;
pub mod history;
pub mod ipo;
pub mod log;
pub mod networth;
pub mod price;
pub mod scores;
pub mod sector;
pub mod tax;

// Re-export main types for cleaner imports
pub use cache::{Cached, KeyValueCollection, Store};
pub use currency::{CurrencyRateProvider, ExchangeRateTable};
pub use price::{HistoricalPeriod, PriceProvider, PriceResult};
