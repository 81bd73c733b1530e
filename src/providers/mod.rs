pub mod exchange_rate;
pub mod sec_earnings;
pub mod sec_edgar;
pub mod sec_form4;
pub mod senate_lda;
pub mod usaspending;
pub mod util;
pub mod yahoo_finance;

pub use exchange_rate::ExchangeRateProvider;
pub use sec_edgar::SecEdgarProvider;
pub use senate_lda::SenateLdaProvider;
pub use usaspending::UsaSpendingProvider;
pub use yahoo_finance::YahooFinanceProvider;
