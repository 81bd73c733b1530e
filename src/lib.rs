pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::HistoricalPeriod;
use crate::core::calendar::ReleaseValues;
use crate::core::config::AppConfig;
use crate::core::ipo::DealTerms;
use crate::providers::{
    ExchangeRateProvider, SecEdgarProvider, SenateLdaProvider, UsaSpendingProvider,
    YahooFinanceProvider,
};
use crate::store::KeyValueStore;
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, info};

/// Command to run after the configuration is loaded.
#[derive(Debug, Clone)]
pub enum AppCommand {
    NetWorth {
        refresh: bool,
    },
    History {
        period: HistoricalPeriod,
        step_days: u32,
        refresh: bool,
    },
    Tax,
    Calendar {
        days: u32,
        country: Option<String>,
    },
    RecordRelease {
        event_id: String,
        date: NaiveDate,
        values: ReleaseValues,
    },
    Ipo {
        days: u32,
        terms: Option<PathBuf>,
        refresh: bool,
    },
    Lobbying {
        client: String,
        refresh: bool,
    },
    Spending {
        recipient: String,
        refresh: bool,
    },
    Insider {
        ticker: Option<String>,
        file: Option<PathBuf>,
        refresh: bool,
    },
    Earnings {
        ticker: Option<String>,
        file: Option<PathBuf>,
        estimates: Option<PathBuf>,
        refresh: bool,
    },
    EarningsCalendar {
        days: u32,
        sector: Option<String>,
        refresh: bool,
    },
}

struct AppContext {
    config: AppConfig,
    store: KeyValueStore,
}

impl AppContext {
    fn load(config_path: Option<&str>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_path(path)?,
            None => AppConfig::load()?,
        };
        debug!("Loaded config: {config:#?}");
        let store = KeyValueStore::open(&config.default_data_path()?);
        Ok(AppContext { config, store })
    }

    fn prices(&self, refresh: bool) -> YahooFinanceProvider {
        YahooFinanceProvider::new(
            self.config.providers.yahoo_url(),
            self.store.collection("prices"),
        )
        .with_refresh(refresh)
    }

    fn rates(&self, refresh: bool) -> ExchangeRateProvider {
        ExchangeRateProvider::new(
            self.config.providers.exchange_rates_url(),
            &self.config.currency,
            self.store.collection("rates"),
        )
        .with_refresh(refresh)
    }

    fn sec(&self, refresh: bool) -> SecEdgarProvider {
        SecEdgarProvider::new(self.config.providers.sec(), self.store.collection("sec"))
            .with_refresh(refresh)
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("omnifolio starting...");
    let ctx = AppContext::load(config_path)?;
    let config = &ctx.config;

    match command {
        AppCommand::NetWorth { refresh } => {
            cli::networth::run(
                &config.assets,
                &ctx.prices(refresh),
                &ctx.rates(refresh),
                &config.currency,
            )
            .await
        }
        AppCommand::History {
            period,
            step_days,
            refresh,
        } => {
            cli::history::run(
                &config.assets,
                &ctx.prices(refresh),
                &ctx.rates(refresh),
                &config.currency,
                period,
                step_days,
            )
            .await
        }
        AppCommand::Tax => cli::tax::run(config.tax.as_ref(), &config.currency),
        AppCommand::Calendar { days, country } => {
            let releases = ctx.store.data_collection("releases")?;
            cli::calendar::run(
                &config.calendar,
                releases.as_ref(),
                days,
                country.as_deref(),
            )
            .await
        }
        AppCommand::RecordRelease {
            event_id,
            date,
            values,
        } => {
            let releases = ctx.store.data_collection("releases")?;
            cli::calendar::record_release(
                &config.calendar,
                releases.as_ref(),
                &event_id,
                date,
                values,
            )
            .await
        }
        AppCommand::Ipo {
            days,
            terms,
            refresh,
        } => {
            let terms: Vec<DealTerms> = match terms {
                Some(path) => cli::read_json_file(path)?,
                None => Vec::new(),
            };
            let book = ctx.store.data_collection("ipo")?;
            cli::ipo::run(&ctx.sec(refresh), book.as_ref(), days, &terms).await
        }
        AppCommand::Lobbying { client, refresh } => {
            let source =
                SenateLdaProvider::new(config.providers.lda_url(), ctx.store.collection("lda"))
                    .with_refresh(refresh);
            cli::scores::lobbying(&source, &client).await
        }
        AppCommand::Spending { recipient, refresh } => {
            let source = UsaSpendingProvider::new(
                config.providers.usaspending_url(),
                ctx.store.collection("usaspending"),
            )
            .with_refresh(refresh);
            cli::scores::spending(&source, &recipient).await
        }
        AppCommand::Insider {
            ticker,
            file,
            refresh,
        } => {
            let input = cli::DataInput::from_args(ticker, file)?;
            cli::scores::insider(&ctx.sec(refresh), &input).await
        }
        AppCommand::Earnings {
            ticker,
            file,
            estimates,
            refresh,
        } => {
            let input = cli::DataInput::from_args(ticker, file)?;
            cli::scores::earnings(&ctx.sec(refresh), &input, estimates.as_deref()).await
        }
        AppCommand::EarningsCalendar {
            days,
            sector,
            refresh,
        } => cli::earnings_calendar::run(&ctx.sec(refresh), days, sector.as_deref()).await,
    }
}
