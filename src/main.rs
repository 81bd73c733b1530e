use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use omnifolio::AppCommand;
use omnifolio::core::HistoricalPeriod;
use omnifolio::core::calendar::ReleaseValues;
use omnifolio::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display net worth by asset category, with expenses
    #[command(name = "networth")]
    NetWorth {
        /// Ignore cached prices and exchange rates
        #[arg(long)]
        refresh: bool,
    },
    /// Display reconstructed net worth history
    History {
        /// Look-back window: 1M, 3M, 6M, 1Y, 3Y, 5Y or 10Y
        #[arg(short, long, default_value = "1Y")]
        period: HistoricalPeriod,
        /// Days between samples
        #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        step_days: u32,
        /// Ignore cached prices and exchange rates
        #[arg(long)]
        refresh: bool,
    },
    /// Estimate income tax from the configured profile
    Tax,
    /// Display upcoming economic releases
    Calendar {
        /// Number of days ahead to show
        #[arg(short, long, default_value_t = 14)]
        days: u32,
        /// Only show events for this country code (e.g. US, EU)
        #[arg(long)]
        country: Option<String>,
    },
    /// Record forecast or actual figures for an economic release
    RecordRelease {
        /// Event id, e.g. us-cpi
        event_id: String,
        /// Release date (YYYY-MM-DD)
        date: NaiveDate,
        #[arg(long, allow_negative_numbers = true)]
        actual: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        forecast: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        previous: Option<f64>,
    },
    /// Display the IPO pipeline from SEC registration filings
    Ipo {
        /// Number of days of filings to search
        #[arg(short, long, default_value_t = 90)]
        days: u32,
        /// JSON file with offering terms per accession number
        #[arg(long)]
        terms: Option<PathBuf>,
        /// Ignore cached filings
        #[arg(long)]
        refresh: bool,
    },
    /// Score lobbying activity for a client from Senate LDA filings
    Lobbying {
        client: String,
        #[arg(long)]
        refresh: bool,
    },
    /// Score federal award activity for a recipient from USAspending
    Spending {
        recipient: String,
        #[arg(long)]
        refresh: bool,
    },
    /// Score insider trades from SEC Form 4 filings or a JSON file
    Insider {
        /// Ticker or CIK
        #[arg(required_unless_present = "file")]
        ticker: Option<String>,
        /// JSON file of trades instead of EDGAR
        #[arg(long, conflicts_with = "ticker")]
        file: Option<PathBuf>,
        /// Ignore cached filings
        #[arg(long)]
        refresh: bool,
    },
    /// Score earnings surprises from reported results or a JSON file
    Earnings {
        /// Ticker or CIK
        #[arg(required_unless_present = "file")]
        ticker: Option<String>,
        /// JSON file of quarters instead of EDGAR
        #[arg(long, conflicts_with = "ticker")]
        file: Option<PathBuf>,
        /// JSON file of consensus estimates per period
        #[arg(long)]
        estimates: Option<PathBuf>,
        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
    },
    /// Display earnings reports filed with the SEC
    EarningsCalendar {
        /// Number of days of filings to search
        #[arg(short, long, default_value_t = 7)]
        days: u32,
        /// Only show one sector, e.g. "info" or "health care"
        #[arg(long)]
        sector: Option<String>,
        /// Ignore cached filings
        #[arg(long)]
        refresh: bool,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::NetWorth { refresh } => AppCommand::NetWorth { refresh },
            Commands::History {
                period,
                step_days,
                refresh,
            } => AppCommand::History {
                period,
                step_days,
                refresh,
            },
            Commands::Tax => AppCommand::Tax,
            Commands::Calendar { days, country } => AppCommand::Calendar { days, country },
            Commands::RecordRelease {
                event_id,
                date,
                actual,
                forecast,
                previous,
            } => AppCommand::RecordRelease {
                event_id,
                date,
                values: ReleaseValues {
                    actual,
                    forecast,
                    previous,
                },
            },
            Commands::Ipo {
                days,
                terms,
                refresh,
            } => AppCommand::Ipo {
                days,
                terms,
                refresh,
            },
            Commands::Lobbying { client, refresh } => AppCommand::Lobbying { client, refresh },
            Commands::Spending { recipient, refresh } => {
                AppCommand::Spending { recipient, refresh }
            }
            Commands::Insider {
                ticker,
                file,
                refresh,
            } => AppCommand::Insider {
                ticker,
                file,
                refresh,
            },
            Commands::Earnings {
                ticker,
                file,
                estimates,
                refresh,
            } => AppCommand::Earnings {
                ticker,
                file,
                estimates,
                refresh,
            },
            Commands::EarningsCalendar {
                days,
                sector,
                refresh,
            } => AppCommand::EarningsCalendar {
                days,
                sector,
                refresh,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => omnifolio::cli::setup::setup_at_path(path),
            None => omnifolio::cli::setup::setup(),
        },
        Some(cmd) => omnifolio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
