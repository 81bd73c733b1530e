use super::{DataInput, ui};
use crate::core::scores::earnings::{
    self, EarningsEstimate, EarningsHistorySource, EarningsQuarter, EarningsScore, Outcome,
};
use crate::core::scores::insider::{self, InsiderScore, InsiderTrade, InsiderTradeSource};
use crate::core::scores::lobbying::{self, LobbyingScore, LobbyingSource};
use crate::core::scores::spending::{self, AwardSource, Breakdown, SpendingScore};
use crate::core::sector::Company;
use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use comfy_table::{Cell, Color, Table};
use std::fmt::Display;
use std::path::Path;
use tracing::warn;

const TOP_ROWS: usize = 10;

fn headline(title: &str, subject: &str, score: String) -> String {
    format!(
        "{}: {}\n\nScore: {}",
        ui::style_text(title, ui::StyleType::Title),
        ui::style_text(subject, ui::StyleType::TotalLabel),
        score
    )
}

/// `Name (TICKER)`, or the name alone.
fn company_subject(company: &Company) -> String {
    match &company.ticker {
        Some(ticker) => format!("{} ({})", company.name, ticker),
        None => company.name.clone(),
    }
}

fn company_details(company: &Company) -> String {
    let mut parts = vec![format!("CIK {}", company.cik)];
    parts.extend(company.exchange.clone());
    parts.push(
        company
            .classification()
            .map_or_else(|| "Sector unknown".to_string(), |c| c.to_string()),
    );
    parts.join("  |  ")
}

fn print_company(company: &Company) {
    println!(
        "{}\n",
        ui::style_text(&company_details(company), ui::StyleType::Subtle)
    );
}

fn breakdown_table<K: Display>(label: &str, rows: &[Breakdown<K>], total: f64) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell(label),
        ui::header_cell("Awards"),
        ui::header_cell("Amount (USD)"),
        ui::header_cell("Share"),
    ]);
    for row in rows.iter().take(TOP_ROWS) {
        let share = (total > 0.0).then(|| row.amount / total * 100.0);
        table.add_row(vec![
            Cell::new(&row.key),
            Cell::new(row.awards),
            ui::amount_cell(row.amount),
            ui::format_optional_cell(share, |s| format!("{s:.1}%")),
        ]);
    }
    table
}

impl LobbyingScore {
    pub fn display(&self, client: &str) -> String {
        let mut output = headline(
            "Lobbying influence",
            client,
            ui::score_text(self.score, self.band, self.band.level()),
        );
        let change = self
            .spend_change_pct
            .map_or("N/A".to_string(), |c| format!("{c:+.1}%"));
        output.push_str(&format!(
            "\nTrend: {} (last 4 quarters vs prior 4: {})\nTotal spend (12 quarters): {}\n\n",
            self.trend,
            change,
            ui::style_text(&ui::format_amount(self.total_spend), ui::StyleType::TotalValue)
        ));
        output.push_str(&ui::components_table(&self.components).to_string());

        let mut timeline = ui::new_styled_table();
        timeline.set_header(vec![
            ui::header_cell("Quarter"),
            ui::header_cell("Filings"),
            ui::header_cell("Spend (USD)"),
        ]);
        for quarter in &self.timeline {
            timeline.add_row(vec![
                Cell::new(quarter.quarter),
                Cell::new(quarter.filings),
                ui::amount_cell(quarter.amount),
            ]);
        }
        output.push_str(&format!("\n\n{timeline}"));

        if !self.registrants.is_empty() {
            let mut registrants = ui::new_styled_table();
            registrants.set_header(vec![
                ui::header_cell("Registrant"),
                ui::header_cell("Filings"),
                ui::header_cell("Spend (USD)"),
            ]);
            for registrant in self.registrants.iter().take(TOP_ROWS) {
                registrants.add_row(vec![
                    Cell::new(&registrant.registrant),
                    Cell::new(registrant.filings),
                    ui::amount_cell(registrant.amount),
                ]);
            }
            output.push_str(&format!("\n\n{registrants}"));
        }
        output
    }
}

impl SpendingScore {
    pub fn display(&self, recipient: &str) -> String {
        let mut output = headline(
            "Government influence",
            recipient,
            ui::score_text(self.score, self.band, self.band.level()),
        );
        let growth = self
            .growth_pct
            .map_or("N/A".to_string(), |g| format!("{g:+.1}%"));
        output.push_str(&format!(
            "\nTotal obligations: {}  Year-over-year: {}\n\n",
            ui::style_text(&ui::format_compact(self.total), ui::StyleType::TotalValue),
            growth
        ));
        output.push_str(&ui::components_table(&self.components).to_string());

        let mut years = ui::new_styled_table();
        years.set_header(vec![
            ui::header_cell("Fiscal year"),
            ui::header_cell("Awards"),
            ui::header_cell("Amount (USD)"),
        ]);
        for year in &self.by_year {
            years.add_row(vec![
                Cell::new(format!("FY{}", year.key)),
                Cell::new(year.awards),
                ui::amount_cell(year.amount),
            ]);
        }
        output.push_str(&format!("\n\n{years}"));
        output.push_str(&format!(
            "\n\n{}",
            breakdown_table("Award type", &self.by_category, self.total)
        ));
        if !self.by_agency.is_empty() {
            output.push_str(&format!(
                "\n\n{}",
                breakdown_table("Agency", &self.by_agency, self.total)
            ));
        }
        if !self.by_state.is_empty() {
            output.push_str(&format!(
                "\n\n{}",
                breakdown_table("State", &self.by_state, self.total)
            ));
        }
        output
    }
}

impl InsiderScore {
    pub fn display(&self, subject: &str) -> String {
        let mut output = headline(
            "Insider confidence",
            subject,
            ui::score_text(self.score, self.band, self.band.signal()),
        );
        output.push_str(&format!(
            "\nTrend: {}  Trades in window: {}\n\n",
            self.trend, self.trades
        ));
        if self.components.is_empty() {
            output.push_str(&ui::style_text(
                "No insider trades in the last 24 months.",
                ui::StyleType::Subtle,
            ));
            return output;
        }
        output.push_str(&ui::components_table(&self.components).to_string());

        let mut months = ui::new_styled_table();
        months.set_header(vec![
            ui::header_cell("Month"),
            ui::header_cell("Buys"),
            ui::header_cell("Sells"),
            ui::header_cell("Bought (USD)"),
            ui::header_cell("Sold (USD)"),
            ui::header_cell("Buyers"),
            ui::header_cell("Sellers"),
        ]);
        for month in &self.months {
            months.add_row(vec![
                ui::format_optional_cell(month.month, |m| m.format("%Y-%m").to_string()),
                Cell::new(month.buys),
                Cell::new(month.sells),
                ui::amount_cell(month.buy_value),
                ui::amount_cell(month.sell_value),
                Cell::new(month.distinct_buyers),
                Cell::new(month.distinct_sellers),
            ]);
        }
        output.push_str(&format!("\n\n{months}"));
        output
    }
}

fn outcome_cell(outcome: Option<Outcome>) -> Cell {
    match outcome {
        Some(Outcome::Beat) => Cell::new("Beat").fg(Color::Green),
        Some(Outcome::Meet) => Cell::new("Meet").fg(Color::Yellow),
        Some(Outcome::Miss) => Cell::new("Miss").fg(Color::Red),
        None => ui::na_cell(false),
    }
}

impl EarningsScore {
    pub fn display(&self, subject: &str) -> String {
        let mut output = headline(
            "Earnings surprise",
            subject,
            ui::score_text(self.score, self.band, self.band.signal()),
        );
        let streak = match self.streak {
            s if s > 0 => format!("{s} straight beats"),
            s if s < 0 => format!("{} straight misses", -s),
            _ => "none".to_string(),
        };
        let pct = |v: Option<f64>| v.map_or("N/A".to_string(), |v| format!("{v:.1}%"));
        output.push_str(&format!(
            "\nStreak: {}  EPS beat rate: {}  Revenue beat rate: {}\nAverage surprise: {}  Surprise magnitude: {}\n\n",
            streak,
            pct(self.beat_rate),
            pct(self.revenue_beat_rate),
            pct(self.average_surprise),
            pct(self.magnitude)
        ));
        output.push_str(&ui::components_table(&self.components).to_string());

        let mut quarters = ui::new_styled_table();
        quarters.set_header(vec![
            ui::header_cell("Period"),
            ui::header_cell("Reported"),
            ui::header_cell("EPS"),
            ui::header_cell("Estimate"),
            ui::header_cell("Surprise"),
            ui::header_cell("Revenue"),
            ui::header_cell("Estimate"),
            ui::header_cell("Surprise"),
        ]);
        for quarter in &self.quarters {
            quarters.add_row(vec![
                Cell::new(&quarter.period),
                Cell::new(quarter.reported),
                ui::format_optional_cell(quarter.eps_actual, |v| format!("{v:.2}")),
                ui::format_optional_cell(quarter.eps_estimate, |v| format!("{v:.2}")),
                match quarter.eps_surprise_pct() {
                    Some(s) => ui::change_cell(s),
                    None => outcome_cell(quarter.eps_outcome()),
                },
                ui::format_optional_cell(quarter.revenue_actual, ui::format_compact),
                ui::format_optional_cell(quarter.revenue_estimate, ui::format_compact),
                match quarter.revenue_surprise_pct() {
                    Some(s) => ui::change_cell(s),
                    None => outcome_cell(quarter.revenue_outcome()),
                },
            ]);
        }
        output.push_str(&format!("\n\n{quarters}"));
        output
    }
}

pub async fn lobbying(source: &dyn LobbyingSource, client: &str) -> Result<()> {
    let as_of = Utc::now().date_naive();
    let pb = ui::new_spinner("Loading lobbying disclosures...");
    let filings = source
        .fetch_filings(client, as_of.year() - 2, as_of.year())
        .await;
    pb.finish_and_clear();

    let result = lobbying::score(&filings?, as_of);
    println!("{}", result.display(client));
    Ok(())
}

/// First day of the fiscal year four years before the current one.
fn spending_window_start(today: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(spending::fiscal_year(today) - 5, 10, 1)
}

pub async fn spending(source: &dyn AwardSource, recipient: &str) -> Result<()> {
    let to = Utc::now().date_naive();
    let from = spending_window_start(to).unwrap_or(to);
    let pb = ui::new_spinner("Loading federal awards...");
    let awards = source.fetch_awards(recipient, from, to).await;
    pb.finish_and_clear();

    let result = spending::score(&awards?);
    println!("{}", result.display(recipient));
    Ok(())
}

pub async fn insider(source: &dyn InsiderTradeSource, input: &DataInput) -> Result<()> {
    let as_of = Utc::now().date_naive();
    let (trades, subject): (Vec<InsiderTrade>, String) = match input {
        DataInput::File(path) => (super::read_json_file(path)?, super::subject_of(path)),
        DataInput::Ticker(ticker) => {
            let pb = ui::new_spinner("Loading Form 4 filings...");
            let fetched = source.fetch_trades(ticker, insider::window_start(as_of)).await;
            pb.finish_and_clear();
            let fetched = fetched?;
            print_company(&fetched.company);
            (fetched.trades, company_subject(&fetched.company))
        }
    };
    let result = insider::score(&trades, as_of);
    println!("{}", result.display(&subject));
    Ok(())
}

/// Merges estimates into the quarters, warning when none line up.
fn with_estimates(
    mut quarters: Vec<EarningsQuarter>,
    estimates: Option<&Path>,
) -> Result<Vec<EarningsQuarter>> {
    let Some(path) = estimates else {
        return Ok(quarters);
    };
    let estimates: Vec<EarningsEstimate> = super::read_json_file(path)?;
    if earnings::apply_estimates(&mut quarters, &estimates) == 0 {
        warn!("No estimate in {} matches a reported quarter", path.display());
    }
    Ok(quarters)
}

pub async fn earnings(
    source: &dyn EarningsHistorySource,
    input: &DataInput,
    estimates: Option<&Path>,
) -> Result<()> {
    let (quarters, subject): (Vec<EarningsQuarter>, String) = match input {
        DataInput::File(path) => (super::read_json_file(path)?, super::subject_of(path)),
        DataInput::Ticker(ticker) => {
            let pb = ui::new_spinner("Loading reported results...");
            let fetched = source.fetch_quarters(ticker).await;
            pb.finish_and_clear();
            let fetched = fetched?;
            print_company(&fetched.company);
            (fetched.quarters, company_subject(&fetched.company))
        }
    };
    let quarters = with_estimates(quarters, estimates)?;
    if quarters.iter().all(|q| q.eps_estimate.is_none() && q.revenue_estimate.is_none()) {
        println!(
            "{}\n",
            ui::style_text(
                "No estimates available; surprise components need --estimates.",
                ui::StyleType::Subtle
            )
        );
    }
    let result = earnings::score(&quarters);
    println!("{}", result.display(&subject));
    Ok(())
}
