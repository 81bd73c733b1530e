use super::ui;
use crate::core::config::Assets;
use crate::core::networth::{self, CategoryValue, ExpenseSummary, NetWorth};
use crate::core::{CurrencyRateProvider, PriceProvider, PriceResult};
use anyhow::Result;
use comfy_table::Cell;
use futures::future::join_all;
use std::collections::HashMap;

impl CategoryValue {
    pub fn display_as_table(&self, target_currency: &str) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Holding"),
            ui::header_cell("Units"),
            ui::header_cell("Price"),
            ui::header_cell("Value"),
            ui::header_cell(&format!("Value ({target_currency})")),
            ui::header_cell("Weight (%)"),
        ]);

        for holding in &self.holdings {
            let currency = holding.value_currency.as_deref().unwrap_or("");
            let name = holding
                .short_name
                .clone()
                .unwrap_or_else(|| holding.identifier.clone());
            let has_error = holding.error.is_some();

            let converted = match holding.converted_value {
                Some(v) => ui::amount_cell(v),
                None => ui::na_cell(has_error),
            };
            table.add_row(vec![
                Cell::new(name),
                ui::format_optional_cell(holding.units, |u| format!("{u:.4}")),
                ui::format_optional_cell(holding.price, |p| format!("{p:.2} {currency}")),
                ui::format_optional_cell(holding.value, |v| {
                    format!("{} {currency}", ui::format_amount(v))
                }),
                converted,
                ui::format_optional_cell(holding.weight, |w| format!("{w:.2}%")),
            ]);
        }

        let mut output = format!(
            "{}\n\n",
            ui::style_text(self.category.label(), ui::StyleType::Title)
        );
        output.push_str(&table.to_string());

        for holding in self.holdings.iter().filter(|h| h.error.is_some()) {
            let message = format!(
                "{}: {}",
                holding.identifier,
                holding.error.as_deref().unwrap_or_default()
            );
            output.push_str(&format!(
                "\n{}",
                ui::style_text(&message, ui::StyleType::Error)
            ));
        }

        let (total, style_type) = match self.total {
            Some(v) => (ui::format_amount(v), ui::StyleType::TotalValue),
            None => ("N/A".to_string(), ui::StyleType::Error),
        };
        let weight = self
            .weight
            .map(|w| format!(" ({w:.2}%)"))
            .unwrap_or_default();
        output.push_str(&format!(
            "\n\nTotal {} ({}): {}{}",
            self.category.label(),
            ui::style_text(target_currency, ui::StyleType::TotalLabel),
            ui::style_text(&total, style_type),
            ui::style_text(&weight, ui::StyleType::Subtle)
        ));
        output
    }
}

impl NetWorth {
    pub fn display_allocation(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Category"),
            ui::header_cell(&format!("Value ({})", self.target_currency)),
            ui::header_cell("Weight (%)"),
        ]);
        for category in &self.categories {
            table.add_row(vec![
                Cell::new(category.category.label()),
                match category.total {
                    Some(v) => ui::amount_cell(v),
                    None => ui::na_cell(true),
                },
                ui::format_optional_cell(category.weight, |w| format!("{w:.2}%")),
            ]);
        }
        format!(
            "{}\n\n{}",
            ui::style_text("Allocation", ui::StyleType::Title),
            table
        )
    }
}

impl ExpenseSummary {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Category"),
            ui::header_cell(&format!("Monthly ({})", self.target_currency)),
            ui::header_cell(&format!("Annual ({})", self.target_currency)),
        ]);
        for line in &self.lines {
            let has_error = line.error.is_some();
            let (monthly, annual) = match line.monthly {
                Some(m) => (ui::amount_cell(m), ui::amount_cell(m * 12.0)),
                None => (ui::na_cell(has_error), ui::na_cell(has_error)),
            };
            table.add_row(vec![Cell::new(&line.category), monthly, annual]);
        }

        let mut output = format!(
            "{}\n\n{}",
            ui::style_text("Expenses", ui::StyleType::Title),
            table
        );
        for line in self.lines.iter().filter(|l| l.error.is_some()) {
            let message = format!(
                "{}: {}",
                line.category,
                line.error.as_deref().unwrap_or_default()
            );
            output.push_str(&format!(
                "\n{}",
                ui::style_text(&message, ui::StyleType::Error)
            ));
        }
        let (monthly, annual, style_type) = match (self.monthly_total, self.annual_total) {
            (Some(m), Some(a)) => (
                ui::format_amount(m),
                ui::format_amount(a),
                ui::StyleType::TotalValue,
            ),
            _ => ("N/A".to_string(), "N/A".to_string(), ui::StyleType::Error),
        };
        output.push_str(&format!(
            "\n\nMonthly spend ({}): {}  Annual: {}",
            ui::style_text(&self.target_currency, ui::StyleType::TotalLabel),
            ui::style_text(&monthly, style_type),
            ui::style_text(&annual, style_type)
        ));
        output
    }
}

/// Fetches every market price once, with a progress bar.
pub async fn fetch_prices(
    assets: &Assets,
    price_provider: &(dyn PriceProvider + Send + Sync),
) -> HashMap<String, Result<PriceResult>> {
    let symbols = networth::market_symbols(assets);
    if symbols.is_empty() {
        return HashMap::new();
    }

    let pb = ui::new_progress_bar(symbols.len() as u64, true);
    pb.set_message("Fetching prices...");
    let price_futures = symbols.into_iter().map(|symbol| {
        let pb_clone = pb.clone();
        async move {
            let res = price_provider.fetch_price(&symbol).await;
            pb_clone.inc(1);
            (symbol, res)
        }
    });
    let price_results = join_all(price_futures).await.into_iter().collect();
    pb.finish_and_clear();
    price_results
}

/// Prices and values every holding.
pub async fn value_assets(
    assets: &Assets,
    price_provider: &(dyn PriceProvider + Send + Sync),
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
    target_currency: &str,
) -> NetWorth {
    let price_results = fetch_prices(assets, price_provider).await;

    let holdings = assets.crypto.len()
        + assets.stocks.len()
        + assets.real_estate.len()
        + assets.cash.len()
        + assets.valuables.len();
    let pb = ui::new_progress_bar(holdings as u64, true);
    pb.set_message("Valuing holdings...");
    let net_worth = networth::calculate_net_worth(
        assets,
        &price_results,
        currency_provider,
        target_currency,
        &|| pb.inc(1),
    )
    .await;
    pb.finish_and_clear();
    net_worth
}

pub async fn run(
    assets: &Assets,
    price_provider: &(dyn PriceProvider + Send + Sync),
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
    target_currency: &str,
) -> Result<()> {
    let net_worth = value_assets(assets, price_provider, currency_provider, target_currency).await;

    if net_worth.categories.is_empty() {
        println!("No holdings found in the configuration.");
    } else {
        for category in &net_worth.categories {
            println!("{}", category.display_as_table(target_currency));
            ui::print_separator();
        }
        println!("{}", net_worth.display_allocation());
    }

    if !assets.expenses.is_empty() {
        let expenses =
            networth::summarize_expenses(&assets.expenses, currency_provider, target_currency)
                .await;
        ui::print_separator();
        println!("{}", expenses.display_as_table());
    }

    if !net_worth.categories.is_empty() {
        ui::print_grand_total(
            &format!("Net Worth ({target_currency})"),
            net_worth.total,
        );
    }
    Ok(())
}
