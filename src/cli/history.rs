use super::{networth::value_assets, ui};
use crate::core::config::Assets;
use crate::core::history::{self, HistorySummary, ValuePoint};
use crate::core::{CurrencyRateProvider, HistoricalPeriod, PriceProvider};
use anyhow::Result;
use chrono::Utc;
use comfy_table::Cell;

const BAR_WIDTH: usize = 30;

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let filled = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(filled.min(BAR_WIDTH))
}

fn display_series(series: &[ValuePoint], target_currency: &str) -> String {
    let max = series.iter().map(|p| p.value).fold(0.0_f64, f64::max);
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Value ({target_currency})")),
        ui::header_cell("Change"),
        ui::header_cell(""),
    ]);

    let mut previous: Option<f64> = None;
    for point in series {
        let change = match previous {
            Some(prev) if prev > 0.0 => ui::change_cell((point.value - prev) / prev * 100.0),
            _ => ui::na_cell(false),
        };
        table.add_row(vec![
            Cell::new(point.date.format("%Y-%m-%d")),
            ui::amount_cell(point.value),
            change,
            Cell::new(bar(point.value, max)).fg(comfy_table::Color::Cyan),
        ]);
        previous = Some(point.value);
    }
    table.to_string()
}

fn display_summary(summary: &HistorySummary, target_currency: &str) -> String {
    let change_pct = summary
        .change_pct
        .map_or("N/A".to_string(), |p| format!("{p:+.2}%"));
    let style_type = if summary.change >= 0.0 {
        ui::StyleType::TotalValue
    } else {
        ui::StyleType::Error
    };
    let mut output = format!(
        "Change ({}): {} ({})",
        ui::style_text(target_currency, ui::StyleType::TotalLabel),
        ui::style_text(&ui::format_amount(summary.change), style_type),
        change_pct
    );
    if let Some(cagr) = summary.cagr_pct {
        output.push_str(&format!(
            "\nCAGR: {}",
            ui::style_text(&format!("{cagr:.2}%"), ui::StyleType::TotalLabel)
        ));
    }
    output
}

pub async fn run(
    assets: &Assets,
    price_provider: &(dyn PriceProvider + Send + Sync),
    currency_provider: &(dyn CurrencyRateProvider + Send + Sync),
    target_currency: &str,
    period: HistoricalPeriod,
    step_days: u32,
) -> Result<()> {
    let net_worth = value_assets(assets, price_provider, currency_provider, target_currency).await;
    let timelines = history::build_timelines(assets, &net_worth, currency_provider).await;
    if timelines.is_empty() {
        println!("No holdings with a current value to build history from.");
        return Ok(());
    }

    let end = Utc::now().date_naive();
    let start = end - period.to_duration();
    let series = history::reconstruct(&timelines, start, end, step_days)?;

    println!(
        "Net worth over the last {}\n",
        ui::style_text(&period.to_string(), ui::StyleType::Title)
    );
    println!("{}", display_series(&series, target_currency));
    if let Some(summary) = history::summarize(&series)? {
        println!("\n{}", display_summary(&summary, target_currency));
    }
    if net_worth.total.is_none() {
        println!(
            "\n{}",
            ui::style_text(
                "Some holdings could not be valued and are left out of the history.",
                ui::StyleType::Subtle
            )
        );
    }
    Ok(())
}
