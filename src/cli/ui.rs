use crate::core::scores::{Component, ScoreBand};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Defines different styles for text elements.
#[derive(Clone, Copy)]
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Formats an `Option<T>` into a `Cell`. `None` is displayed as "N/A".
pub fn format_optional_cell<T>(value: Option<T>, format_fn: impl Fn(T) -> String) -> Cell {
    value.map_or(
        Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
        |v| Cell::new(format_fn(v)).set_alignment(CellAlignment::Right),
    )
}

pub fn amount_cell(value: f64) -> Cell {
    Cell::new(format_amount(value)).set_alignment(CellAlignment::Right)
}

/// Creates a cell for displaying percentage change with color coding.
pub fn change_cell(change: f64) -> Cell {
    let text = format!("{change:.2}%");
    if change >= 0.0 {
        Cell::new(text)
            .fg(Color::Green)
            .set_alignment(CellAlignment::Right)
    } else {
        Cell::new(text)
            .fg(Color::Red)
            .set_alignment(CellAlignment::Right)
    }
}

/// Creates a cell for "N/A" values, with error-specific styling.
pub fn na_cell(has_error: bool) -> Cell {
    let color = if has_error {
        Color::Red
    } else {
        Color::DarkGrey
    };
    Cell::new("N/A").fg(color)
}

/// Two decimals with thousands separators, e.g. `-1,234,567.89`.
pub fn format_amount(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (whole, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && formatted != "0.00" {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}

/// Short form for large amounts: `1.25B`, `340.00M`, `12.50K`.
pub fn format_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("{:.2}K", value / 1e3)
    } else {
        format!("{value:.2}")
    }
}

/// A score out of 100 with its band label, colored by band.
pub fn score_text(score: f64, band: ScoreBand, label: &str) -> String {
    let text = style(format!("{score:.1} ({label})")).bold();
    let styled = match band {
        ScoreBand::StrongBuy | ScoreBand::Buy => text.green(),
        ScoreBand::Neutral => text.yellow(),
        ScoreBand::Sell | ScoreBand::StrongSell => text.red(),
    };
    styled.to_string()
}

/// Table of score components with their values and weighted contribution.
pub fn components_table(components: &[Component]) -> Table {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Component"),
        header_cell("Value"),
        header_cell("Weight"),
        header_cell("Contribution"),
    ]);
    for component in components {
        table.add_row(vec![
            Cell::new(component.name),
            Cell::new(format!("{:.1} / {:.0}", component.value, component.max))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}%", component.weight * 100.0))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", component.contribution()))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Creates a new `indicatif::ProgressBar` with standard styling.
pub fn new_progress_bar(len: u64, with_message: bool) -> ProgressBar {
    let template = if with_message {
        "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})"
    } else {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})"
    };

    let pb = ProgressBar::new(len);
    let bar_style = ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(bar_style);
    pb
}

/// A spinner for fetches whose length is unknown.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

fn term_width() -> usize {
    console::Term::stdout()
        .size_checked()
        .map(|(_, w)| w as usize)
        .unwrap_or(80)
}

/// Prints a separator line matching the terminal width.
pub fn print_separator() {
    println!("\n{}", "─".repeat(term_width()));
}

/// Prints `label (currency): value` right-aligned below a double rule.
pub fn print_grand_total(label: &str, value: Option<f64>) {
    let width = term_width();
    println!("\n{}", "=".repeat(width));
    let text = match value {
        Some(v) => style(format!("{label}: {}", format_amount(v))).bold().green(),
        None => style(format!("{label}: N/A")).bold().red(),
    };
    println!("{text:>width$}");
}
