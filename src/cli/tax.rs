use super::ui;
use crate::core::tax::{self, DeductionKind, TaxConfig, TaxEstimate};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment};

impl TaxEstimate {
    pub fn display_as_table(&self, target_currency: &str, year: i32) -> String {
        let mut brackets = ui::new_styled_table();
        brackets.set_header(vec![
            ui::header_cell("Rate"),
            ui::header_cell("From"),
            ui::header_cell("To"),
            ui::header_cell(&format!("Taxable ({target_currency})")),
            ui::header_cell(&format!("Tax ({target_currency})")),
        ]);
        for bracket in &self.brackets {
            brackets.add_row(vec![
                Cell::new(format!("{:.0}%", bracket.rate * 100.0)).set_alignment(CellAlignment::Right),
                ui::amount_cell(bracket.lower),
                ui::format_optional_cell(bracket.upper, ui::format_amount),
                ui::amount_cell(bracket.taxable),
                ui::amount_cell(bracket.tax),
            ]);
        }

        let deduction_label = match self.deduction_kind {
            DeductionKind::Standard => "Standard deduction",
            DeductionKind::Itemized => "Itemized deductions",
        };
        let mut summary = ui::new_styled_table();
        summary.set_header(vec![ui::header_cell("Item"), ui::header_cell(target_currency)]);
        for (label, value) in [
            ("Gross income", self.gross_income),
            ("Pre-tax contributions", -self.adjustments),
            (deduction_label, -self.deduction),
            ("Ordinary taxable income", self.ordinary_taxable),
            ("Long-term gains taxable", self.capital_gains_taxable),
            ("Ordinary income tax", self.ordinary_tax),
            ("Capital gains tax", self.capital_gains_tax),
            ("State tax", self.state_tax),
        ] {
            summary.add_row(vec![Cell::new(label), ui::amount_cell(value)]);
        }

        let mut output = format!(
            "{} {} ({})\n\n",
            ui::style_text("Tax estimate", ui::StyleType::Title),
            year,
            self.filing_status
        );
        output.push_str(&summary.to_string());
        if !self.brackets.is_empty() {
            output.push_str(&format!(
                "\n\n{}\n\n{}",
                ui::style_text("Ordinary brackets", ui::StyleType::Title),
                brackets
            ));
        }
        output.push_str(&format!(
            "\n\nTotal tax ({}): {}",
            ui::style_text(target_currency, ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_amount(self.total_tax), ui::StyleType::TotalValue)
        ));
        output.push_str(&format!(
            "\nEffective rate: {:.2}%  Marginal rate: {:.2}%",
            self.effective_rate, self.marginal_rate
        ));
        output
    }
}

pub fn run(tax_config: Option<&TaxConfig>, target_currency: &str) -> Result<()> {
    let tax_config =
        tax_config.context("No tax section in the configuration; add `tax.profile` to estimate")?;
    let table = tax_config.table()?;
    let estimate = tax::estimate(&tax_config.profile, &table)?;
    println!("{}", estimate.display_as_table(target_currency, table.year));
    Ok(())
}
