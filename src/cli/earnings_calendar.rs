use super::ui;
use crate::core::earnings_calendar::{self, EarningsReport, EarningsReportSource, ReportTiming};
use crate::core::sector;
use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Color, Table};

fn timing_cell(timing: ReportTiming) -> Cell {
    let color = match timing {
        ReportTiming::BeforeOpen => Color::Cyan,
        ReportTiming::DuringMarket => Color::Yellow,
        ReportTiming::AfterClose => Color::Magenta,
        ReportTiming::Unknown => Color::DarkGrey,
    };
    Cell::new(timing).fg(color)
}

fn reports_table(reports: &[EarningsReport]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Filed"),
        ui::header_cell("Time"),
        ui::header_cell("Ticker"),
        ui::header_cell("Company"),
        ui::header_cell("Form"),
        ui::header_cell("Period"),
        ui::header_cell("Sector"),
    ]);
    for report in reports {
        table.add_row(vec![
            Cell::new(report.filed),
            timing_cell(report.timing()),
            Cell::new(report.ticker.as_deref().unwrap_or("")),
            Cell::new(&report.company),
            Cell::new(report.form),
            ui::format_optional_cell(report.period, |p| p.to_string()),
            Cell::new(
                sector::classify(report.sic.as_deref())
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            ),
        ]);
    }
    table
}

/// Earnings reports filed over the last `days` days, optionally for one sector.
pub async fn run(source: &dyn EarningsReportSource, days: u32, sector: Option<&str>) -> Result<()> {
    let sector = sector.map(earnings_calendar::parse_sector).transpose()?;
    let to = Utc::now().date_naive();
    let from = super::offset_date(to, -i64::from(days))?;

    let pb = ui::new_spinner("Searching earnings filings...");
    let reports = source.fetch_reports(from, to).await;
    pb.finish_and_clear();
    let reports = earnings_calendar::schedule(reports?, sector);

    if reports.is_empty() {
        println!("No earnings reports in the last {days} days.");
        return Ok(());
    }

    let title = match sector {
        Some(sector) => format!("Earnings calendar: {sector}"),
        None => "Earnings calendar".to_string(),
    };
    println!(
        "{} {} to {}\n",
        ui::style_text(&title, ui::StyleType::Title),
        from,
        to
    );
    println!("{}", reports_table(&reports));

    let after_close = reports
        .iter()
        .filter(|r| r.timing() == ReportTiming::AfterClose)
        .count();
    let before_open = reports
        .iter()
        .filter(|r| r.timing() == ReportTiming::BeforeOpen)
        .count();
    println!(
        "\n{} companies reported: {} pre-market, {} post-market",
        reports.len(),
        before_open,
        after_close
    );
    Ok(())
}
